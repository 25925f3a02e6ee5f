use serde::{Deserialize, Serialize};

/// One finished image. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub url: String,
    pub prompt: String,
}

impl GeneratedImage {
    /// Builds a record for an inline payload with a fresh id.
    pub fn from_inline(prompt: impl Into<String>, mime_type: &str, base64_data: &str) -> Self {
        Self {
            id: new_image_id(),
            url: data_url(mime_type, base64_data),
            prompt: prompt.into(),
        }
    }

    pub fn is_inline(&self) -> bool {
        self.url.starts_with("data:")
    }
}

pub fn new_image_id() -> String {
    format!("img-{}", uuid::Uuid::new_v4().simple())
}

pub fn data_url(mime_type: &str, base64_data: &str) -> String {
    let mime = mime_type.trim();
    let mime = if mime.is_empty() { "image/png" } else { mime };
    format!("data:{mime};base64,{base64_data}")
}

/// Splits a `data:<mime>;base64,<payload>` URL into its MIME type and payload.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, payload) = rest.split_once(',')?;
    let mime = meta.strip_suffix(";base64")?;
    Some((mime, payload))
}

const SAMPLE_IMAGES: &[(&str, &str, &str)] = &[
    (
        "sample-1",
        "https://picsum.photos/seed/ivony1/512",
        "A futuristic cityscape at dusk, neon lights reflecting on wet streets.",
    ),
    (
        "sample-2",
        "https://picsum.photos/seed/ivony2/512",
        "An abstract painting of a roaring lion, rendered in fiery colors.",
    ),
    (
        "sample-3",
        "https://picsum.photos/seed/ivony3/512",
        "Anime character with silver hair and glowing red eyes, standing in a cherry blossom forest.",
    ),
    (
        "sample-4",
        "https://picsum.photos/seed/ivony4/512",
        "A hyper-realistic photo of a dew-covered spider web at sunrise.",
    ),
];

/// Fixed illustrative gallery shown before anything has been generated.
pub fn sample_gallery() -> Vec<GeneratedImage> {
    SAMPLE_IMAGES
        .iter()
        .map(|(id, url, prompt)| GeneratedImage {
            id: (*id).to_string(),
            url: (*url).to_string(),
            prompt: (*prompt).to_string(),
        })
        .collect()
}
