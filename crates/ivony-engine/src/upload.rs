use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::GenericImageView;
use ivony_contracts::gallery::data_url;

use crate::services::SourceImage;

/// A user-selected image kept in memory for the next edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedImage {
    path: Option<PathBuf>,
    bytes: Vec<u8>,
    mime_type: String,
    width: u32,
    height: u32,
    preview_url: String,
}

impl UploadedImage {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
        let mut upload = Self::from_bytes(bytes)
            .with_context(|| format!("{} is not a supported image", path.display()))?;
        upload.path = Some(path.to_path_buf());
        Ok(upload)
    }

    /// Sniffs the format and decodes once to validate and size the preview.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let format = image::guess_format(&bytes).context("unrecognized image format")?;
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .context("image decode failed")?;
        let (width, height) = decoded.dimensions();
        let mime_type = format.to_mime_type().to_string();
        let preview_url = data_url(&mime_type, &BASE64.encode(&bytes));
        Ok(Self {
            path: None,
            bytes,
            mime_type,
            width,
            height,
            preview_url,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn preview_url(&self) -> &str {
        &self.preview_url
    }

    pub fn label(&self) -> String {
        let name = self
            .path
            .as_ref()
            .and_then(|path| path.file_name())
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());
        format!("{name} ({}x{}, {})", self.width, self.height, self.mime_type)
    }

    pub fn source(&self) -> SourceImage {
        SourceImage {
            data: BASE64.encode(&self.bytes),
            mime_type: self.mime_type.clone(),
        }
    }
}
