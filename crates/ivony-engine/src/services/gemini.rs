use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ivony_contracts::settings::{AspectRatio, ImageStyle};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Value};

use super::{non_empty_env, response_json_or_error, ImagePayload, ImageService, SourceImage};

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GENERATE_MODEL: &str = "imagen-4.0-generate-001";
const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image-preview";
const DEFAULT_TIMEOUT_S: f64 = 90.0;
const MIN_TIMEOUT_S: f64 = 15.0;
const MAX_TIMEOUT_S: f64 = 300.0;

#[derive(Debug, Clone, PartialEq)]
pub struct GeminiConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub generate_model: String,
    pub edit_model: String,
    pub request_timeout: Duration,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            generate_model: DEFAULT_GENERATE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            request_timeout: Duration::from_secs_f64(DEFAULT_TIMEOUT_S),
        }
    }
}

impl GeminiConfig {
    /// Reads `GEMINI_API_KEY` (or `GOOGLE_API_KEY`), `GEMINI_API_BASE`,
    /// `IVONY_GENERATE_MODEL`, `IVONY_EDIT_MODEL` and `IVONY_REQUEST_TIMEOUT`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            api_base: non_empty_env("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or(defaults.api_base),
            api_key: non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY")),
            generate_model: non_empty_env("IVONY_GENERATE_MODEL")
                .unwrap_or(defaults.generate_model),
            edit_model: non_empty_env("IVONY_EDIT_MODEL").unwrap_or(defaults.edit_model),
            request_timeout: non_empty_env("IVONY_REQUEST_TIMEOUT")
                .and_then(|raw| raw.parse::<f64>().ok())
                .map(timeout_from_seconds)
                .unwrap_or(defaults.request_timeout),
        }
    }

    pub fn with_generate_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.generate_model = model.trim().to_string();
        }
        self
    }

    pub fn with_edit_model(mut self, model: Option<String>) -> Self {
        if let Some(model) = model.filter(|value| !value.trim().is_empty()) {
            self.edit_model = model.trim().to_string();
        }
        self
    }
}

pub(crate) fn timeout_from_seconds(seconds: f64) -> Duration {
    let seconds = if seconds.is_finite() {
        seconds
    } else {
        DEFAULT_TIMEOUT_S
    };
    Duration::from_secs_f64(seconds.clamp(MIN_TIMEOUT_S, MAX_TIMEOUT_S))
}

/// Imagen for text-to-image, Gemini image models for edits.
pub struct GeminiService {
    config: GeminiConfig,
    http: HttpClient,
}

impl GeminiService {
    pub fn new(config: GeminiConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    fn api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("GEMINI_API_KEY or GOOGLE_API_KEY not set"))
    }

    fn endpoint(&self, model: &str, method: &str) -> String {
        let trimmed = model.trim().trim_start_matches("models/");
        format!("{}/models/{}:{}", self.config.api_base, trimmed, method)
    }

    fn post(&self, label: &str, endpoint: &str, payload: &Value) -> Result<Value> {
        let api_key = self.api_key()?;
        let response = self
            .http
            .post(endpoint)
            .query(&[("key", api_key)])
            .timeout(self.config.request_timeout)
            .json(payload)
            .send()
            .with_context(|| format!("{label} request failed ({endpoint})"))?;
        response_json_or_error(label, response)
    }

    pub(crate) fn generate_payload(
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
    ) -> Value {
        json!({
            "instances": [{
                "prompt": styled_prompt(prompt, style),
            }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": aspect_ratio.as_str(),
                "outputMimeType": "image/png",
            },
        })
    }

    pub(crate) fn edit_payload(prompt: &str, source: &SourceImage) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {
                        "inlineData": {
                            "mimeType": source.mime_type,
                            "data": source.data,
                        }
                    },
                    { "text": prompt },
                ],
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE", "TEXT"],
            },
        })
    }

    pub(crate) fn extract_prediction(response_payload: &Value) -> Result<ImagePayload> {
        let predictions = response_payload
            .get("predictions")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for row in predictions {
            let Some(obj) = row.as_object() else {
                continue;
            };
            let encoded = obj
                .get("bytesBase64Encoded")
                .or_else(|| obj.get("bytes_base64_encoded"))
                .and_then(Value::as_str)
                .unwrap_or_default();
            if encoded.is_empty() {
                continue;
            }
            let mime_type = obj
                .get("mimeType")
                .or_else(|| obj.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return checked_payload("Imagen", encoded, mime_type);
        }
        if let Some(reason) = response_payload
            .get("predictions")
            .and_then(Value::as_array)
            .and_then(|rows| rows.first())
            .and_then(|row| row.get("raiFilteredReason"))
            .and_then(Value::as_str)
        {
            bail!("Imagen returned no images: {reason}");
        }
        bail!("Imagen returned no images")
    }

    pub(crate) fn extract_inline_image(response_payload: &Value) -> Result<ImagePayload> {
        let candidates = response_payload
            .get("candidates")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let mut text_parts = Vec::new();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            for part in parts {
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    text_parts.push(text.trim().to_string());
                }
                let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                else {
                    continue;
                };
                let data = inline
                    .get("data")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                if data.is_empty() {
                    continue;
                }
                let mime_type = inline
                    .get("mimeType")
                    .or_else(|| inline.get("mime_type"))
                    .and_then(Value::as_str)
                    .unwrap_or("image/png");
                return checked_payload("Gemini", data, mime_type);
            }
        }
        let text = text_parts
            .into_iter()
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            bail!("Gemini returned no images");
        }
        bail!("Gemini returned no images: {text}")
    }
}

impl ImageService for GeminiService {
    fn name(&self) -> &str {
        "gemini"
    }

    fn generate(
        &self,
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload> {
        let endpoint = self.endpoint(&self.config.generate_model, "predict");
        let payload = Self::generate_payload(prompt, style, aspect_ratio);
        let response_payload = self.post("Imagen", &endpoint, &payload)?;
        Self::extract_prediction(&response_payload)
    }

    fn edit(&self, prompt: &str, source: &SourceImage) -> Result<ImagePayload> {
        let endpoint = self.endpoint(&self.config.edit_model, "generateContent");
        let payload = Self::edit_payload(prompt, source);
        let response_payload = self.post("Gemini", &endpoint, &payload)?;
        Self::extract_inline_image(&response_payload)
    }
}

fn styled_prompt(prompt: &str, style: ImageStyle) -> String {
    format!("{}, {} style", prompt.trim(), style.as_str().to_ascii_lowercase())
}

fn checked_payload(label: &str, encoded: &str, mime_type: &str) -> Result<ImagePayload> {
    BASE64
        .decode(encoded.as_bytes())
        .with_context(|| format!("{label} image base64 decode failed"))?;
    Ok(ImagePayload {
        data: encoded.to_string(),
        mime_type: mime_type.to_string(),
    })
}
