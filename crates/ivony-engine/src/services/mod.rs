use std::collections::BTreeMap;
use std::env;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ivony_contracts::settings::{AspectRatio, ImageStyle};
use reqwest::blocking::Response as HttpResponse;
use serde_json::Value;

mod dryrun;
mod gemini;

pub use dryrun::DryrunService;
pub use gemini::{GeminiConfig, GeminiService};

/// Encoded image returned by a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    /// Standard base64, no `data:` prefix.
    pub data: String,
    pub mime_type: String,
}

/// Existing image handed to an edit call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub data: String,
    pub mime_type: String,
}

/// Mode-specific arguments for one service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceRequest {
    Generate {
        prompt: String,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
    },
    Edit {
        prompt: String,
        source: SourceImage,
    },
}

impl ServiceRequest {
    pub fn prompt(&self) -> &str {
        match self {
            ServiceRequest::Generate { prompt, .. } | ServiceRequest::Edit { prompt, .. } => {
                prompt
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServiceRequest::Generate { .. } => "generate",
            ServiceRequest::Edit { .. } => "edit",
        }
    }

    /// Runs the request against `service`. One attempt, no retry.
    pub fn dispatch(&self, service: &dyn ImageService) -> Result<ImagePayload> {
        match self {
            ServiceRequest::Generate {
                prompt,
                style,
                aspect_ratio,
            } => service.generate(prompt, *style, *aspect_ratio),
            ServiceRequest::Edit { prompt, source } => service.edit(prompt, source),
        }
    }
}

/// Remote image generation/editing backend.
///
/// Implementations must not hold session state; every call is independent.
pub trait ImageService: Send + Sync {
    fn name(&self) -> &str;
    fn generate(
        &self,
        prompt: &str,
        style: ImageStyle,
        aspect_ratio: AspectRatio,
    ) -> Result<ImagePayload>;
    fn edit(&self, prompt: &str, source: &SourceImage) -> Result<ImagePayload>;
}

#[derive(Default)]
pub struct ImageServiceRegistry {
    services: BTreeMap<String, Arc<dyn ImageService>>,
}

impl ImageServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: ImageService + 'static>(&mut self, service: S) {
        self.services
            .insert(service.name().to_string(), Arc::new(service));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ImageService>> {
        self.services.get(name.trim()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.services.keys().cloned().collect()
    }
}

pub fn default_service_registry(gemini: GeminiConfig) -> ImageServiceRegistry {
    let mut services = ImageServiceRegistry::new();
    services.register(DryrunService);
    services.register(GeminiService::new(gemini));
    services
}

pub(crate) fn response_json_or_error(service: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{service} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{service} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{service} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Flattens an error chain into one line, skipping repeated causes.
pub fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use ivony_contracts::settings::{AspectRatio, ImageStyle};

    use super::{
        default_service_registry, error_chain_text, truncate_text, GeminiConfig, ServiceRequest,
    };

    #[test]
    fn registry_lists_builtin_services() {
        let registry = default_service_registry(GeminiConfig::default());
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        assert!(registry.get(" dryrun ").is_some());
        assert!(registry.get("stability").is_none());
    }

    #[test]
    fn dispatch_routes_by_request_kind() -> anyhow::Result<()> {
        let registry = default_service_registry(GeminiConfig::default());
        let service = registry
            .get("dryrun")
            .ok_or_else(|| anyhow!("dryrun missing"))?;
        let request = ServiceRequest::Generate {
            prompt: "boat".to_string(),
            style: ImageStyle::Anime,
            aspect_ratio: AspectRatio::Landscape,
        };
        assert_eq!(request.kind(), "generate");
        assert_eq!(request.prompt(), "boat");
        let payload = request.dispatch(service.as_ref())?;
        assert_eq!(payload.mime_type, "image/png");
        assert!(!payload.data.is_empty());
        Ok(())
    }

    #[test]
    fn error_chain_collapses_duplicates() {
        let err = anyhow!("connection reset")
            .context("connection reset")
            .context("Imagen request failed");
        assert_eq!(
            error_chain_text(&err, 200),
            "Imagen request failed | caused by: connection reset"
        );
    }

    #[test]
    fn truncate_appends_ellipsis() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }
}
