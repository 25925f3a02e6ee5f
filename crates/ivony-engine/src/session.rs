use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use ivony_contracts::events::EventWriter;
use ivony_contracts::gallery::GeneratedImage;
use ivony_contracts::settings::{AppSettings, AspectRatio, ImageStyle, Mode};
use serde_json::{json, Map, Value};

use crate::error::{ActionError, ServiceError, ValidationError};
use crate::services::{error_chain_text, ImagePayload, ImageService, ServiceRequest};
use crate::toast::{Toast, ToastDismissed};
use crate::upload::UploadedImage;

const ERROR_CAUSE_MAX_CHARS: usize = 600;

/// Everything the front end renders. Only [`Orchestrator`] mutates it.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    mode: Mode,
    prompt: String,
    uploaded_image: Option<UploadedImage>,
    settings: AppSettings,
    results: Vec<GeneratedImage>,
    pending: Option<u64>,
    error: Option<String>,
    toast: Toast,
}

impl SessionState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn uploaded_image(&self) -> Option<&UploadedImage> {
        self.uploaded_image.as_ref()
    }

    pub fn settings(&self) -> AppSettings {
        self.settings
    }

    /// Newest first.
    pub fn results(&self) -> &[GeneratedImage] {
        &self.results
    }

    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn toast_message(&self) -> Option<&str> {
        self.toast.message()
    }

    pub fn toast_deadline(&self) -> Option<Instant> {
        self.toast.deadline()
    }

    fn validated_request(&self) -> Result<ServiceRequest, ValidationError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        match self.mode {
            Mode::Generate => Ok(ServiceRequest::Generate {
                prompt: prompt.to_string(),
                style: self.settings.style,
                aspect_ratio: self.settings.aspect_ratio,
            }),
            Mode::Edit => {
                let upload = self
                    .uploaded_image
                    .as_ref()
                    .ok_or(ValidationError::MissingImage)?;
                Ok(ServiceRequest::Edit {
                    prompt: prompt.to_string(),
                    source: upload.source(),
                })
            }
        }
    }
}

/// An admitted action waiting for its service call to finish.
#[derive(Debug, Clone)]
pub struct PendingAction {
    ticket: u64,
    request: ServiceRequest,
}

impl PendingAction {
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    pub fn request(&self) -> &ServiceRequest {
        &self.request
    }
}

/// Owns the session state and funnels every mutation through named operations.
pub struct Orchestrator {
    state: SessionState,
    service: Arc<dyn ImageService>,
    events: EventWriter,
    next_ticket: u64,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn ImageService>, events: EventWriter) -> Self {
        let orchestrator = Self {
            state: SessionState::default(),
            service,
            events,
            next_ticket: 0,
        };
        orchestrator.record(
            "session_started",
            json!({
                "service": orchestrator.service.name(),
                "settings": orchestrator.state.settings,
                "mode": orchestrator.state.mode,
            }),
        );
        orchestrator
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn service(&self) -> Arc<dyn ImageService> {
        Arc::clone(&self.service)
    }

    pub fn events(&self) -> &EventWriter {
        &self.events
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.state.prompt = prompt.into();
    }

    /// Switching modes keeps any uploaded image; see `clear_upload`.
    pub fn set_mode(&mut self, mode: Mode) {
        if self.state.mode == mode {
            return;
        }
        self.state.mode = mode;
        self.record("mode_changed", json!({ "mode": mode }));
    }

    pub fn set_style(&mut self, style: ImageStyle) {
        self.state.settings.style = style;
        self.record("settings_changed", json!({ "settings": self.state.settings }));
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.state.settings.aspect_ratio = aspect_ratio;
        self.record("settings_changed", json!({ "settings": self.state.settings }));
    }

    pub fn upload_image(&mut self, upload: UploadedImage) {
        let (width, height) = upload.dimensions();
        self.record(
            "image_uploaded",
            json!({
                "path": upload.path().map(|path| path.to_string_lossy().to_string()),
                "mime_type": upload.mime_type(),
                "width": width,
                "height": height,
                "bytes": upload.bytes().len(),
            }),
        );
        self.state.uploaded_image = Some(upload);
    }

    pub fn clear_upload(&mut self) -> bool {
        let cleared = self.state.uploaded_image.take().is_some();
        if cleared {
            self.record("upload_cleared", json!({}));
        }
        cleared
    }

    pub fn dismiss_error(&mut self) {
        self.state.error = None;
    }

    /// Validates the session and runs one generate or edit call to completion.
    /// A panicking service settles as a failure, so loading never outlives
    /// the call.
    pub fn perform_action(&mut self) -> Result<GeneratedImage, ActionError> {
        let pending = self.begin_action()?;
        let service = Arc::clone(&self.service);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            pending.request().dispatch(service.as_ref())
        }))
        .unwrap_or_else(|payload| {
            Err(anyhow!(
                "image service panicked: {}",
                panic_message(payload.as_ref())
            ))
        });
        self.settle_action(pending, outcome)
    }

    /// Admits an action: rejects while another is pending, validates, then
    /// marks the session loading and clears the previous error.
    pub fn begin_action(&mut self) -> Result<PendingAction, ActionError> {
        if let Some(ticket) = self.state.pending {
            self.record(
                "action_rejected",
                json!({ "reason": "busy", "pending_ticket": ticket }),
            );
            return Err(ActionError::Busy);
        }

        let request = match self.state.validated_request() {
            Ok(request) => request,
            Err(err) => {
                self.state.error = Some(err.to_string());
                self.record(
                    "action_rejected",
                    json!({ "reason": "validation", "message": err.to_string() }),
                );
                return Err(err.into());
            }
        };

        self.next_ticket += 1;
        let ticket = self.next_ticket;
        self.state.pending = Some(ticket);
        self.state.error = None;
        self.record(
            "action_started",
            json!({
                "ticket": ticket,
                "kind": request.kind(),
                "prompt": request.prompt(),
                "service": self.service.name(),
                "settings": self.state.settings,
            }),
        );
        Ok(PendingAction { ticket, request })
    }

    /// Applies the outcome of a pending action. Loading always ends here.
    pub fn settle_action(
        &mut self,
        pending: PendingAction,
        outcome: Result<ImagePayload>,
    ) -> Result<GeneratedImage, ActionError> {
        if self.state.pending != Some(pending.ticket) {
            return Err(ActionError::NotPending);
        }
        self.state.pending = None;

        let outcome = outcome.and_then(|payload| {
            if payload.data.trim().is_empty() {
                anyhow::bail!("{} returned an empty image payload", self.service.name());
            }
            Ok(payload)
        });

        match outcome {
            Ok(payload) => {
                let image = GeneratedImage::from_inline(
                    pending.request.prompt(),
                    &payload.mime_type,
                    &payload.data,
                );
                self.state.results.insert(0, image.clone());
                self.state.prompt.clear();
                self.record(
                    "image_created",
                    json!({
                        "ticket": pending.ticket,
                        "image_id": image.id,
                        "prompt": image.prompt,
                        "mime_type": payload.mime_type,
                        "results": self.state.results.len(),
                    }),
                );
                Ok(image)
            }
            Err(err) => {
                let error = ServiceError {
                    cause: error_chain_text(&err, ERROR_CAUSE_MAX_CHARS),
                };
                self.state.error = Some(error.to_string());
                self.record(
                    "action_failed",
                    json!({
                        "ticket": pending.ticket,
                        "kind": pending.request.kind(),
                        "error": error.cause,
                    }),
                );
                Err(error.into())
            }
        }
    }

    /// Shows `message` now and (re)arms its single dismissal deadline.
    pub fn notify(&mut self, message: impl Into<String>, now: Instant) {
        let message = message.into();
        let serial = self.state.toast.show(message.clone(), now);
        self.record(
            "toast_shown",
            json!({ "message": message, "serial": serial }),
        );
    }

    /// Dismisses the toast once its deadline has passed.
    pub fn tick(&mut self, now: Instant) -> Option<ToastDismissed> {
        let dismissed = self.state.toast.expire(now)?;
        self.record(
            "toast_dismissed",
            json!({ "message": dismissed.message, "serial": dismissed.serial }),
        );
        Some(dismissed)
    }

    pub fn finish(&self) {
        self.record(
            "session_finished",
            json!({ "results": self.state.results.len() }),
        );
    }

    fn record(&self, event_type: &str, payload: Value) {
        let _ = self.events.emit(event_type, map_object(payload));
    }
}

fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}
