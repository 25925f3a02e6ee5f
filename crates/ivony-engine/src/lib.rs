pub mod error;
pub mod services;
pub mod session;
pub mod toast;
pub mod upload;

pub use error::{ActionError, ServiceError, ValidationError};
pub use services::{
    default_service_registry, DryrunService, GeminiConfig, GeminiService, ImagePayload,
    ImageService, ImageServiceRegistry, ServiceRequest, SourceImage,
};
pub use session::{Orchestrator, PendingAction, SessionState};
pub use toast::{Toast, ToastDismissed, TOAST_LIFETIME};
pub use upload::UploadedImage;
