use thiserror::Error;

/// Input problems caught before any service call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Please enter a prompt.")]
    EmptyPrompt,
    #[error("Please upload an image to edit.")]
    MissingImage,
}

/// A failed generate or edit call, carrying the flattened cause text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to generate image. Please try again. Error: {cause}")]
pub struct ServiceError {
    pub cause: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Service(#[from] ServiceError),
    /// Another action is still pending.
    #[error("An image request is already in progress.")]
    Busy,
    /// The settled ticket does not match the pending action.
    #[error("No matching image request is pending.")]
    NotPending,
}

impl ActionError {
    pub fn is_validation(&self) -> bool {
        matches!(self, ActionError::Validation(_))
    }
}
