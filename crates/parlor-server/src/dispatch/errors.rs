//! Dispatch and handler errors.

use parlor_core::EnvelopeError;
use thiserror::Error;

/// Failure inside an event handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload does not decode or fails validation.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
    /// The session's manager is gone, so there is nobody to fan out to.
    #[error("session is detached from its manager")]
    SessionDetached,
    /// Any other handler failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    /// Metrics label for `event_errors_total`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload(_) => "invalid_payload",
            Self::SessionDetached => "session_detached",
            Self::Failed(_) => "failed",
        }
    }
}

impl From<EnvelopeError> for HandlerError {
    fn from(err: EnvelopeError) -> Self {
        let message = err.to_string();
        match err {
            EnvelopeError::Encode(_) => Self::Failed(message),
            _ => Self::InvalidPayload(message),
        }
    }
}

/// Outcome of routing one envelope.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is registered for the envelope type.
    #[error("unsupported event type '{0}'")]
    UnsupportedEvent(String),
    /// The handler ran and returned an error.
    #[error("handler for '{event_type}' failed: {source}")]
    Handler {
        /// Envelope type that failed.
        event_type: String,
        /// Handler error.
        #[source]
        source: HandlerError,
    },
}

impl DispatchError {
    /// Metrics label for `event_errors_total`.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedEvent(_) => "unsupported_event",
            Self::Handler { source, .. } => source.kind(),
        }
    }
}
