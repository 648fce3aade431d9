//! Admission errors and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Why an upgrade request was refused as unauthorized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// No `otp` query parameter, or an empty one.
    MissingOtp,
    /// Unknown, expired or already redeemed credential.
    InvalidOtp,
    /// `Origin` header absent or not the configured origin.
    OriginNotAllowed,
}

impl RejectReason {
    /// Stable label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingOtp => "missing_otp",
            Self::InvalidOtp => "invalid_otp",
            Self::OriginNotAllowed => "origin_not_allowed",
        }
    }
}

/// Admission failure. No session is created for any of these.
#[derive(Debug, Error)]
pub enum AdmissionError {
    /// Credential or origin check failed.
    #[error("unauthorized: {}", .0.as_str())]
    Unauthorized(RejectReason),
    /// The live-set is full.
    #[error("server at capacity")]
    AtCapacity,
    /// Graceful shutdown has begun.
    #[error("server shutting down")]
    ShuttingDown,
    /// The request could not be upgraded to a WebSocket.
    #[error("websocket upgrade failed: {0}")]
    UpgradeFailed(String),
}

impl AdmissionError {
    /// Metrics label for `ws_admissions_rejected_total`.
    pub fn reason_label(&self) -> &'static str {
        match self {
            Self::Unauthorized(reason) => reason.as_str(),
            Self::AtCapacity => "at_capacity",
            Self::ShuttingDown => "shutting_down",
            Self::UpgradeFailed(_) => "upgrade_failed",
        }
    }

    /// HTTP status returned to the client.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AtCapacity | Self::ShuttingDown => StatusCode::SERVICE_UNAVAILABLE,
            Self::UpgradeFailed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let body = match &self {
            Self::Unauthorized(_) => "unauthorized".to_string(),
            other => other.to_string(),
        };
        (self.status(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        assert_eq!(
            AdmissionError::Unauthorized(RejectReason::MissingOtp).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(AdmissionError::AtCapacity.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(AdmissionError::ShuttingDown.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            AdmissionError::UpgradeFailed("no upgrade header".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn labels() {
        assert_eq!(
            AdmissionError::Unauthorized(RejectReason::OriginNotAllowed).reason_label(),
            "origin_not_allowed"
        );
        assert_eq!(AdmissionError::AtCapacity.reason_label(), "at_capacity");
        assert_eq!(AdmissionError::ShuttingDown.reason_label(), "shutting_down");
    }

    #[test]
    fn display() {
        let err = AdmissionError::Unauthorized(RejectReason::InvalidOtp);
        assert_eq!(err.to_string(), "unauthorized: invalid_otp");
    }

    #[test]
    fn into_response_status() {
        let resp = AdmissionError::Unauthorized(RejectReason::InvalidOtp).into_response();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let resp = AdmissionError::AtCapacity.into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
