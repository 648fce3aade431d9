//! Envelope decoding errors.

use thiserror::Error;

/// Failure to turn wire bytes into an envelope, or an envelope payload into
/// its typed form.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    /// The frame is not a JSON envelope of the form `{"type": .., "payload": ..}`.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),

    /// The frame parsed but its `type` field is empty.
    #[error("envelope has an empty type")]
    EmptyType,

    /// The payload does not match the shape expected for its type.
    #[error("invalid payload for '{event_type}': {source}")]
    Payload {
        /// Envelope type whose payload failed to decode.
        event_type: String,
        /// Underlying decode error.
        #[source]
        source: serde_json::Error,
    },

    /// An outbound envelope could not be serialized.
    #[error("failed to encode envelope: {0}")]
    Encode(#[source] serde_json::Error),
}

impl EnvelopeError {
    /// Short machine-readable kind, used as a metrics label.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::EmptyType => "empty_type",
            Self::Payload { .. } => "invalid_payload",
            Self::Encode(_) => "encode",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_err() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{nope").unwrap_err()
    }

    #[test]
    fn malformed_display() {
        let err = EnvelopeError::Malformed(json_err());
        assert!(err.to_string().starts_with("malformed frame"));
        assert_eq!(err.kind(), "malformed");
    }

    #[test]
    fn payload_display_names_type() {
        let err = EnvelopeError::Payload {
            event_type: "change_room".into(),
            source: json_err(),
        };
        assert!(err.to_string().contains("change_room"));
        assert_eq!(err.kind(), "invalid_payload");
    }

    #[test]
    fn empty_type_kind() {
        assert_eq!(EnvelopeError::EmptyType.kind(), "empty_type");
    }
}
