//! Wire envelope and the built-in event catalog.
//!
//! Every WebSocket text frame carries exactly one [`EventEnvelope`]:
//!
//! ```json
//! { "type": "send_message", "payload": { "message": "hi", "from": "alice" } }
//! ```
//!
//! The envelope never interprets its payload. Decoding is deferred to the
//! handler registered for `type`, via [`EventEnvelope::decode_payload`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::EnvelopeError;

/// Client → server: post a chat message to the sender's current room.
pub const EVENT_SEND_MESSAGE: &str = "send_message";
/// Server → client: a chat message fanned out to a room.
pub const EVENT_NEW_MESSAGE: &str = "new_message";
/// Client → server: move the session into another room.
pub const EVENT_CHANGE_ROOM: &str = "change_room";

/// A typed, self-describing message unit exchanged over a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Dispatch key.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque payload, interpreted by the handler for `event_type`.
    #[serde(default)]
    pub payload: Value,
}

impl EventEnvelope {
    /// Build an envelope from a type and an already-encoded payload.
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
        }
    }

    /// Build an envelope by serializing a typed payload.
    pub fn from_payload<T: Serialize>(
        event_type: impl Into<String>,
        payload: &T,
    ) -> Result<Self, EnvelopeError> {
        let payload = serde_json::to_value(payload).map_err(EnvelopeError::Encode)?;
        Ok(Self::new(event_type, payload))
    }

    /// Parse one inbound text frame.
    pub fn parse(frame: &str) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_str(frame).map_err(EnvelopeError::Malformed)?;
        if envelope.event_type.is_empty() {
            return Err(EnvelopeError::EmptyType);
        }
        Ok(envelope)
    }

    /// Parse one inbound binary frame (UTF-8 JSON).
    pub fn parse_bytes(frame: &[u8]) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_slice(frame).map_err(EnvelopeError::Malformed)?;
        if envelope.event_type.is_empty() {
            return Err(EnvelopeError::EmptyType);
        }
        Ok(envelope)
    }

    /// Decode the payload into the shape expected for this type.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T, EnvelopeError> {
        T::deserialize(&self.payload).map_err(|source| EnvelopeError::Payload {
            event_type: self.event_type.clone(),
            source,
        })
    }

    /// Serialize into one outbound text frame.
    pub fn to_frame(&self) -> Result<String, EnvelopeError> {
        serde_json::to_string(self).map_err(EnvelopeError::Encode)
    }
}

// ── Payloads ─────────────────────────────────────────────────────────────────

/// Payload of [`EVENT_SEND_MESSAGE`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessageEvent {
    /// Message text.
    pub message: String,
    /// Sender display name, as supplied by the client.
    pub from: String,
}

/// Payload of [`EVENT_NEW_MESSAGE`]: the original message plus the instant
/// the server accepted it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessageEvent {
    /// The message as sent.
    #[serde(flatten)]
    pub inner: SendMessageEvent,
    /// Server-assigned timestamp (RFC 3339, UTC).
    pub sent: DateTime<Utc>,
}

impl NewMessageEvent {
    /// Stamp a message with the current server time.
    pub fn stamped(inner: SendMessageEvent) -> Self {
        Self {
            inner,
            sent: Utc::now(),
        }
    }
}

/// Payload of [`EVENT_CHANGE_ROOM`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRoomEvent {
    /// Target room name.
    pub name: String,
}
