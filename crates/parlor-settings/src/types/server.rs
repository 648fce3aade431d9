//! Server and session settings.

use serde::{Deserialize, Serialize};

/// Listener and HTTP surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Exact `Origin` accepted on the WebSocket upgrade. `"*"` accepts any.
    pub allowed_origin: Option<String>,
    /// Live sessions allowed before admission answers 503.
    pub max_connections: usize,
    /// Largest inbound WebSocket message, in bytes.
    pub max_message_size: usize,
    /// Directory served for unmatched `GET` routes (the chat frontend).
    pub static_dir: Option<String>,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            allowed_origin: Some("http://localhost:8080".to_string()),
            max_connections: 1000,
            max_message_size: 64 * 1024,
            static_dir: None,
        }
    }
}

/// What the read pump does after a handler returns an error.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandlerFailurePolicy {
    /// Log and keep the session.
    #[default]
    Continue,
    /// Log and close the session.
    Disconnect,
}

/// Per-session settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Bounded outbound queue length per session.
    pub outbound_queue_capacity: usize,
    /// Heartbeat tick in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Silence after which a session is considered dead, in milliseconds.
    pub heartbeat_timeout_ms: u64,
    /// Consecutive dropped outbound envelopes before the session is closed.
    pub slow_consumer_limit: u32,
    /// Reaction to handler errors.
    pub handler_failure_policy: HandlerFailurePolicy,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            outbound_queue_capacity: 256,
            heartbeat_interval_ms: 30_000,
            heartbeat_timeout_ms: 90_000,
            slow_consumer_limit: 64,
            handler_failure_policy: HandlerFailurePolicy::Continue,
        }
    }
}
