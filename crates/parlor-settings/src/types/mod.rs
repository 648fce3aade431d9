//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so a settings
//! file may name only the fields it wants to change.

mod auth;
mod server;

pub use auth::*;
pub use server::*;

use parlor_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Root settings type for the gateway.
///
/// ```json
/// {
///   "server": { "port": 9090, "allowedOrigin": "http://chat.local" },
///   "auth": { "users": { "percy": "123" } }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParlorSettings {
    /// Listener and HTTP surface.
    pub server: ServerSettings,
    /// Per-session queueing, heartbeat and failure policy.
    pub session: SessionSettings,
    /// One-time credentials and the login user table.
    pub auth: AuthSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

impl ParlorSettings {
    /// Reject values that would make the gateway unusable.
    pub fn validate(&self) -> crate::Result<()> {
        let invalid = |msg: &str| -> crate::Result<()> {
            Err(crate::SettingsError::InvalidValue(msg.to_string()))
        };
        if self.auth.otp_ttl_ms == 0 {
            return invalid("auth.otpTtlMs must be greater than zero");
        }
        if self.auth.otp_sweep_interval_ms == Some(0) {
            return invalid("auth.otpSweepIntervalMs must be greater than zero");
        }
        if self.session.outbound_queue_capacity == 0 {
            return invalid("session.outboundQueueCapacity must be greater than zero");
        }
        if self.session.heartbeat_interval_ms == 0 {
            return invalid("session.heartbeatIntervalMs must be greater than zero");
        }
        if self.session.heartbeat_timeout_ms < self.session.heartbeat_interval_ms {
            return invalid("session.heartbeatTimeoutMs must be >= heartbeatIntervalMs");
        }
        if self.server.max_connections == 0 {
            return invalid("server.maxConnections must be greater than zero");
        }
        Ok(())
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`) or a full
    /// `EnvFilter` directive.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SettingsError;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = ParlorSettings::default();
        assert_eq!(s.server.host, "127.0.0.1");
        assert_eq!(s.server.port, 8080);
        assert_eq!(
            s.server.allowed_origin.as_deref(),
            Some("http://localhost:8080")
        );
        assert_eq!(s.server.max_connections, 1000);
        assert_eq!(s.server.max_message_size, 64 * 1024);
        assert!(s.server.static_dir.is_none());
        assert_eq!(s.session.outbound_queue_capacity, 256);
        assert_eq!(s.session.heartbeat_interval_ms, 30_000);
        assert_eq!(s.session.heartbeat_timeout_ms, 90_000);
        assert_eq!(s.session.slow_consumer_limit, 64);
        assert_eq!(s.session.handler_failure_policy, HandlerFailurePolicy::Continue);
        assert_eq!(s.auth.otp_ttl_ms, 5000);
        assert!(s.auth.otp_sweep_interval_ms.is_none());
        assert!(s.auth.users.is_empty());
        assert_eq!(s.logging.level, "info");
        assert_eq!(s.logging.format, LogFormat::Compact);
        assert!(s.validate().is_ok());
    }

    #[test]
    fn camel_case_wire_names() {
        let json = serde_json::to_value(ParlorSettings::default()).unwrap();
        assert!(json["server"]["allowedOrigin"].is_string());
        assert!(json["session"]["outboundQueueCapacity"].is_number());
        assert_eq!(json["session"]["handlerFailurePolicy"], "continue");
        assert_eq!(json["auth"]["otpTtlMs"], 5000);
    }

    #[test]
    fn validate_rejects_zero_ttl() {
        let mut s = ParlorSettings::default();
        s.auth.otp_ttl_ms = 0;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_timeout_below_interval() {
        let mut s = ParlorSettings::default();
        s.session.heartbeat_timeout_ms = 1000;
        s.session.heartbeat_interval_ms = 5000;
        assert_matches!(s.validate(), Err(SettingsError::InvalidValue(_)));
    }

    #[test]
    fn validate_rejects_zero_queue() {
        let mut s = ParlorSettings::default();
        s.session.outbound_queue_capacity = 0;
        assert!(s.validate().is_err());
    }
}
