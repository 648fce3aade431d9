//! Runtime configuration derived from [`ParlorSettings`].

use std::path::PathBuf;
use std::time::Duration;

use parlor_settings::{HandlerFailurePolicy, ParlorSettings};

use crate::websocket::heartbeat::HeartbeatConfig;

/// Configuration for the gateway server.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (`0` auto-assigns).
    pub port: u16,
    /// Largest inbound WebSocket message in bytes.
    pub max_message_size: usize,
    /// Frontend directory served for unmatched routes.
    pub static_dir: Option<PathBuf>,
    /// One-time credential lifetime.
    pub otp_ttl: Duration,
    /// Expiry sweep period (never longer than `otp_ttl`).
    pub otp_sweep_interval: Duration,
    /// Admission and per-session behaviour.
    pub session: SessionConfig,
}

/// Admission limits and per-session behaviour, owned by the session manager.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Exact `Origin` accepted at upgrade. `None` accepts any origin.
    pub allowed_origin: Option<String>,
    /// Live sessions allowed before admission answers 503.
    pub max_connections: usize,
    /// Bounded outbound queue length.
    pub outbound_queue_capacity: usize,
    /// Consecutive outbound drops tolerated before closing the session.
    pub slow_consumer_limit: u32,
    /// Ping cadence and liveness window.
    pub heartbeat: HeartbeatConfig,
    /// Reaction to handler errors.
    pub failure_policy: HandlerFailurePolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            allowed_origin: Some("http://localhost:8080".into()),
            max_connections: 1000,
            outbound_queue_capacity: 256,
            slow_consumer_limit: 64,
            heartbeat: HeartbeatConfig::default(),
            failure_policy: HandlerFailurePolicy::Continue,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_message_size: 64 * 1024,
            static_dir: None,
            otp_ttl: Duration::from_secs(5),
            otp_sweep_interval: Duration::from_secs(5),
            session: SessionConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Convert loaded settings into runtime configuration.
    ///
    /// An `allowedOrigin` of `"*"` disables the origin check.
    pub fn from_settings(settings: &ParlorSettings) -> Self {
        let otp_ttl = Duration::from_millis(settings.auth.otp_ttl_ms);
        let otp_sweep_interval = settings
            .auth
            .otp_sweep_interval_ms
            .map_or(otp_ttl, Duration::from_millis)
            .min(otp_ttl);

        let allowed_origin = settings
            .server
            .allowed_origin
            .clone()
            .filter(|origin| origin != "*" && !origin.is_empty());

        Self {
            host: settings.server.host.clone(),
            port: settings.server.port,
            max_message_size: settings.server.max_message_size,
            static_dir: settings.server.static_dir.as_ref().map(PathBuf::from),
            otp_ttl,
            otp_sweep_interval,
            session: SessionConfig {
                allowed_origin,
                max_connections: settings.server.max_connections,
                outbound_queue_capacity: settings.session.outbound_queue_capacity,
                slow_consumer_limit: settings.session.slow_consumer_limit,
                heartbeat: HeartbeatConfig {
                    interval: Duration::from_millis(settings.session.heartbeat_interval_ms),
                    timeout: Duration::from_millis(settings.session.heartbeat_timeout_ms),
                },
                failure_policy: settings.session.handler_failure_policy,
            },
        }
    }
}
