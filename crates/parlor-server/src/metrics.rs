//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns the handle used by `GET /metrics`. Call once at startup, before
/// anything is recorded.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// A handle backed by a private, non-global recorder. For tests and for
/// embedding the server where a recorder is already installed.
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket sessions admitted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions deregistered (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Rejected upgrade attempts (counter, labels: reason).
pub const WS_ADMISSIONS_REJECTED_TOTAL: &str = "ws_admissions_rejected_total";
/// Outbound envelopes dropped on a full queue (counter).
pub const WS_OUTBOUND_DROPS_TOTAL: &str = "ws_outbound_drops_total";
/// Session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// One-time credentials issued (counter).
pub const OTP_ISSUED_TOTAL: &str = "otp_issued_total";
/// One-time credentials redeemed (counter).
pub const OTP_CONSUMED_TOTAL: &str = "otp_consumed_total";
/// One-time credentials that expired unredeemed (counter).
pub const OTP_EXPIRED_TOTAL: &str = "otp_expired_total";
/// Envelopes dispatched (counter, labels: type).
pub const EVENTS_DISPATCHED_TOTAL: &str = "events_dispatched_total";
/// Dispatch failures (counter, labels: type, error_type).
pub const EVENT_ERRORS_TOTAL: &str = "event_errors_total";
/// Handler run time (histogram, labels: type).
pub const EVENT_DISPATCH_DURATION_SECONDS: &str = "event_dispatch_duration_seconds";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_handle_renders() {
        let handle = detached_handle();
        let output = handle.render();
        assert!(output.is_empty() || output.contains('#') || output.contains('\n'));
    }

    #[test]
    fn metric_constants_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_ADMISSIONS_REJECTED_TOTAL,
            WS_OUTBOUND_DROPS_TOTAL,
            WS_CONNECTION_DURATION_SECONDS,
            OTP_ISSUED_TOTAL,
            OTP_CONSUMED_TOTAL,
            OTP_EXPIRED_TOTAL,
            EVENTS_DISPATCHED_TOTAL,
            EVENT_ERRORS_TOTAL,
            EVENT_DISPATCH_DURATION_SECONDS,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
