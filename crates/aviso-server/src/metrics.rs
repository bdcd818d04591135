//! Prometheus metrics recorder and metric names.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the global Prometheus recorder.
///
/// Call once at startup, before anything is recorded. The returned handle
/// renders `/metrics`.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus metrics recorder installed");
    Ok(handle)
}

/// Handle backed by a recorder that is not installed globally (tests, embedding).
pub fn detached_handle() -> PrometheusHandle {
    PrometheusBuilder::new().build_recorder().handle()
}

/// WebSocket connections accepted (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket connections closed (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Open WebSocket connections (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Connections closed for heartbeat silence (counter).
pub const WS_HEARTBEAT_TIMEOUTS_TOTAL: &str = "ws_heartbeat_timeouts_total";
/// Successful handshakes (counter, labels: kind).
pub const REGISTRATIONS_TOTAL: &str = "registrations_total";
/// Rejected registration claims (counter, labels: reason).
pub const REGISTRATION_ERRORS_TOTAL: &str = "registration_errors_total";
/// Inbound frames that failed to decode (counter, labels: reason).
pub const DECODE_ERRORS_TOTAL: &str = "decode_errors_total";
/// Notifications handed to a connection (counter).
pub const NOTIFICATIONS_DELIVERED_TOTAL: &str = "notifications_delivered_total";
/// Notifications not delivered (counter, labels: reason).
pub const NOTIFICATIONS_SKIPPED_TOTAL: &str = "notifications_skipped_total";

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
    fn metric_names_are_snake_case() {
        let names = [
            WS_CONNECTIONS_TOTAL,
            WS_DISCONNECTIONS_TOTAL,
            WS_CONNECTIONS_ACTIVE,
            WS_HEARTBEAT_TIMEOUTS_TOTAL,
            REGISTRATIONS_TOTAL,
            REGISTRATION_ERRORS_TOTAL,
            DECODE_ERRORS_TOTAL,
            NOTIFICATIONS_DELIVERED_TOTAL,
            NOTIFICATIONS_SKIPPED_TOTAL,
        ];
        for name in names {
            assert!(
                name.chars().all(|c| c.is_ascii_lowercase() || c == '_'),
                "metric name '{name}' must be snake_case"
            );
        }
    }
}
