//! `/health` endpoint.

use std::time::Instant;

use serde::Serialize;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"OK"` while the server runs.
    pub status: &'static str,
    /// WebSocket counters.
    pub websocket: WebSocketHealth,
    /// Seconds since the server started.
    pub uptime: f64,
}

/// WebSocket section of [`HealthResponse`].
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebSocketHealth {
    /// Registered accounts.
    pub active_connections: usize,
    /// Open connections, registered or not.
    pub total_clients: usize,
}

/// Build a health response from live counters.
pub fn health_check(
    start_time: Instant,
    active_connections: usize,
    total_clients: usize,
) -> HealthResponse {
    HealthResponse {
        status: "OK",
        websocket: WebSocketHealth {
            active_connections,
            total_clients,
        },
        uptime: start_time.elapsed().as_secs_f64(),
    }
}
