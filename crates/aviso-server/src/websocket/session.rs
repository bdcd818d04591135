//! WebSocket session: one connected client from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use aviso_core::ConnectionId;
use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use metrics::counter;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::config::ServerConfig;
use crate::metrics::WS_HEARTBEAT_TIMEOUTS_TOTAL;
use crate::relay::Relay;

/// How long the writer gets to flush the Close frame after the close path ran.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(2);

/// Runs the close path when dropped, including on unwind.
struct CloseGuard {
    relay: Arc<Relay>,
    connection: Arc<ClientConnection>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let _ = self.relay.supervisor().on_close(&self.connection);
    }
}

/// Drive a WebSocket session.
///
/// 1. Queues the `CONEXION_ESTABLECIDA` welcome before reading anything
/// 2. Spawns the writer (outbound queue + pings) and the heartbeat monitor
/// 3. Hands every text frame to the handshake
/// 4. Runs the close path exactly once when the socket ends, errors, times
///    out or the server shuts down
#[instrument(skip_all, fields(conn_id = tracing::field::Empty))]
pub async fn run_ws_session(
    ws: WebSocket,
    relay: Arc<Relay>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (send_tx, mut send_rx) = mpsc::channel::<Arc<String>>(config.send_queue_capacity.max(1));
    let connection = Arc::new(ClientConnection::new(ConnectionId::new(), send_tx));
    let _ = tracing::Span::current().record("conn_id", connection.id().as_str());

    let close_guard = CloseGuard {
        relay: Arc::clone(&relay),
        connection: Arc::clone(&connection),
    };
    let _ = relay.supervisor().on_open(&connection);

    let writer_conn = Arc::clone(&connection);
    let ping_every = config.heartbeat_interval();
    let mut writer = tokio::spawn(async move {
        let mut ping = time::interval(ping_every);
        // skip the immediate first tick
        let _ = ping.tick().await;
        loop {
            tokio::select! {
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.as_str().into())).await.is_err() {
                        break;
                    }
                }
                _ = ping.tick() => {
                    if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
                () = writer_conn.closed() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
        writer_conn.close();
    });

    let heartbeat_conn = Arc::clone(&connection);
    let (interval, timeout) = (config.heartbeat_interval(), config.heartbeat_timeout());
    let heartbeat = tokio::spawn(async move {
        let cancel = heartbeat_conn.cancel_token();
        if run_heartbeat(Arc::clone(&heartbeat_conn), interval, timeout, cancel).await
            == HeartbeatResult::TimedOut
        {
            counter!(WS_HEARTBEAT_TIMEOUTS_TOTAL).increment(1);
            warn!(
                conn_id = %heartbeat_conn.id(),
                ?timeout,
                silent_for = ?heartbeat_conn.last_seen_elapsed(),
                "client unresponsive, disconnecting"
            );
            heartbeat_conn.close();
        }
    });

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = connection.closed() => break,
            () = shutdown.cancelled() => {
                debug!("server shutting down, closing session");
                break;
            }
        };
        let msg = match frame {
            None => break,
            Some(Err(e)) => {
                relay.supervisor().on_error(&connection, &e);
                break;
            }
            Some(Ok(msg)) => msg,
        };
        connection.mark_alive();
        match msg {
            Message::Text(text) => {
                let _ = relay.supervisor().on_message(&connection, text.as_str());
            }
            Message::Binary(data) => match std::str::from_utf8(&data) {
                Ok(text) => {
                    let _ = relay.supervisor().on_message(&connection, text);
                }
                Err(_) => debug!(len = data.len(), "ignoring non-UTF-8 binary frame"),
            },
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    drop(close_guard);
    heartbeat.abort();
    if time::timeout(CLOSE_FLUSH_TIMEOUT, &mut writer).await.is_err() {
        writer.abort();
    }
}
