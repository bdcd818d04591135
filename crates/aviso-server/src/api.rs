//! HTTP triggers for notifications.
//!
//! These are the hooks the account-creation flow calls after a user is
//! stored. Every route answers `202 Accepted`: delivery is best effort and
//! the body reports what happened.

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::post;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use aviso_core::{AccountId, NotificationMessage, UserData};

use crate::error::ApiError;
use crate::server::AppState;
use crate::websocket::broadcast::BroadcastReport;
use crate::websocket::notifier::DeliveryResult;

/// Body of a targeted notification response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResponse {
    /// Whether the frame was queued on the target's connection.
    pub delivered: bool,
    /// Skip reason label when not delivered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<&DeliveryResult> for DeliveryResponse {
    fn from(result: &DeliveryResult) -> Self {
        Self {
            delivered: result.is_delivered(),
            reason: result.skip_reason().map(|r| r.label().to_owned()),
        }
    }
}

/// Notification routes, mounted under `/api/notifications`.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notifications/new-registration",
            post(notify_new_registration),
        )
        .route("/api/notifications/accounts/{account_id}", post(notify_account))
        .route("/api/notifications/broadcast", post(broadcast))
}

async fn notify_new_registration(
    State(state): State<AppState>,
    Json(user): Json<UserData>,
) -> (StatusCode, Json<DeliveryResponse>) {
    let result = state.relay.notifier().notify_new_registration(&user);
    info!(
        usuario = user.usuario.as_deref(),
        delivered = result.is_delivered(),
        "new registration notice"
    );
    (StatusCode::ACCEPTED, Json(DeliveryResponse::from(&result)))
}

async fn notify_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    Json(user): Json<UserData>,
) -> Result<(StatusCode, Json<DeliveryResponse>), ApiError> {
    let target: AccountId = account_id.parse()?;
    let message = NotificationMessage::new_registration(&user, Utc::now());
    let result = state.relay.notifier().notify(&target, &message);
    Ok((StatusCode::ACCEPTED, Json(DeliveryResponse::from(&result))))
}

async fn broadcast(
    State(state): State<AppState>,
    Json(user): Json<UserData>,
) -> (StatusCode, Json<BroadcastReport>) {
    let message = NotificationMessage::new_registration(&user, Utc::now());
    let report = state.relay.notifier().broadcast(&message);
    info!(
        delivered = report.delivered,
        skipped = report.skipped,
        "broadcast notice"
    );
    (StatusCode::ACCEPTED, Json(report))
}
