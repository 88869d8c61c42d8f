use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::payments::verify_webhook_signature;
use crate::reconcile::{self, Observation};

#[derive(Debug, Deserialize)]
pub struct QrisWebhookEvent {
    /// The gateway reference issued at code creation
    pub id: String,
    pub status: String,
}

/// Webhook trigger of the reconciliation layer.
///
/// Verified against the shared secret, then funneled into the same
/// idempotent transition function the poll triggers use. Unknown references
/// and no-op observations answer 200 so the gateway stops retrying.
pub async fn handle_qris_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let signature = match headers.get("x-callback-signature").and_then(|s| s.to_str().ok()) {
        Some(s) => s.to_string(),
        None => return (StatusCode::BAD_REQUEST, "Missing x-callback-signature header"),
    };

    if !verify_webhook_signature(&state.gateway_webhook_secret, &body, &signature) {
        return (StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let event: QrisWebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("failed to parse gateway webhook: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    let conn = match state.db.get() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("pool error in webhook: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let txn = match queries::get_transaction_by_gateway_ref(&conn, &event.id) {
        Ok(Some(t)) => t,
        Ok(None) => return (StatusCode::OK, "Unknown reference"),
        Err(e) => {
            tracing::error!("db error in webhook: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let observation = match event.status.to_ascii_uppercase().as_str() {
        "PAID" | "SETTLED" => Observation::Paid,
        _ => Observation::Unpaid,
    };

    let now = Utc::now().timestamp();
    match reconcile::apply_observation(&conn, &txn, observation, now) {
        Ok(applied) => {
            if applied.newly_claimable() {
                let notifier = state.notifier.clone();
                let mut paid_txn = txn.clone();
                paid_txn.status = applied.status();
                tokio::spawn(async move { notifier.payment_confirmed(&paid_txn).await });
            }
            (StatusCode::OK, "ok")
        }
        Err(e) => {
            tracing::error!(transaction = %txn.id, "webhook reconcile failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Reconcile failed")
        }
    }
}
