mod payment;
mod validate;
mod whitelist;

pub use payment::*;
pub use validate::*;
pub use whitelist::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/payments", post(create_payment))
        .route("/payments/history", get(payment_history))
        .route("/payments/{id}", get(check_payment))
        .route("/payments/{id}/cancel", post(cancel_payment))
        .route("/payments/{id}/claim", post(claim_key))
        .route("/validate", post(validate_key))
        .route("/whitelist", get(get_whitelist))
}
