mod qris;

pub use qris::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/qris", post(handle_qris_webhook))
}
