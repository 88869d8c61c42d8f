//! Shared test harness: in-memory app state, a simulated gateway the test can
//! flip to "paid", and small request helpers.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tower::ServiceExt;

use keyshop::db::{self, AppState, DbPool};
use keyshop::notify::Notifier;
use keyshop::payments::SimulatedGateway;

pub const ADMIN_TOKEN: &str = "test-admin-token";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";

pub fn test_pool() -> DbPool {
    let manager = r2d2_sqlite::SqliteConnectionManager::memory()
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    // One shared connection so every handler sees the same in-memory db.
    let pool = r2d2::Pool::builder().max_size(1).build(manager).unwrap();
    db::migrate(&pool.get().unwrap()).unwrap();
    pool
}

/// App state wired to a simulated gateway that only pays when the test says so.
pub fn create_test_state() -> (AppState, Arc<SimulatedGateway>) {
    let sim = Arc::new(SimulatedGateway::new(3600));
    let state = AppState {
        db: test_pool(),
        gateway: sim.clone(),
        notifier: Notifier::disabled(),
        loader_url: "https://cdn.example/loader.lua".to_string(),
        admin_token: Some(ADMIN_TOKEN.to_string()),
        gateway_webhook_secret: WEBHOOK_SECRET.to_string(),
        payment_window_minutes: 15,
    };
    (state, sim)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, json)
}

pub async fn send_raw(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> (StatusCode, String) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

/// Sign a webhook body the way the gateway does.
pub fn sign_webhook(body: &serde_json::Value) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body.to_string().as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

pub async fn send_webhook(
    app: &Router,
    body: &serde_json::Value,
    signature: &str,
) -> (StatusCode, String) {
    let request = Request::builder()
        .method("POST")
        .uri("/webhooks/qris")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-callback-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8_lossy(&bytes).to_string())
}

/// Create a pending purchase and return `(transaction_id, gateway_ref)`.
pub async fn create_purchase(
    app: &Router,
    state: &AppState,
    key: &str,
    package: &str,
    days: i64,
    amount: i64,
) -> (String, String) {
    let (status, body) = send(
        app,
        "POST",
        "/payments",
        Some(serde_json::json!({
            "key": key,
            "package": package,
            "days": days,
            "amount": amount,
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create payment failed: {}", body);
    let txn_id = body["transaction_id"].as_str().unwrap().to_string();

    let conn = state.db.get().unwrap();
    let txn = keyshop::db::queries::get_transaction(&conn, &txn_id)
        .unwrap()
        .unwrap();
    (txn_id, txn.gateway_ref)
}

/// Drive a pending purchase to `claimable` via the simulated gateway + poll.
pub async fn pay_purchase(
    app: &Router,
    sim: &SimulatedGateway,
    txn_id: &str,
    gateway_ref: &str,
) {
    sim.mark_paid(gateway_ref);
    let (status, body) = send(app, "GET", &format!("/payments/{}", txn_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "claimable", "expected claimable: {}", body);
}
