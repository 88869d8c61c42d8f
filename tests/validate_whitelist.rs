//! Device validation (binding + countdown) and the whitelist read views.

use axum::http::StatusCode;
use chrono::Utc;
use serde_json::json;

use keyshop::app;
use keyshop::db::queries;
use keyshop::models::KeyRole;
use keyshop::util::SECONDS_PER_DAY;

mod common;
use common::*;

fn seed_key(state: &keyshop::db::AppState, key: &str, days: i64, max_devices: i64) {
    let conn = state.db.get().unwrap();
    queries::create_key(
        &conn,
        &queries::NewKey {
            key: key.to_string(),
            role: KeyRole::Normal,
            expires_at: Utc::now().timestamp() + days * SECONDS_PER_DAY,
            max_devices,
        },
    )
    .unwrap();
}

#[tokio::test]
async fn validate_binds_device_and_returns_live_countdown() {
    let (state, _sim) = create_test_state();
    let app = app(state.clone());
    seed_key(&state, "AXSTOOLS-VAL-0001", 3, 1);

    let (status, body) = send(
        &app,
        "POST",
        "/validate",
        Some(json!({ "key": "AXSTOOLS-VAL-0001", "hwid": "hwid-1", "username": "player_one" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["role"], "Normal");
    assert_eq!(body["loader_url"], "https://cdn.example/loader.lua");
    // Just under 3 days left.
    let days = body["countdown"]["days"].as_i64().unwrap();
    let hours = body["countdown"]["hours"].as_i64().unwrap();
    assert!(days == 2 || (days == 3 && hours == 0), "countdown: {}", body);

    let conn = state.db.get().unwrap();
    let key = queries::get_key(&conn, "AXSTOOLS-VAL-0001").unwrap().unwrap();
    assert_eq!(key.hwids, vec!["hwid-1".to_string()]);
    assert_eq!(key.registered_users[0].username, "player_one");
}

#[tokio::test]
async fn rebinding_same_device_is_a_noop() {
    let (state, _sim) = create_test_state();
    let app = app(state.clone());
    seed_key(&state, "AXSTOOLS-VAL-0002", 3, 1);

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            "POST",
            "/validate",
            Some(json!({ "key": "AXSTOOLS-VAL-0002", "hwid": "hwid-1" })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let conn = state.db.get().unwrap();
    let key = queries::get_key(&conn, "AXSTOOLS-VAL-0002").unwrap().unwrap();
    assert_eq!(key.hwids.len(), 1);
}

#[tokio::test]
async fn binding_beyond_capacity_is_rejected() {
    let (state, _sim) = create_test_state();
    let app = app(state.clone());
    seed_key(&state, "AXSTOOLS-VAL-0003", 3, 2);

    for hwid in ["hwid-1", "hwid-2"] {
        let (status, _) = send(
            &app,
            "POST",
            "/validate",
            Some(json!({ "key": "AXSTOOLS-VAL-0003", "hwid": hwid })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, body) = send(
        &app,
        "POST",
        "/validate",
        Some(json!({ "key": "AXSTOOLS-VAL-0003", "hwid": "hwid-3" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("capacity"));

    // An already-bound device still validates at capacity.
    let (status, _) = send(
        &app,
        "POST",
        "/validate",
        Some(json!({ "key": "AXSTOOLS-VAL-0003", "hwid": "hwid-2" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn frozen_and_expired_keys_do_not_validate() {
    let (state, _sim) = create_test_state();
    let app = app(state.clone());
    let now = Utc::now().timestamp();

    seed_key(&state, "AXSTOOLS-VAL-FRZN", 3, 1);
    {
        let conn = state.db.get().unwrap();
        let key = queries::get_key(&conn, "AXSTOOLS-VAL-FRZN").unwrap().unwrap();
        assert!(queries::freeze_key_cas(&conn, &key, now).unwrap());
        queries::create_key(
            &conn,
            &queries::NewKey {
                key: "AXSTOOLS-VAL-DEAD".to_string(),
                role: KeyRole::Normal,
                expires_at: now - 10,
                max_devices: 1,
            },
        )
        .unwrap();
    }

    let (status, body) = send(
        &app,
        "POST",
        "/validate",
        Some(json!({ "key": "AXSTOOLS-VAL-FRZN", "hwid": "h" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("frozen"));

    let (status, body) = send(
        &app,
        "POST",
        "/validate",
        Some(json!({ "key": "AXSTOOLS-VAL-DEAD", "hwid": "h" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("expired"));

    let (status, _) = send(
        &app,
        "POST",
        "/validate",
        Some(json!({ "key": "AXSTOOLS-NOPE", "hwid": "h" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn seed_whitelist(state: &keyshop::db::AppState, app: &axum::Router) {
    seed_key(state, "AXSTOOLS-WL-0001", 3, 2);
    seed_key(state, "AXSTOOLS-WL-0002", 3, 1);
    for (key, hwid, user) in [
        ("AXSTOOLS-WL-0001", "hw-1", "alice_rbx"),
        ("AXSTOOLS-WL-0001", "hw-2", "bob_rbx"),
        ("AXSTOOLS-WL-0002", "hw-3", "carol_rbx"),
    ] {
        let (status, _) = send(
            app,
            "POST",
            "/validate",
            Some(json!({ "key": key, "hwid": hwid, "username": user })),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}

#[tokio::test]
async fn whitelist_json_lists_registered_users_of_active_keys() {
    let (state, _sim) = create_test_state();
    let app = app(state.clone());
    seed_whitelist(&state, &app).await;

    // Freeze one key: its users drop out of the view.
    {
        let conn = state.db.get().unwrap();
        let key = queries::get_key(&conn, "AXSTOOLS-WL-0002").unwrap().unwrap();
        assert!(queries::freeze_key_cas(&conn, &key, Utc::now().timestamp()).unwrap());
    }

    let (status, body) = send(&app, "GET", "/whitelist", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let users: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(users.len(), 2);
    assert!(users.contains(&"alice_rbx") && users.contains(&"bob_rbx"));
    assert!(!users.contains(&"carol_rbx"));
}

#[tokio::test]
async fn whitelist_supports_plaintext_and_lua_formats() {
    let (state, _sim) = create_test_state();
    let app = app(state.clone());
    seed_whitelist(&state, &app).await;

    let (status, body) = send_raw(&app, "GET", "/whitelist?format=usernames", None, None).await;
    assert_eq!(status, StatusCode::OK);
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.contains(&"alice_rbx"));

    let (status, body) = send_raw(&app, "GET", "/whitelist?format=lua", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.starts_with("return {"));
    assert!(body.contains("\"bob_rbx\","));

    let (status, _) = send_raw(&app, "GET", "/whitelist?format=xml", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
