use axum::{Json, extract::State};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::KeyRole;
use crate::util::{Countdown, remaining_ms};

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub key: String,
    pub hwid: String,
    /// Display name to register on the whitelist alongside the binding
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub role: KeyRole,
    /// Wall-clock countdown computed at call time, never cached
    pub countdown: Countdown,
    pub expires_at: i64,
    /// Where the client fetches its script from
    pub loader_url: String,
}

/// Device validation read path used by the external client.
///
/// Applies the same frozen/expired/capacity checks as device binding, binds
/// the device when there is room, and returns a real-time countdown.
pub async fn validate_key(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>> {
    if request.key.trim().is_empty() || request.hwid.trim().is_empty() {
        return Err(AppError::BadRequest("Key and hwid are required".into()));
    }

    let now = Utc::now().timestamp();
    let mut conn = state.db.get()?;

    // Immediate transaction so the capacity check and the insert serialize
    // against concurrent binds on other pool connections.
    let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

    let key = queries::get_key(&tx, request.key.trim())?
        .ok_or_else(|| AppError::NotFound("License key not found".into()))?;

    if key.is_frozen() {
        return Err(AppError::Conflict("Key is frozen".into()));
    }
    if key.is_expired(now) {
        return Err(AppError::Conflict("Key has expired".into()));
    }

    let already_bound = key.hwids.iter().any(|h| h == request.hwid.trim());
    if !already_bound && key.hwids.len() as i64 >= key.max_devices {
        return Err(AppError::Conflict(format!(
            "Device capacity exceeded ({}/{})",
            key.hwids.len(),
            key.max_devices
        )));
    }

    queries::bind_device(
        &tx,
        &key.key,
        request.hwid.trim(),
        request.username.as_deref(),
    )?;
    tx.commit()?;

    Ok(Json(ValidateResponse {
        valid: true,
        role: key.role,
        countdown: Countdown::from_ms(remaining_ms(&key, now)),
        expires_at: key.expires_at,
        loader_url: state.loader_url.clone(),
    }))
}
