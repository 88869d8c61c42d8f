use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::db::{AppState, queries};
use crate::duration::parse_duration;
use crate::error::{AppError, Result};
use crate::models::{CreateKey, LicenseKey, UpdateKey};
use crate::util::{MS_PER_SECOND, SECONDS_PER_DAY, generate_key};

const CAS_RETRIES: usize = 3;

pub async fn create_key(
    State(state): State<AppState>,
    Json(input): Json<CreateKey>,
) -> Result<Json<LicenseKey>> {
    if input.days < 1 {
        return Err(AppError::BadRequest("Duration must be at least 1 day".into()));
    }
    if input.max_devices < 1 {
        return Err(AppError::BadRequest("max_devices must be at least 1".into()));
    }
    let key = match &input.key {
        Some(k) if !k.trim().is_empty() => k.trim().to_string(),
        _ => generate_key(),
    };

    let now = Utc::now().timestamp();
    let conn = state.db.get()?;
    let created = queries::create_key(
        &conn,
        &queries::NewKey {
            key,
            role: input.role,
            expires_at: now + input.days * SECONDS_PER_DAY,
            max_devices: input.max_devices,
        },
    )?;
    Ok(Json(created))
}

/// List all keys. Also the lazy GC point: expired, non-frozen records are
/// pruned before the listing is produced.
pub async fn get_keys(State(state): State<AppState>) -> Result<Json<Vec<LicenseKey>>> {
    let now = Utc::now().timestamp();
    let conn = state.db.get()?;
    queries::prune_expired_keys(&conn, now)?;
    Ok(Json(queries::list_keys(&conn)?))
}

pub async fn update_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(input): Json<UpdateKey>,
) -> Result<Json<LicenseKey>> {
    if let Some(max) = input.max_devices
        && max < 1
    {
        return Err(AppError::BadRequest("max_devices must be at least 1".into()));
    }
    let conn = state.db.get()?;
    if !queries::update_key(&conn, &key, &input)? {
        return Err(AppError::NotFound("Key not found or nothing to update".into()));
    }
    let updated = queries::get_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("Key not found".into()))?;
    Ok(Json(updated))
}

pub async fn delete_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    if !queries::delete_key(&conn, &key)? {
        return Err(AppError::NotFound("Key not found".into()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Pause the key's countdown, capturing the remaining validity.
pub async fn freeze_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseKey>> {
    let now = Utc::now().timestamp();
    let conn = state.db.get()?;
    let record = queries::get_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("Key not found".into()))?;
    if record.is_frozen() {
        return Err(AppError::Conflict("Key is already frozen".into()));
    }
    if !queries::freeze_key_cas(&conn, &record, now)? {
        return Err(AppError::Conflict(
            "Key was modified concurrently, try again".into(),
        ));
    }
    let updated = queries::get_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("Key not found".into()))?;
    Ok(Json(updated))
}

/// Resume the countdown: `expires_at = now + stored remainder`.
pub async fn unfreeze_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LicenseKey>> {
    let now = Utc::now().timestamp();
    let conn = state.db.get()?;
    let record = queries::get_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("Key not found".into()))?;
    if !record.is_frozen() {
        return Err(AppError::Conflict("Key is not frozen".into()));
    }
    if !queries::unfreeze_key_cas(&conn, &record, now)? {
        return Err(AppError::Conflict(
            "Key was modified concurrently, try again".into(),
        ));
    }
    let updated = queries::get_key(&conn, &key)?
        .ok_or_else(|| AppError::NotFound("Key not found".into()))?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct AdjustRequest {
    /// Freeform signed duration, e.g. "7d", "12h30m", "-3d"
    pub duration: String,
}

/// Bulk time-adjustment tool: add or subtract validity from a key.
///
/// On a frozen key the adjustment lands on the stored remainder; otherwise it
/// shifts `expires_at` directly.
pub async fn adjust_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(request): Json<AdjustRequest>,
) -> Result<Json<LicenseKey>> {
    let delta = parse_duration(&request.duration).map_err(AppError::BadRequest)?;
    let delta_secs = delta.num_seconds();
    let conn = state.db.get()?;

    for _ in 0..CAS_RETRIES {
        let record = queries::get_key(&conn, &key)?
            .ok_or_else(|| AppError::NotFound("Key not found".into()))?;

        let written = if record.is_frozen() {
            let remaining = record.frozen_remaining_ms.unwrap_or(0);
            queries::set_frozen_remaining_cas(
                &conn,
                &record.key,
                record.version,
                remaining + delta_secs * MS_PER_SECOND,
            )?
        } else {
            queries::set_key_expiry_cas(
                &conn,
                &record.key,
                record.version,
                record.expires_at + delta_secs,
            )?
        };
        if written {
            let updated = queries::get_key(&conn, &key)?
                .ok_or_else(|| AppError::NotFound("Key not found".into()))?;
            return Ok(Json(updated));
        }
    }

    Err(AppError::Conflict(
        "Key was modified concurrently, try again".into(),
    ))
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub pruned: usize,
}

/// Explicit, independently schedulable expiry sweep.
pub async fn sweep_keys(State(state): State<AppState>) -> Result<Json<SweepResponse>> {
    let now = Utc::now().timestamp();
    let conn = state.db.get()?;
    let pruned = queries::prune_expired_keys(&conn, now)?;
    if pruned > 0 {
        tracing::info!(pruned, "expired keys swept");
    }
    Ok(Json(SweepResponse { pruned }))
}
