use axum::{
    Json,
    extract::{Path, State},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::{CreateDiscount, Discount, DiscountKind, UpdateDiscount};

fn validate_percent(percent: i64) -> Result<()> {
    if !(0..=100).contains(&percent) {
        return Err(AppError::BadRequest("percent must be between 0 and 100".into()));
    }
    Ok(())
}

pub async fn create_discount(
    State(state): State<AppState>,
    Json(input): Json<CreateDiscount>,
) -> Result<Json<Discount>> {
    validate_percent(input.percent)?;
    match input.kind {
        DiscountKind::PromoCode => {
            if input.promo_code.as_deref().is_none_or(|c| c.trim().is_empty()) {
                return Err(AppError::BadRequest(
                    "promo_code rules require a promo_code".into(),
                ));
            }
        }
        DiscountKind::DurationBased => {
            if input.min_days.is_none() {
                return Err(AppError::BadRequest(
                    "duration_based rules require min_days".into(),
                ));
            }
        }
        DiscountKind::Percentage => {}
    }
    if let (Some(min), Some(max)) = (input.min_days, input.max_days)
        && max < min
    {
        return Err(AppError::BadRequest("max_days must be >= min_days".into()));
    }

    let conn = state.db.get()?;
    Ok(Json(queries::create_discount(&conn, &input)?))
}

pub async fn list_discounts(State(state): State<AppState>) -> Result<Json<Vec<Discount>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_discounts(&conn)?))
}

pub async fn update_discount(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<UpdateDiscount>,
) -> Result<Json<Discount>> {
    if let Some(percent) = input.percent {
        validate_percent(percent)?;
    }
    let conn = state.db.get()?;
    if !queries::update_discount(&conn, &id, &input)? {
        return Err(AppError::NotFound(
            "Discount not found or nothing to update".into(),
        ));
    }
    let updated = queries::get_discount(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Discount not found".into()))?;
    Ok(Json(updated))
}

pub async fn delete_discount(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let conn = state.db.get()?;
    if !queries::delete_discount(&conn, &id)? {
        return Err(AppError::NotFound("Discount not found".into()));
    }
    Ok(Json(serde_json::json!({ "deleted": true })))
}
