use axum::{
    Json,
    extract::{Path, State},
};
use serde::Deserialize;

use crate::db::{AppState, queries};
use crate::error::{AppError, Result};
use crate::models::Transaction;

#[derive(Debug, Deserialize)]
pub struct ProofRequest {
    /// Evidence reference (URL or data blob) for manual verification
    pub proof_image: String,
}

/// Attach manual-verification evidence to a transaction.
pub async fn attach_proof(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ProofRequest>,
) -> Result<Json<Transaction>> {
    if request.proof_image.trim().is_empty() {
        return Err(AppError::BadRequest("proof_image must not be empty".into()));
    }
    let conn = state.db.get()?;
    if !queries::set_proof_image(&conn, &id, request.proof_image.trim())? {
        return Err(AppError::NotFound("Transaction not found".into()));
    }
    let updated = queries::get_transaction(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;
    Ok(Json(updated))
}
