use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::claim;
use crate::db::{AppState, queries};
use crate::discount::{self, MINIMUM_CHARGE};
use crate::error::{AppError, Result};
use crate::models::{KeyRole, Transaction, TransactionStatus};
use crate::reconcile::{self, Observation};

#[derive(Debug, Deserialize)]
pub struct CreatePaymentRequest {
    /// License key this purchase targets (created on first claim if new)
    pub key: String,
    pub package: KeyRole,
    pub days: i64,
    /// Undiscounted price of the selected package/duration
    pub amount: i64,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// Origin device, kept for purchase history
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentResponse {
    pub transaction_id: String,
    /// Scannable code payload to render for the buyer
    pub qris_payload: String,
    pub status: TransactionStatus,
    pub original_amount: i64,
    pub discount_percent: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
    /// Unix second the payment window closes
    pub window_expires_at: i64,
}

pub async fn create_payment(
    State(state): State<AppState>,
    Json(request): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>> {
    if request.key.trim().is_empty() {
        return Err(AppError::BadRequest("Key must not be empty".into()));
    }
    if request.days < 1 {
        return Err(AppError::BadRequest("Duration must be at least 1 day".into()));
    }
    if request.amount < MINIMUM_CHARGE {
        return Err(AppError::BadRequest(format!(
            "Amount must be at least {}",
            MINIMUM_CHARGE
        )));
    }

    let now = Utc::now().timestamp();
    let quote = {
        let conn = state.db.get()?;
        let rules = queries::list_discounts(&conn)?;
        let percent = discount::resolve_percent(
            &rules,
            request.package,
            request.days,
            request.promo_code.as_deref(),
            now,
        )
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
        discount::quote(request.amount, percent)
    };

    // Gateway call happens without a pooled connection held.
    let code = state
        .gateway
        .create_code(quote.total_amount, state.payment_window_minutes)
        .await?;

    let txn = Transaction {
        id: Uuid::new_v4().to_string(),
        gateway_ref: code.gateway_ref,
        customer_key: request.key.trim().to_string(),
        package: request.package,
        duration_days: request.days,
        original_amount: quote.original_amount,
        discount_percent: quote.percent,
        total_amount: quote.total_amount,
        status: TransactionStatus::Pending,
        created_at: now,
        window_expires_at: now + state.payment_window_minutes * 60,
        paid_at: None,
        proof_image: None,
        device_id: request.device_id.clone(),
    };

    {
        let conn = state.db.get()?;
        queries::insert_transaction(&conn, &txn)?;
    }

    // Best-effort; never blocks or fails the purchase.
    let notifier = state.notifier.clone();
    let notify_txn = txn.clone();
    tokio::spawn(async move { notifier.order_created(&notify_txn).await });

    Ok(Json(CreatePaymentResponse {
        transaction_id: txn.id,
        qris_payload: code.code_payload,
        status: txn.status,
        original_amount: quote.original_amount,
        discount_percent: quote.percent,
        discount_amount: quote.discount_amount,
        total_amount: quote.total_amount,
        window_expires_at: txn.window_expires_at,
    }))
}

/// Client poll trigger: re-checks the gateway and reconciles.
pub async fn check_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>> {
    let txn = {
        let conn = state.db.get()?;
        queries::get_transaction(&conn, &id)?
            .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?
    };

    if txn.status != TransactionStatus::Pending {
        return Ok(Json(txn));
    }

    let now = Utc::now().timestamp();
    // Past the window the transaction expires no matter what the gateway
    // would say, so skip the upstream call entirely.
    let observation = if now > txn.window_expires_at {
        Observation::Unpaid
    } else {
        match state.gateway.check_status(&txn.gateway_ref).await? {
            crate::payments::GatewayStatus::Paid => Observation::Paid,
            crate::payments::GatewayStatus::Unpaid => Observation::Unpaid,
        }
    };

    let conn = state.db.get()?;
    let applied = reconcile::apply_observation(&conn, &txn, observation, now)?;
    if applied.newly_claimable() {
        let notifier = state.notifier.clone();
        let mut paid_txn = txn.clone();
        paid_txn.status = applied.status();
        tokio::spawn(async move { notifier.payment_confirmed(&paid_txn).await });
    }

    let updated = queries::get_transaction(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;
    Ok(Json(updated))
}

pub async fn cancel_payment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Transaction>> {
    let txn = {
        let conn = state.db.get()?;
        queries::get_transaction(&conn, &id)?
            .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?
    };

    if txn.status != TransactionStatus::Pending {
        return Err(AppError::Conflict(format!(
            "Only pending transactions can be cancelled (status is {})",
            txn.status
        )));
    }

    // Cooperative: a gateway failure must not block the local transition.
    if let Err(e) = state.gateway.cancel(&txn.gateway_ref).await {
        tracing::warn!(transaction = %txn.id, "gateway cancel failed: {}", e);
    }

    let conn = state.db.get()?;
    if !queries::transition_transaction(
        &conn,
        &txn.id,
        TransactionStatus::Pending,
        TransactionStatus::Cancelled,
    )? {
        // A reconciliation trigger or another cancel won the race.
        return Err(AppError::Conflict(
            "Transaction changed state while cancelling".into(),
        ));
    }

    let updated = queries::get_transaction(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;
    Ok(Json(updated))
}

#[derive(Debug, Default, Deserialize)]
pub struct ClaimRequest {
    /// Administrative forced re-issue: reset expiry and role even when the
    /// transaction was already claimed
    #[serde(default)]
    pub force_recreate: bool,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub transaction: Transaction,
    pub key: crate::models::LicenseKey,
}

pub async fn claim_key(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<ClaimRequest>>,
) -> Result<Json<ClaimResponse>> {
    let request = body.map(|Json(b)| b).unwrap_or_default();
    let now = Utc::now().timestamp();

    let mut conn = state.db.get()?;
    let txn = queries::get_transaction(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;

    if !txn.status.is_claimable(request.force_recreate) {
        return Err(AppError::Conflict(format!(
            "Transaction is not claimable (status is {})",
            txn.status
        )));
    }

    let allow_from: &[TransactionStatus] = if request.force_recreate {
        &[TransactionStatus::Claimable, TransactionStatus::Claimed]
    } else {
        &[TransactionStatus::Claimable]
    };

    // Key mutation and status stamp commit together; a racing cancel rolls
    // the key change back.
    let tx = conn.transaction()?;
    let key = claim::process_claim(&tx, &txn, request.force_recreate, now)?;
    if !queries::mark_claimed(&tx, &txn.id, allow_from, now)? {
        return Err(AppError::Conflict(
            "Transaction changed state while claiming".into(),
        ));
    }
    tx.commit()?;

    let transaction = queries::get_transaction(&conn, &id)?
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;
    Ok(Json(ClaimResponse { transaction, key }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub device_id: String,
}

/// Purchase history for the device a transaction originated from.
pub async fn payment_history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<Transaction>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_transactions_for_device(
        &conn,
        &query.device_id,
    )?))
}
