//! Transaction reconciliation.
//!
//! Three independent triggers observe the gateway for the same transaction:
//! the gateway webhook, the client's 5-second status poll, and the server-side
//! poll loop. All of them funnel into [`next_status`], a pure function of
//! `(current status, observation, now)`, and persist the result with a
//! conditional status update so concurrent triggers cannot double-apply.

use rusqlite::Connection;

use crate::db::queries;
use crate::error::Result;
use crate::models::{Transaction, TransactionStatus};

/// What a reconciliation trigger observed at the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Paid,
    Unpaid,
}

/// Compute the successor status, or `None` when the observation changes
/// nothing. Idempotent: feeding the result back in with the same observation
/// always yields `None`.
///
/// A pending transaction whose payment window has elapsed is forced to
/// `expired` regardless of what the gateway reports.
pub fn next_status(
    current: TransactionStatus,
    observation: Observation,
    now: i64,
    window_expires_at: i64,
) -> Option<TransactionStatus> {
    match current {
        TransactionStatus::Pending if now > window_expires_at => Some(TransactionStatus::Expired),
        TransactionStatus::Pending => match observation {
            Observation::Paid => Some(TransactionStatus::Claimable),
            Observation::Unpaid => None,
        },
        // Terminal or already-confirmed states ignore further observations.
        TransactionStatus::Claimable
        | TransactionStatus::Claimed
        | TransactionStatus::Cancelled
        | TransactionStatus::Expired => None,
    }
}

/// Outcome of applying an observation to a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    /// Nothing to do, or a concurrent trigger got there first.
    Unchanged(TransactionStatus),
    /// This call performed the transition.
    Transitioned(TransactionStatus),
}

impl Applied {
    pub fn status(self) -> TransactionStatus {
        match self {
            Applied::Unchanged(s) | Applied::Transitioned(s) => s,
        }
    }

    /// True exactly when this call moved the transaction to `claimable`,
    /// i.e. when the payment-confirmed notification should fire once.
    pub fn newly_claimable(self) -> bool {
        matches!(self, Applied::Transitioned(TransactionStatus::Claimable))
    }
}

/// Apply an observation to a transaction with a conditional write.
///
/// When the guarded update loses a race the stored status is re-read and
/// returned as `Unchanged`; the winning trigger already did the work.
pub fn apply_observation(
    conn: &Connection,
    txn: &Transaction,
    observation: Observation,
    now: i64,
) -> Result<Applied> {
    let Some(new_status) = next_status(txn.status, observation, now, txn.window_expires_at) else {
        return Ok(Applied::Unchanged(txn.status));
    };

    if queries::transition_transaction(conn, &txn.id, txn.status, new_status)? {
        tracing::info!(
            transaction = %txn.id,
            from = %txn.status,
            to = %new_status,
            "transaction reconciled"
        );
        return Ok(Applied::Transitioned(new_status));
    }

    let current = queries::get_transaction(conn, &txn.id)?
        .map(|t| t.status)
        .unwrap_or(txn.status);
    Ok(Applied::Unchanged(current))
}

/// Server-side poll trigger: one reconciliation pass over every pending
/// transaction. Returns how many transitioned.
///
/// Gateway failures are logged per transaction and skipped; the next pass
/// (or the webhook, or the client poll) retries them.
pub async fn reconcile_pending_once(state: &crate::db::AppState) -> Result<usize> {
    use crate::payments::GatewayStatus;

    let pending = {
        let conn = state.db.get()?;
        queries::list_pending_transactions(&conn)?
    };

    let mut transitioned = 0;
    for txn in pending {
        let now = chrono::Utc::now().timestamp();
        let observation = if now > txn.window_expires_at {
            Observation::Unpaid
        } else {
            match state.gateway.check_status(&txn.gateway_ref).await {
                Ok(GatewayStatus::Paid) => Observation::Paid,
                Ok(GatewayStatus::Unpaid) => Observation::Unpaid,
                Err(e) => {
                    tracing::warn!(transaction = %txn.id, "status check failed: {}", e);
                    continue;
                }
            }
        };

        let conn = state.db.get()?;
        let applied = apply_observation(&conn, &txn, observation, now)?;
        if applied.newly_claimable() {
            let notifier = state.notifier.clone();
            let mut paid_txn = txn.clone();
            paid_txn.status = applied.status();
            tokio::spawn(async move { notifier.payment_confirmed(&paid_txn).await });
        }
        if matches!(applied, Applied::Transitioned(_)) {
            transitioned += 1;
        }
    }
    Ok(transitioned)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;
    const WINDOW: i64 = NOW + 900;

    #[test]
    fn pending_paid_becomes_claimable() {
        assert_eq!(
            next_status(TransactionStatus::Pending, Observation::Paid, NOW, WINDOW),
            Some(TransactionStatus::Claimable)
        );
    }

    #[test]
    fn pending_unpaid_stays_put() {
        assert_eq!(
            next_status(TransactionStatus::Pending, Observation::Unpaid, NOW, WINDOW),
            None
        );
    }

    #[test]
    fn pending_past_window_expires_even_if_gateway_says_paid() {
        assert_eq!(
            next_status(
                TransactionStatus::Pending,
                Observation::Paid,
                WINDOW + 1,
                WINDOW
            ),
            Some(TransactionStatus::Expired)
        );
    }

    #[test]
    fn paid_observation_on_claimable_is_a_noop() {
        assert_eq!(
            next_status(TransactionStatus::Claimable, Observation::Paid, NOW, WINDOW),
            None
        );
    }

    #[test]
    fn terminal_states_ignore_observations() {
        for status in [
            TransactionStatus::Claimed,
            TransactionStatus::Cancelled,
            TransactionStatus::Expired,
        ] {
            for obs in [Observation::Paid, Observation::Unpaid] {
                assert_eq!(next_status(status, obs, NOW, WINDOW), None);
                assert_eq!(next_status(status, obs, WINDOW + 100, WINDOW), None);
            }
        }
    }

    #[test]
    fn transitions_converge_after_one_step() {
        // Applying the same observation to the successor yields no change.
        for status in [
            TransactionStatus::Pending,
            TransactionStatus::Claimable,
            TransactionStatus::Claimed,
            TransactionStatus::Cancelled,
            TransactionStatus::Expired,
        ] {
            for obs in [Observation::Paid, Observation::Unpaid] {
                for now in [NOW, WINDOW + 5] {
                    if let Some(next) = next_status(status, obs, now, WINDOW) {
                        assert_eq!(next_status(next, obs, now, WINDOW), None);
                    }
                }
            }
        }
    }
}
