//! Key claim processing.
//!
//! Converts a claimable transaction into a created-or-extended license key.
//! All writes are per-record conditional updates on the key's version, so a
//! claim racing an admin mutation retries against fresh state instead of
//! silently overwriting it.

use rusqlite::Connection;

use crate::db::queries::{self, NewKey};
use crate::error::{AppError, Result};
use crate::models::{LicenseKey, Transaction};
use crate::util::{MS_PER_SECOND, SECONDS_PER_DAY};

const CAS_RETRIES: usize = 3;

/// Apply a transaction's purchased duration to its target key.
///
/// - key absent: create it with `expires_at = now + days`, role from the
///   package, a single device slot and no bindings;
/// - key present and valid: additive extension, `expires_at += days`
///   (a frozen key gets the days added to its stored remainder instead);
/// - key present but already expired: fresh start, `expires_at = now + days`;
/// - `force_recreate`: reset to `now + days`, overwrite the role and clear
///   any freeze unconditionally. Existing device bindings are left untouched.
pub fn process_claim(
    conn: &Connection,
    txn: &Transaction,
    force_recreate: bool,
    now: i64,
) -> Result<LicenseKey> {
    let added_secs = txn.duration_days * SECONDS_PER_DAY;

    for _ in 0..CAS_RETRIES {
        let Some(existing) = queries::get_key(conn, &txn.customer_key)? else {
            return queries::create_key(
                conn,
                &NewKey {
                    key: txn.customer_key.clone(),
                    role: txn.package,
                    expires_at: now + added_secs,
                    max_devices: 1,
                },
            );
        };

        let written = if force_recreate {
            queries::reset_key_cas(
                conn,
                &existing.key,
                existing.version,
                now + added_secs,
                txn.package,
            )?
        } else if existing.is_frozen() {
            // The countdown is paused; stack the purchased time onto the
            // stored remainder so none of it starts ticking early.
            let remaining = existing.frozen_remaining_ms.unwrap_or(0).max(0);
            queries::set_frozen_remaining_cas(
                conn,
                &existing.key,
                existing.version,
                remaining + added_secs * MS_PER_SECOND,
            )?
        } else if existing.is_expired(now) {
            queries::set_key_expiry_cas(conn, &existing.key, existing.version, now + added_secs)?
        } else {
            queries::set_key_expiry_cas(
                conn,
                &existing.key,
                existing.version,
                existing.expires_at + added_secs,
            )?
        };

        if written {
            return queries::get_key(conn, &txn.customer_key)?.ok_or_else(|| {
                AppError::Internal(format!(
                    "key '{}' disappeared after claim write",
                    txn.customer_key
                ))
            });
        }
        // Lost the conditional write; re-read and try again.
        tracing::debug!(key = %txn.customer_key, "claim lost a conditional write, retrying");
    }

    Err(AppError::Conflict(format!(
        "Key '{}' is being modified concurrently, try again",
        txn.customer_key
    )))
}
