use std::collections::HashMap;
use std::str::FromStr;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params, types::Value};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::*;

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

/// Parse a TEXT column into an enum, reporting a conversion failure rusqlite
/// understands instead of panicking on bad data.
fn parse_enum<T: FromStr>(idx: usize, s: String) -> rusqlite::Result<T> {
    s.parse().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid enum value: {}", s).into(),
        )
    })
}

/// Builder for dynamic UPDATE statements with optional fields.
/// Combines multiple field updates into a single query.
struct UpdateBuilder {
    table: &'static str,
    id_column: &'static str,
    id: String,
    fields: Vec<(&'static str, Value)>,
    bump_version: bool,
}

impl UpdateBuilder {
    fn new(table: &'static str, id_column: &'static str, id: &str) -> Self {
        Self {
            table,
            id_column,
            id: id.to_string(),
            fields: Vec::new(),
            bump_version: false,
        }
    }

    /// Increment the record's `version` column alongside the update.
    fn with_version_bump(mut self) -> Self {
        self.bump_version = true;
        self
    }

    fn set(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.fields.push((column, value.into()));
        self
    }

    fn set_opt<V: Into<Value>>(self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(column, v),
            None => self,
        }
    }

    /// Set a column to an explicit value (including NULL).
    fn set_nullable<V: Into<Value>>(mut self, column: &'static str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.fields.push((column, v.into())),
            None => self.fields.push((column, Value::Null)),
        }
        self
    }

    fn execute(self, conn: &Connection) -> Result<bool> {
        if self.fields.is_empty() {
            return Ok(false);
        }
        let mut sets: Vec<String> = self
            .fields
            .iter()
            .map(|(col, _)| format!("{} = ?", col))
            .collect();
        if self.bump_version {
            sets.push("version = version + 1".to_string());
        }
        let mut values: Vec<Value> = self.fields.into_iter().map(|(_, v)| v).collect();
        values.push(self.id.into());
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            self.table,
            sets.join(", "),
            self.id_column
        );
        let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
        Ok(affected > 0)
    }
}

// ============ License keys ============

const KEY_COLS: &str =
    "key, created_at, expires_at, role, max_devices, frozen_at, frozen_remaining_ms, version";

#[derive(Debug)]
pub struct NewKey {
    pub key: String,
    pub role: KeyRole,
    pub expires_at: i64,
    pub max_devices: i64,
}

fn key_from_row(row: &Row) -> rusqlite::Result<LicenseKey> {
    Ok(LicenseKey {
        key: row.get(0)?,
        created_at: row.get(1)?,
        expires_at: row.get(2)?,
        role: parse_enum(3, row.get::<_, String>(3)?)?,
        max_devices: row.get(4)?,
        frozen_at: row.get(5)?,
        frozen_remaining_ms: row.get(6)?,
        version: row.get(7)?,
        hwids: Vec::new(),
        registered_users: Vec::new(),
    })
}

fn load_devices(conn: &Connection, key: &mut LicenseKey) -> Result<()> {
    let mut stmt = conn.prepare(
        "SELECT hwid, username, registered_at FROM key_devices
         WHERE key = ?1 ORDER BY registered_at, hwid",
    )?;
    let rows = stmt.query_map(params![&key.key], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, i64>(2)?,
        ))
    })?;
    for row in rows {
        let (hwid, username, registered_at) = row?;
        key.hwids.push(hwid.clone());
        if let Some(username) = username {
            key.registered_users.push(RegisteredUser {
                hwid,
                username,
                registered_at,
            });
        }
    }
    Ok(())
}

pub fn create_key(conn: &Connection, input: &NewKey) -> Result<LicenseKey> {
    let created_at = now();
    conn.execute(
        "INSERT INTO license_keys (key, created_at, expires_at, role, max_devices)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            &input.key,
            created_at,
            input.expires_at,
            input.role.as_ref(),
            input.max_devices
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Conflict(format!("Key '{}' already exists", input.key))
        }
        other => AppError::Database(other),
    })?;

    Ok(LicenseKey {
        key: input.key.clone(),
        created_at,
        expires_at: input.expires_at,
        role: input.role,
        max_devices: input.max_devices,
        frozen_at: None,
        frozen_remaining_ms: None,
        hwids: Vec::new(),
        registered_users: Vec::new(),
        version: 0,
    })
}

pub fn get_key(conn: &Connection, key: &str) -> Result<Option<LicenseKey>> {
    let record = conn
        .query_row(
            &format!("SELECT {} FROM license_keys WHERE key = ?1", KEY_COLS),
            params![key],
            key_from_row,
        )
        .optional()?;
    let Some(mut record) = record else {
        return Ok(None);
    };
    load_devices(conn, &mut record)?;
    Ok(Some(record))
}

pub fn list_keys(conn: &Connection) -> Result<Vec<LicenseKey>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM license_keys ORDER BY created_at DESC",
        KEY_COLS
    ))?;
    let mut keys: Vec<LicenseKey> = stmt
        .query_map([], key_from_row)?
        .collect::<rusqlite::Result<_>>()?;

    // One pass over all bindings instead of a query per key.
    let mut stmt = conn.prepare(
        "SELECT key, hwid, username, registered_at FROM key_devices
         ORDER BY registered_at, hwid",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, i64>(3)?,
        ))
    })?;
    let mut by_key: HashMap<String, Vec<(String, Option<String>, i64)>> = HashMap::new();
    for row in rows {
        let (key, hwid, username, registered_at) = row?;
        by_key
            .entry(key)
            .or_default()
            .push((hwid, username, registered_at));
    }
    for key in &mut keys {
        if let Some(devices) = by_key.remove(&key.key) {
            for (hwid, username, registered_at) in devices {
                key.hwids.push(hwid.clone());
                if let Some(username) = username {
                    key.registered_users.push(RegisteredUser {
                        hwid,
                        username,
                        registered_at,
                    });
                }
            }
        }
    }
    Ok(keys)
}

pub fn update_key(conn: &Connection, key: &str, input: &UpdateKey) -> Result<bool> {
    UpdateBuilder::new("license_keys", "key", key)
        .with_version_bump()
        .set_opt("role", input.role.map(|r| r.as_ref().to_string()))
        .set_opt("expires_at", input.expires_at)
        .set_opt("max_devices", input.max_devices)
        .execute(conn)
}

pub fn delete_key(conn: &Connection, key: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM license_keys WHERE key = ?1", params![key])?;
    Ok(deleted > 0)
}

/// Insert a device binding; re-binding an already-bound device is a no-op
/// apart from back-filling a username registration.
pub fn bind_device(
    conn: &Connection,
    key: &str,
    hwid: &str,
    username: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO key_devices (key, hwid, username, registered_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(key, hwid) DO UPDATE
         SET username = COALESCE(excluded.username, key_devices.username)",
        params![key, hwid, username, now()],
    )?;
    Ok(())
}

/// Conditionally freeze a key: succeeds only if the record is still at the
/// version the caller read and not already frozen.
pub fn freeze_key_cas(conn: &Connection, key: &LicenseKey, frozen_at: i64) -> Result<bool> {
    let remaining_ms = ((key.expires_at - frozen_at) * 1000).max(0);
    let affected = conn.execute(
        "UPDATE license_keys
         SET frozen_at = ?1, frozen_remaining_ms = ?2, version = version + 1
         WHERE key = ?3 AND version = ?4 AND frozen_at IS NULL",
        params![frozen_at, remaining_ms, &key.key, key.version],
    )?;
    Ok(affected > 0)
}

/// Conditionally unfreeze: restores `expires_at = now + remainder` and clears
/// both freeze fields.
pub fn unfreeze_key_cas(conn: &Connection, key: &LicenseKey, now: i64) -> Result<bool> {
    let remaining_ms = key.frozen_remaining_ms.unwrap_or(0).max(0);
    let new_expires_at = now + remaining_ms / 1000;
    let affected = conn.execute(
        "UPDATE license_keys
         SET expires_at = ?1, frozen_at = NULL, frozen_remaining_ms = NULL,
             version = version + 1
         WHERE key = ?2 AND version = ?3 AND frozen_at IS NOT NULL",
        params![new_expires_at, &key.key, key.version],
    )?;
    Ok(affected > 0)
}

/// Conditional expiry rewrite, used by the claim processor and the admin
/// time-adjustment tool.
pub fn set_key_expiry_cas(
    conn: &Connection,
    key: &str,
    expected_version: i64,
    expires_at: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE license_keys SET expires_at = ?1, version = version + 1
         WHERE key = ?2 AND version = ?3",
        params![expires_at, key, expected_version],
    )?;
    Ok(affected > 0)
}

/// Forced re-issue: rewrite expiry and role and clear any freeze, so the new
/// validity starts counting down immediately.
pub fn reset_key_cas(
    conn: &Connection,
    key: &str,
    expected_version: i64,
    expires_at: i64,
    role: KeyRole,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE license_keys
         SET expires_at = ?1, role = ?2, frozen_at = NULL, frozen_remaining_ms = NULL,
             version = version + 1
         WHERE key = ?3 AND version = ?4",
        params![expires_at, role.as_ref(), key, expected_version],
    )?;
    Ok(affected > 0)
}

/// Conditional rewrite of a frozen key's stored remainder.
pub fn set_frozen_remaining_cas(
    conn: &Connection,
    key: &str,
    expected_version: i64,
    remaining_ms: i64,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE license_keys SET frozen_remaining_ms = ?1, version = version + 1
         WHERE key = ?2 AND version = ?3 AND frozen_at IS NOT NULL",
        params![remaining_ms.max(0), key, expected_version],
    )?;
    Ok(affected > 0)
}

/// Drop keys that are expired and not frozen. Invoked lazily from get-keys
/// and explicitly from the sweep operation.
pub fn prune_expired_keys(conn: &Connection, now: i64) -> Result<usize> {
    let deleted = conn.execute(
        "DELETE FROM license_keys WHERE frozen_at IS NULL AND expires_at < ?1",
        params![now],
    )?;
    Ok(deleted)
}

/// Whitelist source rows: registered users of active, non-frozen keys.
pub fn list_whitelist_users(conn: &Connection, now: i64) -> Result<Vec<RegisteredUser>> {
    let mut stmt = conn.prepare(
        "SELECT d.hwid, d.username, d.registered_at
         FROM key_devices d
         JOIN license_keys k ON k.key = d.key
         WHERE d.username IS NOT NULL
           AND k.frozen_at IS NULL
           AND k.expires_at >= ?1
         ORDER BY d.registered_at, d.hwid",
    )?;
    let rows = stmt.query_map(params![now], |row| {
        Ok(RegisteredUser {
            hwid: row.get(0)?,
            username: row.get(1)?,
            registered_at: row.get(2)?,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

// ============ Transactions ============

const TXN_COLS: &str = "id, gateway_ref, customer_key, package, duration_days, original_amount, \
     discount_percent, total_amount, status, created_at, window_expires_at, paid_at, \
     proof_image, device_id";

fn txn_from_row(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        gateway_ref: row.get(1)?,
        customer_key: row.get(2)?,
        package: parse_enum(3, row.get::<_, String>(3)?)?,
        duration_days: row.get(4)?,
        original_amount: row.get(5)?,
        discount_percent: row.get(6)?,
        total_amount: row.get(7)?,
        status: parse_enum(8, row.get::<_, String>(8)?)?,
        created_at: row.get(9)?,
        window_expires_at: row.get(10)?,
        paid_at: row.get(11)?,
        proof_image: row.get(12)?,
        device_id: row.get(13)?,
    })
}

pub fn insert_transaction(conn: &Connection, txn: &Transaction) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO transactions ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            TXN_COLS
        ),
        params![
            &txn.id,
            &txn.gateway_ref,
            &txn.customer_key,
            txn.package.as_ref(),
            txn.duration_days,
            txn.original_amount,
            txn.discount_percent,
            txn.total_amount,
            txn.status.to_string(),
            txn.created_at,
            txn.window_expires_at,
            txn.paid_at,
            txn.proof_image,
            txn.device_id,
        ],
    )?;
    Ok(())
}

pub fn get_transaction(conn: &Connection, id: &str) -> Result<Option<Transaction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM transactions WHERE id = ?1", TXN_COLS),
            params![id],
            txn_from_row,
        )
        .optional()?)
}

pub fn get_transaction_by_gateway_ref(
    conn: &Connection,
    gateway_ref: &str,
) -> Result<Option<Transaction>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM transactions WHERE gateway_ref = ?1",
                TXN_COLS
            ),
            params![gateway_ref],
            txn_from_row,
        )
        .optional()?)
}

/// Pending transactions, oldest first, for the server-side reconciliation pass.
pub fn list_pending_transactions(conn: &Connection) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions WHERE status = 'pending' ORDER BY created_at",
        TXN_COLS
    ))?;
    let rows = stmt.query_map([], txn_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Purchase history for the device a transaction originated from.
pub fn list_transactions_for_device(
    conn: &Connection,
    device_id: &str,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM transactions WHERE device_id = ?1 ORDER BY created_at DESC",
        TXN_COLS
    ))?;
    let rows = stmt.query_map(params![device_id], txn_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

/// Guarded status transition: only succeeds if the stored status still equals
/// `from`. This is what keeps the three reconciliation triggers (and a racing
/// cancel) from double-applying.
pub fn transition_transaction(
    conn: &Connection,
    id: &str,
    from: TransactionStatus,
    to: TransactionStatus,
) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET status = ?1 WHERE id = ?2 AND status = ?3",
        params![to.to_string(), id, from.to_string()],
    )?;
    Ok(affected > 0)
}

/// Move a transaction to `claimed` and stamp `paid_at` (first claim only;
/// a forced re-issue of an already-claimed transaction keeps the original
/// timestamp). `allow_from` guards against racing cancels.
pub fn mark_claimed(
    conn: &Connection,
    id: &str,
    allow_from: &[TransactionStatus],
    now: i64,
) -> Result<bool> {
    let placeholders = allow_from
        .iter()
        .enumerate()
        .map(|(i, _)| format!("?{}", i + 3))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE transactions
         SET status = 'claimed', paid_at = COALESCE(paid_at, ?1)
         WHERE id = ?2 AND status IN ({})",
        placeholders
    );
    let mut values: Vec<Value> = vec![now.into(), id.to_string().into()];
    values.extend(allow_from.iter().map(|s| Value::from(s.to_string())));
    let affected = conn.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(affected > 0)
}

pub fn set_proof_image(conn: &Connection, id: &str, proof_image: &str) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE transactions SET proof_image = ?1 WHERE id = ?2",
        params![proof_image, id],
    )?;
    Ok(affected > 0)
}

// ============ Discounts ============

const DISCOUNT_COLS: &str =
    "id, kind, min_days, max_days, percent, promo_code, package, starts_at, ends_at, \
     enabled, created_at";

fn discount_from_row(row: &Row) -> rusqlite::Result<Discount> {
    Ok(Discount {
        id: row.get(0)?,
        kind: parse_enum(1, row.get::<_, String>(1)?)?,
        min_days: row.get(2)?,
        max_days: row.get(3)?,
        percent: row.get(4)?,
        promo_code: row.get(5)?,
        package: match row.get::<_, Option<String>>(6)? {
            Some(s) => Some(parse_enum(6, s)?),
            None => None,
        },
        starts_at: row.get(7)?,
        ends_at: row.get(8)?,
        enabled: row.get(9)?,
        created_at: row.get(10)?,
    })
}

pub fn create_discount(conn: &Connection, input: &CreateDiscount) -> Result<Discount> {
    let id = gen_id();
    let created_at = now();
    conn.execute(
        &format!(
            "INSERT INTO discounts ({})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            DISCOUNT_COLS
        ),
        params![
            &id,
            input.kind.as_ref(),
            input.min_days,
            input.max_days,
            input.percent,
            input.promo_code,
            input.package.map(|p| p.as_ref().to_string()),
            input.starts_at,
            input.ends_at,
            input.enabled,
            created_at,
        ],
    )?;
    Ok(Discount {
        id,
        kind: input.kind,
        min_days: input.min_days,
        max_days: input.max_days,
        percent: input.percent,
        promo_code: input.promo_code.clone(),
        package: input.package,
        starts_at: input.starts_at,
        ends_at: input.ends_at,
        enabled: input.enabled,
        created_at,
    })
}

pub fn list_discounts(conn: &Connection) -> Result<Vec<Discount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM discounts ORDER BY created_at",
        DISCOUNT_COLS
    ))?;
    let rows = stmt.query_map([], discount_from_row)?;
    Ok(rows.collect::<rusqlite::Result<_>>()?)
}

pub fn get_discount(conn: &Connection, id: &str) -> Result<Option<Discount>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM discounts WHERE id = ?1", DISCOUNT_COLS),
            params![id],
            discount_from_row,
        )
        .optional()?)
}

pub fn update_discount(conn: &Connection, id: &str, input: &UpdateDiscount) -> Result<bool> {
    let mut builder = UpdateBuilder::new("discounts", "id", id)
        .set_opt("percent", input.percent)
        .set_opt("enabled", input.enabled);
    if let Some(v) = &input.min_days {
        builder = builder.set_nullable("min_days", *v);
    }
    if let Some(v) = &input.max_days {
        builder = builder.set_nullable("max_days", *v);
    }
    if let Some(v) = &input.promo_code {
        builder = builder.set_nullable("promo_code", v.clone());
    }
    if let Some(v) = &input.package {
        builder = builder.set_nullable("package", v.map(|p| p.as_ref().to_string()));
    }
    if let Some(v) = &input.starts_at {
        builder = builder.set_nullable("starts_at", *v);
    }
    if let Some(v) = &input.ends_at {
        builder = builder.set_nullable("ends_at", *v);
    }
    builder.execute(conn)
}

pub fn delete_discount(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM discounts WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}
