pub mod queries;

use std::sync::Arc;

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::error::Result;
use crate::notify::Notifier;
use crate::payments::PaymentGateway;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Notifier,
    /// Content-delivery URL for the client script, echoed by validate-key
    pub loader_url: String,
    pub admin_token: Option<String>,
    pub gateway_webhook_secret: String,
    pub payment_window_minutes: i64,
}

pub fn new_pool(database_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
    let pool = r2d2::Pool::new(manager).map_err(crate::error::AppError::Pool)?;
    let conn = pool.get()?;
    migrate(&conn)?;
    Ok(pool)
}

/// Create the schema. Idempotent; runs at startup and in tests.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS license_keys (
            key                 TEXT PRIMARY KEY,
            created_at          INTEGER NOT NULL,
            expires_at          INTEGER NOT NULL,
            role                TEXT NOT NULL,
            max_devices         INTEGER NOT NULL DEFAULT 1,
            frozen_at           INTEGER,
            frozen_remaining_ms INTEGER,
            version             INTEGER NOT NULL DEFAULT 0,
            CHECK ((frozen_at IS NULL) = (frozen_remaining_ms IS NULL))
        );

        CREATE TABLE IF NOT EXISTS key_devices (
            key           TEXT NOT NULL REFERENCES license_keys(key) ON DELETE CASCADE,
            hwid          TEXT NOT NULL,
            username      TEXT,
            registered_at INTEGER NOT NULL,
            PRIMARY KEY (key, hwid)
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id                TEXT PRIMARY KEY,
            gateway_ref       TEXT NOT NULL UNIQUE,
            customer_key      TEXT NOT NULL,
            package           TEXT NOT NULL,
            duration_days     INTEGER NOT NULL,
            original_amount   INTEGER NOT NULL,
            discount_percent  INTEGER NOT NULL DEFAULT 0,
            total_amount      INTEGER NOT NULL,
            status            TEXT NOT NULL,
            created_at        INTEGER NOT NULL,
            window_expires_at INTEGER NOT NULL,
            paid_at           INTEGER,
            proof_image       TEXT,
            device_id         TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(status);
        CREATE INDEX IF NOT EXISTS idx_transactions_device ON transactions(device_id);

        CREATE TABLE IF NOT EXISTS discounts (
            id         TEXT PRIMARY KEY,
            kind       TEXT NOT NULL,
            min_days   INTEGER,
            max_days   INTEGER,
            percent    INTEGER NOT NULL,
            promo_code TEXT,
            package    TEXT,
            starts_at  INTEGER,
            ends_at    INTEGER,
            enabled    INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL
        );
        ",
    )?;
    Ok(())
}
