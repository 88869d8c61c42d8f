//! Shared utility functions for the Keyshop application.

use axum::http::HeaderMap;
use rand::Rng;
use serde::Serialize;

use crate::models::LicenseKey;

pub const SECONDS_PER_DAY: i64 = 86400;
pub const MS_PER_SECOND: i64 = 1000;

/// Real-time countdown breakdown returned to clients.
///
/// Always computed from the wall clock at call time; the server never caches
/// or pushes countdown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Countdown {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Countdown {
    pub fn from_ms(ms: i64) -> Self {
        let total_secs = ms.max(0) / MS_PER_SECOND;
        Self {
            days: total_secs / 86400,
            hours: (total_secs % 86400) / 3600,
            minutes: (total_secs % 3600) / 60,
            seconds: total_secs % 60,
        }
    }
}

/// Milliseconds of validity left on a key at `now` (unix seconds).
///
/// A frozen key's countdown is its stored remainder, independent of the wall
/// clock; an unfrozen key counts down from `expires_at`.
pub fn remaining_ms(key: &LicenseKey, now: i64) -> i64 {
    match key.frozen_remaining_ms {
        Some(ms) if key.frozen_at.is_some() => ms.max(0),
        _ => ((key.expires_at - now) * MS_PER_SECOND).max(0),
    }
}

/// Generate a fresh license key string, e.g. `AXSTOOLS-7F2K-Q9ZD-M4XP`.
pub fn generate_key() -> String {
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
    let mut rng = rand::thread_rng();
    let mut group = || -> String {
        (0..4)
            .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
            .collect()
    };
    format!("AXSTOOLS-{}-{}-{}", group(), group(), group())
}

/// Extract a Bearer token from the Authorization header.
///
/// Returns the token string without the "Bearer " prefix, or None if
/// the header is missing, malformed, or empty after the prefix.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
}
