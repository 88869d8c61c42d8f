use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};
use strum::{AsRefStr, Display, EnumString};

use super::iso8601;

/// Access tier a key grants. Doubles as the package name on purchases:
/// buying package "NORMAL" yields (or extends) a Normal-role key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum KeyRole {
    Developer,
    #[strum(serialize = "VIP")]
    Vip,
    Normal,
    Free,
}

// Package names arrive in whatever casing the storefront uses ("NORMAL",
// "vip"), so deserialization goes through the case-insensitive FromStr.
impl Serialize for KeyRole {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_ref())
    }
}

impl<'de> Deserialize<'de> for KeyRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse()
            .map_err(|_| D::Error::custom(format!("unknown role/package '{}'", s)))
    }
}

/// A registered user on a key: a device binding that also carries the
/// player's display name for the whitelist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisteredUser {
    pub hwid: String,
    pub username: String,
    #[serde(rename = "registeredAt", with = "iso8601")]
    pub registered_at: i64,
}

/// A license key record.
///
/// Serialized form is the persisted wire format:
/// `{ key, expired, created, role, maxHwid, frozenUntil, frozenRemainingMs,
///    hwids, robloxUsers }` with ISO 8601 timestamps.
///
/// Invariants:
/// - `frozen_at` and `frozen_remaining_ms` are both null or both set;
/// - while frozen the countdown is the stored remainder, independent of the
///   wall clock;
/// - `registered_users.len() <= hwids.len() <= max_devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseKey {
    pub key: String,
    #[serde(rename = "created", with = "iso8601")]
    pub created_at: i64,
    #[serde(rename = "expired", with = "iso8601")]
    pub expires_at: i64,
    pub role: KeyRole,
    #[serde(rename = "maxHwid")]
    pub max_devices: i64,
    #[serde(rename = "frozenUntil", with = "iso8601::option", default)]
    pub frozen_at: Option<i64>,
    #[serde(rename = "frozenRemainingMs", default)]
    pub frozen_remaining_ms: Option<i64>,
    #[serde(default)]
    pub hwids: Vec<String>,
    #[serde(rename = "robloxUsers", default)]
    pub registered_users: Vec<RegisteredUser>,
    /// Monotonic per-record counter used for conditional writes; not part of
    /// the wire format.
    #[serde(skip)]
    pub version: i64,
}

impl LicenseKey {
    pub fn is_frozen(&self) -> bool {
        self.frozen_at.is_some()
    }

    pub fn is_expired(&self, now: i64) -> bool {
        !self.is_frozen() && self.expires_at < now
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateKey {
    /// Omit to have the server generate one
    #[serde(default)]
    pub key: Option<String>,
    pub role: KeyRole,
    /// Validity in days from now
    pub days: i64,
    #[serde(default = "default_max_devices")]
    pub max_devices: i64,
}

fn default_max_devices() -> i64 {
    1
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateKey {
    #[serde(default)]
    pub role: Option<KeyRole>,
    /// Absolute replacement expiry (unix seconds)
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub max_devices: Option<i64>,
}
