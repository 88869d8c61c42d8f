use serde::{Deserialize, Serialize};
use strum::EnumString;

use super::KeyRole;

/// Purchase transaction status.
///
/// Transitions are monotonic:
/// `pending -> claimable -> claimed`, with `pending -> expired` on payment
/// window timeout and `pending -> cancelled` on user/admin cancel.
/// `claimed` is the canonical terminal active status; the legacy `"paid"`
/// spelling is accepted on input as an alias and never emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Claimable,
    #[serde(alias = "paid")]
    #[strum(to_string = "claimed", serialize = "paid")]
    Claimed,
    Cancelled,
    Expired,
}

impl TransactionStatus {
    /// Statuses from which a claim may proceed.
    pub fn is_claimable(self, force_recreate: bool) -> bool {
        match self {
            TransactionStatus::Claimable => true,
            TransactionStatus::Claimed => force_recreate,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TransactionStatus::Claimed | TransactionStatus::Cancelled | TransactionStatus::Expired
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// Reference issued by the payment gateway for this scannable code
    pub gateway_ref: String,
    /// The license key string this purchase targets
    pub customer_key: String,
    pub package: KeyRole,
    pub duration_days: i64,
    pub original_amount: i64,
    pub discount_percent: i64,
    pub total_amount: i64,
    pub status: TransactionStatus,
    pub created_at: i64,
    /// createdAt + payment window; a pending transaction past this is expired
    pub window_expires_at: i64,
    /// Set only when leaving `claimable`
    pub paid_at: Option<i64>,
    /// Manual-verification evidence attached by an admin
    #[serde(default)]
    pub proof_image: Option<String>,
    /// Device the purchase originated from, kept for history lookups
    #[serde(default)]
    pub device_id: Option<String>,
}
