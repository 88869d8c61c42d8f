use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use super::KeyRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DiscountKind {
    /// Requires `min_days` (and optionally `max_days`) on the requested duration
    DurationBased,
    /// Requires a matching `promo_code`; may additionally carry a day range
    PromoCode,
    /// Flat percentage, no day constraints
    Percentage,
}

/// A configured discount rule.
///
/// A transaction captures only the resolved percent at creation time; editing
/// or deleting a rule never retroactively affects an existing transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discount {
    pub id: String,
    pub kind: DiscountKind,
    #[serde(default)]
    pub min_days: Option<i64>,
    #[serde(default)]
    pub max_days: Option<i64>,
    pub percent: i64,
    #[serde(default)]
    pub promo_code: Option<String>,
    /// None = applies to every package
    #[serde(default)]
    pub package: Option<KeyRole>,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub ends_at: Option<i64>,
    pub enabled: bool,
    pub created_at: i64,
}

impl Discount {
    /// Enabled and, if windowed, active at `now`.
    pub fn is_active(&self, now: i64) -> bool {
        if !self.enabled {
            return false;
        }
        if let Some(start) = self.starts_at
            && now < start
        {
            return false;
        }
        if let Some(end) = self.ends_at
            && now > end
        {
            return false;
        }
        true
    }

    /// Whether this rule's package scope admits `package`.
    pub fn applies_to_package(&self, package: KeyRole) -> bool {
        self.package.is_none() || self.package == Some(package)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateDiscount {
    pub kind: DiscountKind,
    #[serde(default)]
    pub min_days: Option<i64>,
    #[serde(default)]
    pub max_days: Option<i64>,
    pub percent: i64,
    #[serde(default)]
    pub promo_code: Option<String>,
    #[serde(default)]
    pub package: Option<KeyRole>,
    #[serde(default)]
    pub starts_at: Option<i64>,
    #[serde(default)]
    pub ends_at: Option<i64>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateDiscount {
    #[serde(default)]
    pub percent: Option<i64>,
    #[serde(default)]
    pub min_days: Option<Option<i64>>,
    #[serde(default)]
    pub max_days: Option<Option<i64>>,
    #[serde(default)]
    pub promo_code: Option<Option<String>>,
    #[serde(default)]
    pub package: Option<Option<KeyRole>>,
    #[serde(default)]
    pub starts_at: Option<Option<i64>>,
    #[serde(default)]
    pub ends_at: Option<Option<i64>>,
    #[serde(default)]
    pub enabled: Option<bool>,
}
