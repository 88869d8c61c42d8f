//! Discount resolution.
//!
//! Given the configured rules, a package, a requested duration and an optional
//! promo code, selects at most one applicable discount. Precedence, first
//! match wins, no combining:
//!
//! 1. promo code (case-insensitive, package-scoped or global);
//! 2. duration-based (largest `min_days` among matches wins);
//! 3. flat percentage.
//!
//! A supplied promo code that matches a rule but violates its scope or day
//! range is a hard rejection, not a fall-through to rule 2.

use serde::Serialize;

use crate::models::{Discount, DiscountKind, KeyRole};

/// Smallest amount the gateway will issue a scannable code for.
pub const MINIMUM_CHARGE: i64 = 1000;

/// Price quote after discount resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub original_amount: i64,
    pub percent: i64,
    pub discount_amount: i64,
    pub total_amount: i64,
}

/// Why a supplied promo code was refused. All variants are caller-correctable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromoError {
    #[error("unknown promo code")]
    Unknown,
    #[error("promo code is only valid for the {package} package")]
    WrongPackage { package: KeyRole },
    #[error("promo code requires a duration of {0}")]
    OutOfRange(DayRange),
}

/// Valid day range of a promo rule, reported back on rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub min_days: i64,
    pub max_days: Option<i64>,
}

impl std::fmt::Display for DayRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.max_days {
            Some(max) => write!(f, "{} to {} days", self.min_days, max),
            None => write!(f, "at least {} days", self.min_days),
        }
    }
}

/// Resolve the discount percent for a purchase. Returns 0 when nothing applies.
pub fn resolve_percent(
    discounts: &[Discount],
    package: KeyRole,
    requested_days: i64,
    promo_code: Option<&str>,
    now: i64,
) -> Result<i64, PromoError> {
    let active: Vec<&Discount> = discounts.iter().filter(|d| d.is_active(now)).collect();

    if let Some(code) = promo_code.map(str::trim).filter(|c| !c.is_empty()) {
        return resolve_promo(&active, package, requested_days, code);
    }

    // Duration-based: among rules whose range admits the request, the largest
    // min_days is the most specific threshold.
    let duration_match = active
        .iter()
        .filter(|d| d.kind == DiscountKind::DurationBased && d.applies_to_package(package))
        .filter(|d| match d.min_days {
            Some(min) => {
                requested_days >= min && d.max_days.is_none_or(|max| requested_days <= max)
            }
            None => false,
        })
        .max_by_key(|d| d.min_days);
    if let Some(d) = duration_match {
        return Ok(d.percent);
    }

    let percentage_match = active
        .iter()
        .find(|d| d.kind == DiscountKind::Percentage && d.applies_to_package(package));
    Ok(percentage_match.map(|d| d.percent).unwrap_or(0))
}

fn resolve_promo(
    active: &[&Discount],
    package: KeyRole,
    requested_days: i64,
    code: &str,
) -> Result<i64, PromoError> {
    // Prefer a rule scoped to this package; a code that only exists under a
    // different package scope is rejected, not ignored.
    let candidates: Vec<_> = active
        .iter()
        .filter(|d| {
            d.kind == DiscountKind::PromoCode
                && d.promo_code
                    .as_deref()
                    .is_some_and(|c| c.eq_ignore_ascii_case(code))
        })
        .collect();
    if candidates.is_empty() {
        return Err(PromoError::Unknown);
    }
    let rule = match candidates.iter().find(|d| d.applies_to_package(package)) {
        Some(rule) => rule,
        None => {
            let scoped_to = candidates[0]
                .package
                .expect("non-applicable promo rule must carry a package scope");
            return Err(PromoError::WrongPackage { package: scoped_to });
        }
    };

    if let Some(min) = rule.min_days {
        let in_range = requested_days >= min && rule.max_days.is_none_or(|max| requested_days <= max);
        if !in_range {
            return Err(PromoError::OutOfRange(DayRange {
                min_days: min,
                max_days: rule.max_days,
            }));
        }
    }

    Ok(rule.percent)
}

/// Apply a resolved percent to an amount, flooring at the gateway minimum.
pub fn quote(original_amount: i64, percent: i64) -> Quote {
    let discount_amount = original_amount * percent / 100;
    let total_amount = (original_amount - discount_amount).max(MINIMUM_CHARGE);
    Quote {
        original_amount,
        percent,
        discount_amount,
        total_amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(kind: DiscountKind, percent: i64) -> Discount {
        Discount {
            id: format!("d-{}", percent),
            kind,
            min_days: None,
            max_days: None,
            percent,
            promo_code: None,
            package: None,
            starts_at: None,
            ends_at: None,
            enabled: true,
            created_at: 0,
        }
    }

    fn duration_rule(min_days: i64, max_days: Option<i64>, percent: i64) -> Discount {
        Discount {
            min_days: Some(min_days),
            max_days,
            ..rule(DiscountKind::DurationBased, percent)
        }
    }

    fn promo_rule(code: &str, package: Option<KeyRole>, percent: i64) -> Discount {
        Discount {
            promo_code: Some(code.to_string()),
            package,
            ..rule(DiscountKind::PromoCode, percent)
        }
    }

    const NOW: i64 = 1_700_000_000;

    #[test]
    fn no_rules_means_zero_percent() {
        let pct = resolve_percent(&[], KeyRole::Normal, 30, None, NOW).unwrap();
        assert_eq!(pct, 0);
        assert_eq!(quote(60_000, pct).total_amount, 60_000);
    }

    #[test]
    fn duration_rule_applies_at_threshold() {
        let rules = [duration_rule(20, None, 10)];
        let pct = resolve_percent(&rules, KeyRole::Normal, 30, None, NOW).unwrap();
        assert_eq!(pct, 10);
        let q = quote(60_000, pct);
        assert_eq!(q.discount_amount, 6_000);
        assert_eq!(q.total_amount, 54_000);
    }

    #[test]
    fn duration_rule_respects_bounds() {
        let rules = [duration_rule(20, Some(60), 10)];
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 19, None, NOW).unwrap(), 0);
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 61, None, NOW).unwrap(), 0);
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 60, None, NOW).unwrap(), 10);
    }

    #[test]
    fn largest_min_days_wins_among_duration_rules() {
        let rules = [duration_rule(7, None, 5), duration_rule(30, None, 15)];
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 45, None, NOW).unwrap(), 15);
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 10, None, NOW).unwrap(), 5);
    }

    #[test]
    fn promo_code_beats_duration_rule() {
        let rules = [duration_rule(20, None, 10), promo_rule("SALE25", None, 25)];
        let pct = resolve_percent(&rules, KeyRole::Normal, 30, Some("sale25"), NOW).unwrap();
        assert_eq!(pct, 25);
    }

    #[test]
    fn promo_code_match_is_case_insensitive() {
        let rules = [promo_rule("Sale10", None, 10)];
        assert_eq!(
            resolve_percent(&rules, KeyRole::Free, 7, Some("SALE10"), NOW).unwrap(),
            10
        );
    }

    #[test]
    fn unknown_promo_code_is_rejected() {
        let rules = [promo_rule("SALE10", None, 10)];
        let err = resolve_percent(&rules, KeyRole::Normal, 30, Some("NOPE"), NOW).unwrap_err();
        assert_eq!(err, PromoError::Unknown);
    }

    #[test]
    fn promo_scoped_to_other_package_rejects_without_fallthrough() {
        // A generally-applicable duration rule exists, but the explicit code
        // still fails with a scope error.
        let rules = [
            duration_rule(20, None, 10),
            Discount {
                min_days: Some(10),
                ..promo_rule("SALE10", Some(KeyRole::Vip), 10)
            },
        ];
        let err = resolve_percent(&rules, KeyRole::Normal, 30, Some("SALE10"), NOW).unwrap_err();
        assert_eq!(
            err,
            PromoError::WrongPackage {
                package: KeyRole::Vip
            }
        );
    }

    #[test]
    fn promo_day_range_violation_reports_valid_range() {
        let rules = [Discount {
            min_days: Some(10),
            max_days: Some(90),
            ..promo_rule("SALE10", None, 10)
        }];
        let err = resolve_percent(&rules, KeyRole::Normal, 7, Some("SALE10"), NOW).unwrap_err();
        assert_eq!(
            err,
            PromoError::OutOfRange(DayRange {
                min_days: 10,
                max_days: Some(90),
            })
        );
        assert_eq!(err.to_string(), "promo code requires a duration of 10 to 90 days");
    }

    #[test]
    fn percentage_rule_is_last_resort() {
        let rules = [rule(DiscountKind::Percentage, 5), duration_rule(20, None, 10)];
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 30, None, NOW).unwrap(), 10);
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 7, None, NOW).unwrap(), 5);
    }

    #[test]
    fn disabled_and_out_of_window_rules_are_ignored() {
        let mut disabled = duration_rule(20, None, 10);
        disabled.enabled = false;
        let mut windowed = duration_rule(20, None, 15);
        windowed.starts_at = Some(NOW + 1000);
        let rules = [disabled, windowed];
        assert_eq!(resolve_percent(&rules, KeyRole::Normal, 30, None, NOW).unwrap(), 0);
    }

    #[test]
    fn quote_floors_at_gateway_minimum() {
        let q = quote(1_100, 50);
        assert_eq!(q.discount_amount, 550);
        assert_eq!(q.total_amount, MINIMUM_CHARGE);
    }

    #[test]
    fn quote_floors_fractional_discount() {
        // 33% of 10_001 = 3300.33, floored
        let q = quote(10_001, 33);
        assert_eq!(q.discount_amount, 3_300);
        assert_eq!(q.total_amount, 6_701);
    }
}
