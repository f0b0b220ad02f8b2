//! # Engine Settings
//!
//! Typed snapshot of the business settings a checkout or return depends on.
//!
//! ## Keys
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key                               required   example   meaning         │
//! │  ────────────────────────────────  ────────   ───────   ─────────────── │
//! │  tax_rate_percent                  no (0)     5         5% tax          │
//! │  loyalty_redemption_rate           yes        0.01      $ per point     │
//! │  loyalty_earning_rate              yes        1         points per $    │
//! │  loyalty_tier_silver_threshold     yes        1000      points          │
//! │  loyalty_tier_gold_threshold       yes        5000      points          │
//! │  loyalty_tier_platinum_threshold   yes        10000     points          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The snapshot is built once per operation and either complete or an error;
//! there is no per-lookup fallback to hard-coded values.

use std::collections::HashMap;

use thiserror::Error;

use crate::loyalty::{LoyaltyPolicy, TierThresholds};
use crate::types::TaxRate;
use crate::validation::validate_tax_rate_bps;

pub const TAX_RATE_PERCENT: &str = "tax_rate_percent";
pub const LOYALTY_REDEMPTION_RATE: &str = "loyalty_redemption_rate";
pub const LOYALTY_EARNING_RATE: &str = "loyalty_earning_rate";
pub const TIER_SILVER_THRESHOLD: &str = "loyalty_tier_silver_threshold";
pub const TIER_GOLD_THRESHOLD: &str = "loyalty_tier_gold_threshold";
pub const TIER_PLATINUM_THRESHOLD: &str = "loyalty_tier_platinum_threshold";

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    #[error("Required setting '{key}' is not configured")]
    Missing { key: String },

    #[error("Setting '{key}' has invalid value '{value}': {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Tier thresholds must be strictly ascending (silver {silver}, gold {gold}, platinum {platinum})")]
    ThresholdsNotAscending { silver: i64, gold: i64, platinum: i64 },
}

// =============================================================================
// Source
// =============================================================================

/// Anything that can answer "what is the raw value of this key".
pub trait SettingsSource {
    fn get(&self, key: &str) -> Option<&str>;
}

impl SettingsSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

// =============================================================================
// Snapshot
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub tax_rate: TaxRate,
    pub loyalty: LoyaltyPolicy,
}

impl EngineSettings {
    /// Reads and validates every key.
    ///
    /// ```rust
    /// use std::collections::HashMap;
    /// use till_core::settings::EngineSettings;
    ///
    /// let raw: HashMap<String, String> = [
    ///     ("tax_rate_percent", "5"),
    ///     ("loyalty_redemption_rate", "0.01"),
    ///     ("loyalty_earning_rate", "1"),
    ///     ("loyalty_tier_silver_threshold", "1000"),
    ///     ("loyalty_tier_gold_threshold", "5000"),
    ///     ("loyalty_tier_platinum_threshold", "10000"),
    /// ]
    /// .into_iter()
    /// .map(|(k, v)| (k.to_string(), v.to_string()))
    /// .collect();
    ///
    /// let settings = EngineSettings::load(&raw).unwrap();
    /// assert_eq!(settings.tax_rate.bps(), 500);
    /// assert_eq!(settings.loyalty.redemption_rate_bps, 100);
    /// ```
    pub fn load<S: SettingsSource + ?Sized>(source: &S) -> Result<Self, SettingsError> {
        let tax_rate = match source.get(TAX_RATE_PERCENT) {
            Some(raw) => {
                // Hundredths of a basis point here; anything finer than 0.01% is refused.
                let scaled = parse_decimal_bps(TAX_RATE_PERCENT, raw)?;
                if scaled % 100 != 0 {
                    return Err(invalid(TAX_RATE_PERCENT, raw, "precision finer than 0.01%"));
                }
                let bps = scaled / 100;
                let bps = u32::try_from(bps).map_err(|_| invalid(TAX_RATE_PERCENT, raw, "out of range"))?;
                validate_tax_rate_bps(bps).map_err(|e| invalid(TAX_RATE_PERCENT, raw, &e.to_string()))?;
                TaxRate::from_bps(bps)
            }
            None => TaxRate::zero(),
        };

        let redemption_rate_bps = parse_decimal_bps(LOYALTY_REDEMPTION_RATE, required(source, LOYALTY_REDEMPTION_RATE)?)?;
        let earning_rate_bps = parse_decimal_bps(LOYALTY_EARNING_RATE, required(source, LOYALTY_EARNING_RATE)?)?;

        let tiers = TierThresholds {
            silver: parse_points(TIER_SILVER_THRESHOLD, required(source, TIER_SILVER_THRESHOLD)?)?,
            gold: parse_points(TIER_GOLD_THRESHOLD, required(source, TIER_GOLD_THRESHOLD)?)?,
            platinum: parse_points(TIER_PLATINUM_THRESHOLD, required(source, TIER_PLATINUM_THRESHOLD)?)?,
        };
        if !tiers.is_ascending() {
            return Err(SettingsError::ThresholdsNotAscending {
                silver: tiers.silver,
                gold: tiers.gold,
                platinum: tiers.platinum,
            });
        }

        Ok(Self {
            tax_rate,
            loyalty: LoyaltyPolicy {
                redemption_rate_bps,
                earning_rate_bps,
                tiers,
            },
        })
    }
}

fn required<'a, S: SettingsSource + ?Sized>(source: &'a S, key: &str) -> Result<&'a str, SettingsError> {
    source
        .get(key)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SettingsError::Missing {
            key: key.to_string(),
        })
}

fn invalid(key: &str, value: &str, reason: &str) -> SettingsError {
    SettingsError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parses a non-negative decimal ("0.01", "1.5") into basis points of one.
fn parse_decimal_bps(key: &str, raw: &str) -> Result<i64, SettingsError> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(key, raw, "not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(key, raw, "must be a non-negative number"));
    }
    Ok((value * 10_000.0).round() as i64)
}

fn parse_points(key: &str, raw: &str) -> Result<i64, SettingsError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| invalid(key, raw, "not a whole number of points"))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn complete() -> HashMap<String, String> {
        raw(&[
            (LOYALTY_REDEMPTION_RATE, "0.01"),
            (LOYALTY_EARNING_RATE, "1"),
            (TIER_SILVER_THRESHOLD, "1000"),
            (TIER_GOLD_THRESHOLD, "5000"),
            (TIER_PLATINUM_THRESHOLD, "10000"),
        ])
    }

    #[test]
    fn test_tax_rate_is_optional() {
        let settings = EngineSettings::load(&complete()).unwrap();
        assert!(settings.tax_rate.is_zero());
        assert_eq!(settings.loyalty.earning_rate_bps, 10000);
    }

    #[test]
    fn test_fractional_tax_percent() {
        let mut map = complete();
        map.insert(TAX_RATE_PERCENT.to_string(), "8.25".to_string());
        assert_eq!(EngineSettings::load(&map).unwrap().tax_rate.bps(), 825);
    }

    #[test]
    fn test_tax_precision_finer_than_one_bps_is_refused() {
        let mut map = complete();
        map.insert(TAX_RATE_PERCENT.to_string(), "5.125".to_string());
        match EngineSettings::load(&map) {
            Err(SettingsError::Invalid { key, value, .. }) => {
                assert_eq!(key, TAX_RATE_PERCENT);
                assert_eq!(value, "5.125");
            }
            other => panic!("expected Invalid, got {other:?}"),
        }

        map.insert(TAX_RATE_PERCENT.to_string(), "5.12".to_string());
        assert_eq!(EngineSettings::load(&map).unwrap().tax_rate.bps(), 512);
    }

    #[test]
    fn test_missing_loyalty_rate_fails_fast() {
        let mut map = complete();
        map.remove(LOYALTY_EARNING_RATE);
        assert_eq!(
            EngineSettings::load(&map).unwrap_err(),
            SettingsError::Missing {
                key: LOYALTY_EARNING_RATE.to_string()
            }
        );
    }

    #[test]
    fn test_malformed_values() {
        let mut map = complete();
        map.insert(LOYALTY_REDEMPTION_RATE.to_string(), "cheap".to_string());
        assert!(matches!(
            EngineSettings::load(&map),
            Err(SettingsError::Invalid { .. })
        ));

        let mut map = complete();
        map.insert(TAX_RATE_PERCENT.to_string(), "150".to_string());
        assert!(matches!(
            EngineSettings::load(&map),
            Err(SettingsError::Invalid { .. })
        ));
    }

    #[test]
    fn test_thresholds_must_ascend() {
        let mut map = complete();
        map.insert(TIER_GOLD_THRESHOLD.to_string(), "500".to_string());
        assert!(matches!(
            EngineSettings::load(&map),
            Err(SettingsError::ThresholdsNotAscending { .. })
        ));
    }
}
