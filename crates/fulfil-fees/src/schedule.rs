//! # Fee Schedule
//!
//! Weight tiers plus the flat and proportional surcharges. A schedule is
//! loaded once at start-up and validated before use; an invalid schedule
//! never reaches the calculator.

use std::path::Path;

use fulfil_core::Amount;
use serde::{Deserialize, Serialize};

use crate::error::FeeError;

/// Grams per kilogram.
const GRAMS_PER_KG: u32 = 1000;

/// One weight bracket.
///
/// A parcel in this tier costs `base + per_kg * ceil(kg above the previous
/// tier's upper bound)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightTier {
    /// Inclusive upper bound in grams.
    pub max_grams: u32,
    /// Price at the tier's lower bound, minor units.
    pub base: Amount,
    /// Increment per started kilogram inside the tier, minor units.
    #[serde(default)]
    pub per_kg: Amount,
}

/// Complete fee configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Weight tiers in ascending `max_grams` order.
    pub tiers: Vec<WeightTier>,
    /// Flat surcharge for insured parcels.
    pub insurance_surcharge: Amount,
    /// COD handling rate in basis points of the COD amount.
    pub cod_rate_bps: u32,
    /// Floor for the COD handling fee.
    pub cod_minimum_fee: Amount,
    /// Fixed per-order platform fee.
    pub platform_fee: Amount,
    /// Ask the carrier for a live quote before falling back to the tiers.
    #[serde(default)]
    pub use_live_quote: bool,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            tiers: vec![
                WeightTier {
                    max_grams: 1_000,
                    base: Amount::from_major(30),
                    per_kg: Amount::ZERO,
                },
                WeightTier {
                    max_grams: 5_000,
                    base: Amount::from_major(30),
                    per_kg: Amount::from_major(10),
                },
                WeightTier {
                    max_grams: 20_000,
                    base: Amount::from_major(75),
                    per_kg: Amount::from_major(8),
                },
                WeightTier {
                    max_grams: 50_000,
                    base: Amount::from_major(200),
                    per_kg: Amount::from_major(6),
                },
            ],
            insurance_surcharge: Amount::from_major(15),
            cod_rate_bps: 300,
            cod_minimum_fee: Amount::from_major(20),
            platform_fee: Amount::from_major(25),
            use_live_quote: false,
        }
    }
}

impl FeeSchedule {
    /// Parse and validate a YAML schedule.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, FeeError> {
        let schedule: Self = serde_yaml::from_str(yaml)?;
        schedule.validate()?;
        Ok(schedule)
    }

    /// Read, parse, and validate a YAML schedule file.
    pub fn from_path(path: &Path) -> Result<Self, FeeError> {
        let raw = std::fs::read_to_string(path).map_err(|source| FeeError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    /// Check the structural rules that make the tier function monotone.
    ///
    /// - at least one tier;
    /// - strictly ascending `max_grams`;
    /// - no negative amounts;
    /// - each tier starts at or above the price where the previous one ended.
    pub fn validate(&self) -> Result<(), FeeError> {
        if self.tiers.is_empty() {
            return Err(FeeError::InvalidSchedule("at least one weight tier is required".into()));
        }
        for (name, value) in [
            ("insurance_surcharge", self.insurance_surcharge),
            ("cod_minimum_fee", self.cod_minimum_fee),
            ("platform_fee", self.platform_fee),
        ] {
            if value.is_negative() {
                return Err(FeeError::InvalidSchedule(format!("{name} is negative")));
            }
        }

        let mut prev_max = 0u32;
        let mut prev_end_price: Option<Amount> = None;
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.max_grams <= prev_max {
                return Err(FeeError::InvalidSchedule(format!(
                    "tier {i}: max_grams {} must exceed {prev_max}",
                    tier.max_grams
                )));
            }
            if tier.base.is_negative() || tier.per_kg.is_negative() {
                return Err(FeeError::InvalidSchedule(format!("tier {i}: negative price")));
            }
            if let Some(end) = prev_end_price {
                if tier.base < end {
                    return Err(FeeError::InvalidSchedule(format!(
                        "tier {i}: base {} is below the previous tier's top price {end}",
                        tier.base
                    )));
                }
            }
            prev_end_price = Some(tier_price(tier, prev_max, tier.max_grams)?);
            prev_max = tier.max_grams;
        }
        Ok(())
    }

    /// Heaviest weight covered by the schedule.
    pub fn max_weight_grams(&self) -> u32 {
        self.tiers.last().map_or(0, |t| t.max_grams)
    }

    /// Tiered base rate for a parcel weight.
    pub fn base_rate(&self, weight_grams: u32) -> Result<Amount, FeeError> {
        let mut prev_max = 0u32;
        for tier in &self.tiers {
            if weight_grams <= tier.max_grams {
                return tier_price(tier, prev_max, weight_grams);
            }
            prev_max = tier.max_grams;
        }
        Err(FeeError::WeightOutOfRange {
            grams: weight_grams,
            max: self.max_weight_grams(),
        })
    }
}

fn tier_price(tier: &WeightTier, lower_grams: u32, weight_grams: u32) -> Result<Amount, FeeError> {
    let above = weight_grams.saturating_sub(lower_grams);
    let started_kg = i64::from(above.div_ceil(GRAMS_PER_KG));
    let increment = tier
        .per_kg
        .minor()
        .checked_mul(started_kg)
        .ok_or(FeeError::Overflow)?;
    tier.base
        .checked_add(Amount::from_minor(increment))
        .ok_or(FeeError::Overflow)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_valid() {
        FeeSchedule::default().validate().unwrap();
    }

    #[test]
    fn default_tier_prices() {
        let s = FeeSchedule::default();
        assert_eq!(s.base_rate(1).unwrap(), Amount::from_major(30));
        assert_eq!(s.base_rate(1_000).unwrap(), Amount::from_major(30));
        assert_eq!(s.base_rate(1_001).unwrap(), Amount::from_major(40));
        assert_eq!(s.base_rate(5_000).unwrap(), Amount::from_major(70));
        assert_eq!(s.base_rate(5_001).unwrap(), Amount::from_major(83));
        assert_eq!(s.base_rate(50_000).unwrap(), Amount::from_major(380));
    }

    #[test]
    fn weight_beyond_last_tier_rejected() {
        let err = FeeSchedule::default().base_rate(50_001).unwrap_err();
        assert!(matches!(
            err,
            FeeError::WeightOutOfRange {
                grams: 50_001,
                max: 50_000
            }
        ));
    }

    #[test]
    fn descending_tiers_rejected() {
        let mut s = FeeSchedule::default();
        s.tiers.swap(0, 1);
        assert!(matches!(s.validate(), Err(FeeError::InvalidSchedule(_))));
    }

    #[test]
    fn price_drop_between_tiers_rejected() {
        let mut s = FeeSchedule::default();
        s.tiers[2].base = Amount::from_major(50);
        assert!(matches!(s.validate(), Err(FeeError::InvalidSchedule(_))));
    }

    #[test]
    fn yaml_round_trip_through_file() {
        let yaml = "\
tiers:
  - max_grams: 2000
    base: 2500
  - max_grams: 10000
    base: 2500
    per_kg: 500
insurance_surcharge: 1000
cod_rate_bps: 250
cod_minimum_fee: 1500
platform_fee: 2000
use_live_quote: true
";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fees.yaml");
        std::fs::write(&path, yaml).unwrap();

        let s = FeeSchedule::from_path(&path).unwrap();
        assert_eq!(s.tiers.len(), 2);
        assert_eq!(s.tiers[0].per_kg, Amount::ZERO);
        assert!(s.use_live_quote);
        assert_eq!(s.base_rate(3_000).unwrap(), Amount::from_minor(3000));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = FeeSchedule::from_path(Path::new("/nonexistent/fees.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fees.yaml"));
    }

    #[test]
    fn empty_tiers_rejected_at_load() {
        let yaml = "tiers: []\ninsurance_surcharge: 0\ncod_rate_bps: 0\ncod_minimum_fee: 0\nplatform_fee: 0\n";
        assert!(matches!(
            FeeSchedule::from_yaml_str(yaml),
            Err(FeeError::InvalidSchedule(_))
        ));
    }
}
