//! # Fee Calculator
//!
//! [`FeeSchedule::compute_total`] is the single pricing path. It never
//! performs I/O and the total it returns is never below the base rate.

use fulfil_core::{Amount, CodInfo};
use serde::Serialize;

use crate::error::FeeError;
use crate::schedule::FeeSchedule;

/// Sub-units per minor unit used while accumulating.
const SCALE: i128 = 10_000;

/// Itemised fee for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeBreakdown {
    /// Carrier quote or tiered base rate.
    pub base_rate: Amount,
    /// Insurance surcharge, zero when not insured.
    pub insurance: Amount,
    /// COD handling fee, zero without COD.
    pub cod_fee: Amount,
    /// Platform fee.
    pub platform_fee: Amount,
    /// Amount charged to the user's balance.
    pub total: Amount,
}

fn non_negative(component: &'static str, value: Amount) -> Result<i128, FeeError> {
    if value.is_negative() {
        return Err(FeeError::NegativeComponent {
            component,
            value: value.minor(),
        });
    }
    Ok(i128::from(value.minor()) * SCALE)
}

fn round_half_up(scaled: i128) -> Result<Amount, FeeError> {
    let minor = (scaled + SCALE / 2) / SCALE;
    i64::try_from(minor)
        .map(Amount::from_minor)
        .map_err(|_| FeeError::Overflow)
}

impl FeeSchedule {
    /// Total chargeable amount for an order.
    ///
    /// `cod_amount` is the amount collected on delivery, zero when COD is off.
    pub fn compute_total(
        &self,
        base_rate: Amount,
        insured: bool,
        cod_amount: Amount,
        platform_fee: Amount,
    ) -> Result<FeeBreakdown, FeeError> {
        let base = non_negative("base_rate", base_rate)?;
        let platform = non_negative("platform_fee", platform_fee)?;
        let cod = non_negative("cod_amount", cod_amount)? / SCALE;

        let insurance = if insured {
            non_negative("insurance_surcharge", self.insurance_surcharge)?
        } else {
            0
        };
        let cod_fee = if cod > 0 {
            let proportional = cod * i128::from(self.cod_rate_bps);
            let floor = non_negative("cod_minimum_fee", self.cod_minimum_fee)?;
            proportional.max(floor)
        } else {
            0
        };

        Ok(FeeBreakdown {
            base_rate,
            insurance: round_half_up(insurance)?,
            cod_fee: round_half_up(cod_fee)?,
            platform_fee,
            total: round_half_up(base + insurance + cod_fee + platform)?,
        })
    }

    /// Price a parcel from the tiers and the schedule's own platform fee.
    ///
    /// `quoted_base` replaces the tiered base rate when a live quote is known.
    pub fn price(
        &self,
        weight_grams: u32,
        insured: bool,
        cod: CodInfo,
        quoted_base: Option<Amount>,
    ) -> Result<FeeBreakdown, FeeError> {
        let base = match quoted_base {
            Some(q) => q,
            None => self.base_rate(weight_grams)?,
        };
        self.compute_total(base, insured, cod.chargeable_amount(), self.platform_fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn plain_parcel_is_base_plus_platform() {
        let s = FeeSchedule::default();
        let fee = s.price(1_000, false, CodInfo::NONE, None).unwrap();
        assert_eq!(fee.base_rate, Amount::from_major(30));
        assert_eq!(fee.total, Amount::from_major(55));
        assert_eq!(fee.insurance, Amount::ZERO);
        assert_eq!(fee.cod_fee, Amount::ZERO);
    }

    #[test]
    fn insurance_adds_flat_surcharge() {
        let s = FeeSchedule::default();
        let fee = s
            .compute_total(Amount::from_major(30), true, Amount::ZERO, Amount::ZERO)
            .unwrap();
        assert_eq!(fee.total, Amount::from_major(45));
    }

    #[test]
    fn small_cod_hits_minimum_fee() {
        let s = FeeSchedule::default();
        // 3% of 100 THB is 3 THB, below the 20 THB floor.
        let fee = s
            .compute_total(Amount::ZERO, false, Amount::from_major(100), Amount::ZERO)
            .unwrap();
        assert_eq!(fee.cod_fee, Amount::from_major(20));
    }

    #[test]
    fn large_cod_uses_rate_with_half_up_rounding() {
        let s = FeeSchedule::default();
        // 3% of 1234.50 THB = 37.035 THB -> 3703.5 satang -> 3704.
        let fee = s
            .compute_total(Amount::ZERO, false, Amount::from_minor(123_450), Amount::ZERO)
            .unwrap();
        assert_eq!(fee.cod_fee, Amount::from_minor(3704));
        assert_eq!(fee.total, Amount::from_minor(3704));
    }

    #[test]
    fn disabled_cod_is_free() {
        let s = FeeSchedule::default();
        let cod = CodInfo {
            enabled: false,
            amount: Amount::from_major(5000),
        };
        let fee = s.price(500, false, cod, None).unwrap();
        assert_eq!(fee.cod_fee, Amount::ZERO);
    }

    #[test]
    fn quoted_base_overrides_tiers() {
        let s = FeeSchedule::default();
        let fee = s
            .price(1_000, false, CodInfo::NONE, Some(Amount::from_major(42)))
            .unwrap();
        assert_eq!(fee.base_rate, Amount::from_major(42));
        assert_eq!(fee.total, Amount::from_major(67));
    }

    #[test]
    fn negative_inputs_rejected() {
        let s = FeeSchedule::default();
        assert!(matches!(
            s.compute_total(Amount::from_minor(-1), false, Amount::ZERO, Amount::ZERO),
            Err(FeeError::NegativeComponent {
                component: "base_rate",
                ..
            })
        ));
    }

    proptest! {
        #[test]
        fn total_is_monotone_in_weight(
            w1 in 1u32..=50_000,
            w2 in 1u32..=50_000,
            insured in any::<bool>(),
            cod in 0i64..10_000_000,
        ) {
            let (lo, hi) = if w1 <= w2 { (w1, w2) } else { (w2, w1) };
            let s = FeeSchedule::default();
            let cod = if cod > 0 { CodInfo::collect(Amount::from_minor(cod)) } else { CodInfo::NONE };
            let a = s.price(lo, insured, cod, None).unwrap();
            let b = s.price(hi, insured, cod, None).unwrap();
            prop_assert!(a.total <= b.total);
        }

        #[test]
        fn total_never_below_base(
            base in 0i64..1_000_000_000,
            insured in any::<bool>(),
            cod in 0i64..1_000_000_000,
            platform in 0i64..1_000_000,
        ) {
            let s = FeeSchedule::default();
            let fee = s.compute_total(
                Amount::from_minor(base),
                insured,
                Amount::from_minor(cod),
                Amount::from_minor(platform),
            ).unwrap();
            prop_assert!(fee.total >= fee.base_rate);
            prop_assert_eq!(
                fee.total,
                Amount::from_minor(
                    fee.base_rate.minor() + fee.insurance.minor() + fee.cod_fee.minor() + fee.platform_fee.minor()
                )
            );
        }
    }
}
