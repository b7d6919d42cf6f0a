#![deny(missing_docs)]

//! # fulfil-fees: Shipping Fee Calculator
//!
//! Pure functions over a [`FeeSchedule`]. No I/O apart from the optional
//! YAML loader used at start-up.
//!
//! ```text
//! total = base_rate
//!       + insurance_surcharge                      (if insured)
//!       + max(cod_amount * cod_rate, cod_minimum)  (if COD amount > 0)
//!       + platform_fee
//! ```
//!
//! All amounts are minor units. Rates are basis points. Components are summed
//! at 1/10 000 of a minor unit and rounded half-up once, at the end.

pub mod calculator;
pub mod error;
pub mod schedule;

pub use calculator::FeeBreakdown;
pub use error::FeeError;
pub use schedule::{FeeSchedule, WeightTier};
