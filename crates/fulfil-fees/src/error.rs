//! Fee calculation errors.

use thiserror::Error;

/// Errors from fee computation and schedule loading.
#[derive(Error, Debug)]
pub enum FeeError {
    /// No tier covers the parcel weight.
    #[error("no weight tier covers {grams} g (heaviest tier ends at {max} g)")]
    WeightOutOfRange {
        /// The parcel weight.
        grams: u32,
        /// Upper bound of the last tier.
        max: u32,
    },

    /// A fee input was negative.
    #[error("{component} must not be negative (got {value})")]
    NegativeComponent {
        /// Which input.
        component: &'static str,
        /// The rejected value in minor units.
        value: i64,
    },

    /// The total does not fit in an amount.
    #[error("fee total overflows")]
    Overflow,

    /// The schedule breaks a structural rule.
    #[error("invalid fee schedule: {0}")]
    InvalidSchedule(String),

    /// The schedule file could not be read.
    #[error("failed to read fee schedule {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The schedule file is not valid YAML for a schedule.
    #[error("failed to parse fee schedule: {0}")]
    Parse(#[from] serde_yaml::Error),
}
