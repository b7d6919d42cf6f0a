//! # Minor-Unit Amounts
//!
//! All money in the stack is an integer count of the currency's smallest unit
//! (satang for THB, 100 satang = 1 baht). Carrier payloads, fee schedules,
//! ledger rows and API responses use the same unit, so there is no edge where
//! a value is multiplied or divided by 100. Major-unit strings exist only for
//! display.

use serde::{Deserialize, Serialize};

/// Minor units per major unit.
pub const MINOR_PER_MAJOR: i64 = 100;

/// A signed amount in minor currency units.
///
/// Signed because ledger rows carry debits as negative amounts. Balances are
/// kept non-negative by the ledger, not by this type.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Build from a count of minor units.
    pub const fn from_minor(minor: i64) -> Self {
        Self(minor)
    }

    /// Build from whole major units (e.g. baht).
    pub const fn from_major(major: i64) -> Self {
        Self(major * MINOR_PER_MAJOR)
    }

    /// Count of minor units.
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Whether the amount is below zero.
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Whether the amount is above zero.
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Checked addition. `None` on overflow.
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction. `None` on overflow.
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Arithmetic negation. `None` for `i64::MIN`.
    pub fn checked_neg(self) -> Option<Self> {
        self.0.checked_neg().map(Self)
    }

    /// Render as a major-unit decimal string with two fractional digits,
    /// e.g. `2550` → `"25.50"`.
    pub fn to_major_string(self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = MINOR_PER_MAJOR.unsigned_abs();
        format!("{sign}{}.{:02}", abs / per, abs % per)
    }
}

impl std::fmt::Display for Amount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_major_string())
    }
}

impl std::iter::Sum for Amount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        Self(iter.map(|a| a.0).sum())
    }
}
