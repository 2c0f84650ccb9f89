//! Native-currency amounts.
//!
//! Amounts are held in the smallest indivisible unit (wei). One whole unit of
//! native currency is [`Wei::UNIT`]. Arithmetic is checked; the ledger never
//! wraps a balance.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fractional digits in one whole unit.
const UNIT_DECIMALS: usize = 18;

/// An amount of native currency in wei.
///
/// Serializes as a decimal string of wei so snapshots stay exact regardless of
/// the JSON reader's integer width.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct Wei(u128);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountParseError {
    #[error("amount must not be empty")]
    Empty,
    #[error("invalid amount `{0}`")]
    Invalid(String),
    #[error("amount `{0}` has more than 18 fractional digits")]
    TooPrecise(String),
    #[error("amount `{0}` is too large")]
    Overflow(String),
}

impl Wei {
    pub const ZERO: Wei = Wei(0);
    pub const UNIT: Wei = Wei(1_000_000_000_000_000_000);

    #[must_use]
    pub const fn new(wei: u128) -> Self {
        Self(wei)
    }

    /// Whole units of native currency.
    #[must_use]
    pub const fn units(units: u64) -> Self {
        Self(units as u128 * Self::UNIT.0)
    }

    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub fn checked_add(self, other: Wei) -> Option<Wei> {
        self.0.checked_add(other.0).map(Wei)
    }

    #[must_use]
    pub fn checked_sub(self, other: Wei) -> Option<Wei> {
        self.0.checked_sub(other.0).map(Wei)
    }

    #[must_use]
    pub fn saturating_add(self, other: Wei) -> Wei {
        Wei(self.0.saturating_add(other.0))
    }

    /// `self * percent / 100`, rounding toward zero. `None` on overflow.
    #[must_use]
    pub fn checked_percent(self, percent: u32) -> Option<Wei> {
        self.0
            .checked_mul(u128::from(percent))
            .map(|scaled| Wei(scaled / 100))
    }

    /// Like [`Wei::checked_percent`] but saturating at `u128::MAX` wei.
    #[must_use]
    pub fn saturating_percent(self, percent: u32) -> Wei {
        Wei(self.0.saturating_mul(u128::from(percent)) / 100)
    }

    /// Parse a decimal amount expressed in whole units, e.g. `"10"` or `"0.25"`.
    pub fn parse_units(raw: &str) -> Result<Self, AmountParseError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(AmountParseError::Empty);
        }
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(AmountParseError::Invalid(trimmed.to_string()));
        }
        let digits_only = |s: &str| s.bytes().all(|b| b.is_ascii_digit());
        if !digits_only(whole) || !digits_only(fraction) {
            return Err(AmountParseError::Invalid(trimmed.to_string()));
        }
        if fraction.len() > UNIT_DECIMALS {
            return Err(AmountParseError::TooPrecise(trimmed.to_string()));
        }

        let overflow = || AmountParseError::Overflow(trimmed.to_string());
        let whole_wei = if whole.is_empty() {
            0
        } else {
            whole
                .parse::<u128>()
                .map_err(|_| overflow())?
                .checked_mul(Self::UNIT.0)
                .ok_or_else(overflow)?
        };
        let fraction_wei = if fraction.is_empty() {
            0
        } else {
            let padded = format!("{fraction:0<width$}", width = UNIT_DECIMALS);
            padded.parse::<u128>().map_err(|_| overflow())?
        };
        whole_wei
            .checked_add(fraction_wei)
            .map(Wei)
            .ok_or_else(overflow)
    }
}

impl fmt::Display for Wei {
    /// Renders whole units with trailing fractional zeros removed.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / Self::UNIT.0;
        let fraction = self.0 % Self::UNIT.0;
        if fraction == 0 {
            return write!(f, "{whole}");
        }
        let digits = format!("{fraction:0>width$}", width = UNIT_DECIMALS);
        write!(f, "{whole}.{}", digits.trim_end_matches('0'))
    }
}

impl FromStr for Wei {
    type Err = AmountParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_units(s)
    }
}

impl TryFrom<String> for Wei {
    type Error = AmountParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value
            .trim()
            .parse::<u128>()
            .map(Wei)
            .map_err(|_| AmountParseError::Invalid(value))
    }
}

impl From<Wei> for String {
    fn from(value: Wei) -> Self {
        value.0.to_string()
    }
}
