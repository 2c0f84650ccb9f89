//! Resolved ledger parameters.
//!
//! Raw TOML deserialization structs (with `Option` fields) stay private in
//! `surety-config`. The config loader resolves them into [`LedgerParams`] at
//! the parse boundary; holding a `LedgerParams` proves every bound below holds.
//!
//! Only the two fees and the oracle index space are tunable. The purchase cap,
//! the payout multiplier, the oracle quorum and the airline bootstrap threshold
//! are part of the ledger's contract with passengers and airlines, so they are
//! constants.

use thiserror::Error;

use crate::Wei;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamsError {
    #[error("oracle index space must be between 1 and 256, got {0}")]
    IndexSpace(u16),
}

/// Fees and index space the ledger runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerParams {
    airline_funding_fee: Wei,
    oracle_registration_fee: Wei,
    index_space: u16,
}

impl LedgerParams {
    pub const DEFAULT_FUNDING_FEE: Wei = Wei::units(10);
    pub const DEFAULT_REGISTRATION_FEE: Wei = Wei::units(1);
    pub const DEFAULT_INDEX_SPACE: u16 = 10;

    /// Largest premium one policy accepts.
    pub const INSURANCE_CAP: Wei = Wei::UNIT;
    /// Payout credit as a percentage of the premium on an airline-fault delay.
    pub const PAYOUT_PERCENT: u32 = 150;
    /// Admitted airlines below which one funded nominator is enough.
    pub const BOOTSTRAP_AIRLINES: usize = 4;
    /// Distinct matching oracle reports that finalize a status request.
    pub const ORACLE_QUORUM: usize = 3;
    /// Every oracle is assigned exactly this many indices.
    pub const INDICES_PER_ORACLE: usize = 3;

    pub fn new(
        airline_funding_fee: Wei,
        oracle_registration_fee: Wei,
        index_space: u16,
    ) -> Result<Self, ParamsError> {
        if index_space == 0 || index_space > 256 {
            return Err(ParamsError::IndexSpace(index_space));
        }
        Ok(Self {
            airline_funding_fee,
            oracle_registration_fee,
            index_space,
        })
    }

    #[must_use]
    pub fn airline_funding_fee(&self) -> Wei {
        self.airline_funding_fee
    }

    #[must_use]
    pub fn oracle_registration_fee(&self) -> Wei {
        self.oracle_registration_fee
    }

    #[must_use]
    pub fn index_space(&self) -> u16 {
        self.index_space
    }

    #[must_use]
    pub fn insurance_cap(&self) -> Wei {
        Self::INSURANCE_CAP
    }

    #[must_use]
    pub fn payout_percent(&self) -> u32 {
        Self::PAYOUT_PERCENT
    }

    #[must_use]
    pub fn bootstrap_airlines(&self) -> usize {
        Self::BOOTSTRAP_AIRLINES
    }

    #[must_use]
    pub fn oracle_quorum(&self) -> usize {
        Self::ORACLE_QUORUM
    }
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            airline_funding_fee: Self::DEFAULT_FUNDING_FEE,
            oracle_registration_fee: Self::DEFAULT_REGISTRATION_FEE,
            index_space: Self::DEFAULT_INDEX_SPACE,
        }
    }
}
