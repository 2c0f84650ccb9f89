//! Oracle registration and index assignment.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use surety_types::{Identity, Sequence, SuretyError, Wei};

use crate::index_source::{IndexSeed, IndexSource};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    pub address: Identity,
    /// Fixed at registration. Duplicates among the three are allowed.
    pub indices: [u8; 3],
}

impl Oracle {
    #[must_use]
    pub fn holds(&self, index: u8) -> bool {
        self.indices.contains(&index)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleRegistry {
    oracles: BTreeMap<Identity, Oracle>,
    nonce: u64,
}

impl OracleRegistry {
    #[must_use]
    pub fn from_records(oracles: Vec<Oracle>, nonce: u64) -> Self {
        Self {
            oracles: oracles
                .into_iter()
                .map(|o| (o.address.clone(), o))
                .collect(),
            nonce,
        }
    }

    #[must_use]
    pub fn oracle(&self, address: &Identity) -> Option<&Oracle> {
        self.oracles.get(address)
    }

    pub fn oracles(&self) -> impl Iterator<Item = &Oracle> {
        self.oracles.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }

    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn require_registered(&self, caller: &Identity) -> Result<&Oracle, SuretyError> {
        self.oracle(caller).ok_or_else(|| SuretyError::NotRegistered {
            caller: caller.clone(),
        })
    }

    pub fn indices_of(&self, caller: &Identity) -> Result<[u8; 3], SuretyError> {
        self.require_registered(caller).map(|o| o.indices)
    }

    pub(crate) fn check_registration(
        &self,
        caller: &Identity,
        payment: Wei,
        fee: Wei,
    ) -> Result<(), SuretyError> {
        if self.oracles.contains_key(caller) {
            return Err(SuretyError::AlreadyRegistered {
                id: caller.to_string(),
            });
        }
        if payment < fee {
            return Err(SuretyError::WrongFee {
                expected: fee,
                actual: payment,
            });
        }
        Ok(())
    }

    /// Draws one index and advances the nonce.
    pub(crate) fn draw_index(
        &mut self,
        source: &mut impl IndexSource,
        sequence: Sequence,
        salt: u64,
        caller: &Identity,
        index_space: u16,
    ) -> u8 {
        let seed = IndexSeed {
            sequence,
            salt,
            caller,
            nonce: self.nonce,
        };
        self.nonce = self.nonce.wrapping_add(1);
        source.derive(&seed, index_space)
    }

    pub(crate) fn apply_registration(
        &mut self,
        source: &mut impl IndexSource,
        sequence: Sequence,
        salt: u64,
        caller: &Identity,
        index_space: u16,
    ) -> [u8; 3] {
        let mut indices = [0u8; 3];
        for slot in &mut indices {
            *slot = self.draw_index(&mut *source, sequence, salt, caller, index_space);
        }
        self.oracles.insert(
            caller.clone(),
            Oracle {
                address: caller.clone(),
                indices,
            },
        );
        indices
    }
}
