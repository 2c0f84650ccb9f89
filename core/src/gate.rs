//! Operational kill-switch and caller authorization.
//!
//! The gate is consulted at the top of every mutating entry point. Its own
//! toggle is the only write that stays available while the ledger is paused.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use surety_types::{Identity, SuretyError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGate {
    owner: Identity,
    operational: bool,
    authorized: BTreeSet<Identity>,
}

impl AccessGate {
    /// A fresh gate starts operational with nothing authorized.
    #[must_use]
    pub fn new(owner: Identity) -> Self {
        Self {
            owner,
            operational: true,
            authorized: BTreeSet::new(),
        }
    }

    #[must_use]
    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    #[must_use]
    pub fn is_operational(&self) -> bool {
        self.operational
    }

    #[must_use]
    pub fn is_authorized(&self, id: &Identity) -> bool {
        self.authorized.contains(id)
    }

    pub fn authorized(&self) -> impl Iterator<Item = &Identity> {
        self.authorized.iter()
    }

    pub fn require_owner(&self, caller: &Identity) -> Result<(), SuretyError> {
        if caller == &self.owner {
            Ok(())
        } else {
            tracing::warn!(%caller, "Rejected owner-only operation");
            Err(SuretyError::Unauthorized {
                caller: caller.clone(),
            })
        }
    }

    pub fn require_operational(&self) -> Result<(), SuretyError> {
        if self.operational {
            Ok(())
        } else {
            Err(SuretyError::NotOperational)
        }
    }

    pub fn require_authorized(&self, caller: &Identity) -> Result<(), SuretyError> {
        if self.is_authorized(caller) {
            Ok(())
        } else {
            Err(SuretyError::Unauthorized {
                caller: caller.clone(),
            })
        }
    }

    /// Owner-only. Allowed while paused so the owner can resume.
    ///
    /// Returns whether the flag actually changed.
    pub fn set_operational(
        &mut self,
        caller: &Identity,
        operational: bool,
    ) -> Result<bool, SuretyError> {
        self.require_owner(caller)?;
        let changed = self.operational != operational;
        self.operational = operational;
        Ok(changed)
    }

    /// Owner-only. Returns whether `id` was newly authorized.
    pub fn authorize(&mut self, caller: &Identity, id: Identity) -> Result<bool, SuretyError> {
        self.require_operational()?;
        self.require_owner(caller)?;
        Ok(self.authorized.insert(id))
    }

    /// Owner-only. Returns whether `id` had been authorized.
    pub fn deauthorize(&mut self, caller: &Identity, id: &Identity) -> Result<bool, SuretyError> {
        self.require_operational()?;
        self.require_owner(caller)?;
        Ok(self.authorized.remove(id))
    }
}
