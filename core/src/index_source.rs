//! Pseudo-random index derivation.
//!
//! Oracle indices and request indices are drawn from `[0, N)`. The ledger
//! never reads ambient entropy; it hands an [`IndexSeed`] to an injected
//! [`IndexSource`], so tests can script exact indices and production derives
//! them deterministically from ledger state.

use sha2::{Digest, Sha256};
use surety_types::{Identity, Sequence};

/// Inputs available to an index derivation.
#[derive(Debug, Clone, Copy)]
pub struct IndexSeed<'a> {
    /// Ledger sequence at the time of the call; stands in for chain state.
    pub sequence: Sequence,
    /// Per-ledger salt chosen when the ledger was bootstrapped.
    pub salt: u64,
    pub caller: &'a Identity,
    /// Monotonic; every derivation consumes one.
    pub nonce: u64,
}

pub trait IndexSource {
    /// Returns a value in `[0, modulus)`. `modulus` is in `1..=256`.
    fn derive(&mut self, seed: &IndexSeed<'_>, modulus: u16) -> u8;
}

/// SHA-256 over `salt ‖ sequence ‖ caller ‖ nonce`, reduced modulo N.
///
/// Collisions between the three indices of one oracle are possible and accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashIndexSource;

impl IndexSource for HashIndexSource {
    fn derive(&mut self, seed: &IndexSeed<'_>, modulus: u16) -> u8 {
        let mut hasher = Sha256::new();
        hasher.update(seed.salt.to_be_bytes());
        hasher.update(seed.sequence.value().to_be_bytes());
        hasher.update(seed.caller.as_bytes());
        hasher.update(seed.nonce.to_be_bytes());
        let digest = hasher.finalize();

        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % u64::from(modulus.max(1))) as u8
    }
}

/// Replays a fixed list of indices, cycling when exhausted.
///
/// Values are reduced modulo N so a script never escapes the index space.
#[derive(Debug, Clone)]
pub struct ScriptedIndexSource {
    script: Vec<u8>,
    cursor: usize,
}

impl ScriptedIndexSource {
    #[must_use]
    pub fn new(script: impl Into<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            cursor: 0,
        }
    }
}

impl IndexSource for ScriptedIndexSource {
    fn derive(&mut self, _seed: &IndexSeed<'_>, modulus: u16) -> u8 {
        if self.script.is_empty() {
            return 0;
        }
        let value = self.script[self.cursor % self.script.len()];
        self.cursor = self.cursor.wrapping_add(1);
        (u16::from(value) % modulus.max(1)) as u8
    }
}

impl<S: IndexSource + ?Sized> IndexSource for &mut S {
    fn derive(&mut self, seed: &IndexSeed<'_>, modulus: u16) -> u8 {
        (**self).derive(seed, modulus)
    }
}
