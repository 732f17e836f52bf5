//! Signing key cache
//!
//! Derives a wallet from each hex secret exactly once per process and
//! memoizes it; all requests sharing a secret share the identity.

use crate::error::{PoolError, PoolResult};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use std::sync::atomic::{AtomicU64, Ordering};

/// A derived signing identity shared by all requests using the same secret.
#[derive(Clone, Debug)]
pub struct SigningIdentity {
    pub wallet: LocalWallet,
    pub address: Address,
}

/// Concurrent secret -> identity cache with exactly-once derivation.
pub struct KeyCache {
    chain_id: u64,
    cache: DashMap<String, SigningIdentity>,
    derivations: AtomicU64,
}

impl KeyCache {
    pub fn new(chain_id: u64) -> Self {
        Self {
            chain_id,
            cache: DashMap::new(),
            derivations: AtomicU64::new(0),
        }
    }

    /// Look up or derive the identity for a hex-encoded secret.
    ///
    /// A malformed secret fails only the requests that use it.
    pub fn get_or_derive(&self, secret: &str) -> PoolResult<SigningIdentity> {
        if let Some(identity) = self.cache.get(secret) {
            return Ok(identity.clone());
        }

        // The vacant entry holds the shard lock, so exactly one caller
        // derives; latecomers observe the stored identity.
        match self.cache.entry(secret.to_string()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let wallet = secret
                    .parse::<LocalWallet>()
                    .map_err(|e| PoolError::Derivation(e.to_string()))?
                    .with_chain_id(self.chain_id);
                self.derivations.fetch_add(1, Ordering::Relaxed);

                let identity = SigningIdentity {
                    address: wallet.address(),
                    wallet,
                };
                entry.insert(identity.clone());
                Ok(identity)
            }
        }
    }

    /// Number of derivations performed so far.
    pub fn derivations(&self) -> u64 {
        self.derivations.load(Ordering::Relaxed)
    }
}
