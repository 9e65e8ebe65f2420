//! Info-hash / peer / token store
//!
//! Tracks which peers have announced which info-hashes, plus the one token
//! issued per info-hash. See spec §4.6: a stored token is fixed for the
//! info-hash's lifetime — writes with a different token are rejected rather
//! than overwriting it.

use std::collections::{HashMap, HashSet};

use crate::endpoint::Endpoint;
use crate::error::DhtError;

/// Maximum number of distinct info-hashes tracked at once
pub const MAX_INFO_HASHES: usize = 1_048_576;
/// Maximum number of peers stored per info-hash
pub const MAX_PEERS_PER_HASH: usize = 100;

/// Per-info-hash peer sets and tokens
#[derive(Default)]
pub struct InfoHashStore {
    peers: HashMap<String, HashSet<Endpoint>>,
    tokens: HashMap<String, Vec<u8>>,
}

impl InfoHashStore {
    /// An empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `peer` as announcing `hash_hex`, binding `token` on first write
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::StoreRejected`] if: the global info-hash cap is
    /// reached and `hash_hex` is new; a token was already stored for
    /// `hash_hex` and `token` differs from it; or `hash_hex`'s peer set is
    /// already at [`MAX_PEERS_PER_HASH`] and `peer` is not already a member.
    pub fn add(&mut self, hash_hex: &str, peer: Endpoint, token: Vec<u8>) -> Result<(), DhtError> {
        if !self.peers.contains_key(hash_hex) && self.peers.len() >= MAX_INFO_HASHES {
            return Err(DhtError::StoreRejected("info-hash capacity exceeded"));
        }
        if let Some(existing) = self.tokens.get(hash_hex) {
            if existing != &token {
                return Err(DhtError::StoreRejected("token mismatch"));
            }
        }
        let set = self.peers.entry(hash_hex.to_string()).or_default();
        if !set.contains(&peer) && set.len() >= MAX_PEERS_PER_HASH {
            return Err(DhtError::StoreRejected("peer capacity exceeded for info-hash"));
        }
        set.insert(peer);
        self.tokens.entry(hash_hex.to_string()).or_insert(token);
        Ok(())
    }

    /// [`Self::add`] for each of `peers`, logging and skipping individual
    /// rejections rather than failing the whole batch
    ///
    /// Returns the number of peers actually inserted.
    pub fn add_list(&mut self, hash_hex: &str, peers: Vec<Endpoint>, token: Vec<u8>) -> usize {
        let mut inserted = 0;
        for peer in peers {
            match self.add(hash_hex, peer, token.clone()) {
                Ok(()) => inserted += 1,
                Err(e) => tracing::debug!("dropping peer for {hash_hex}: {e}"),
            }
        }
        inserted
    }

    /// All peers known for `hash_hex`, or `None` if the hash is untracked
    #[must_use]
    pub fn find(&self, hash_hex: &str) -> Option<Vec<Endpoint>> {
        self.peers.get(hash_hex).map(|set| set.iter().cloned().collect())
    }

    /// The token bound to `hash_hex`, if any
    #[must_use]
    pub fn find_token(&self, hash_hex: &str) -> Option<Vec<u8>> {
        self.tokens.get(hash_hex).cloned()
    }

    /// Drop both the peer set and the token for `hash_hex`
    pub fn remove(&mut self, hash_hex: &str) {
        self.peers.remove(hash_hex);
        self.tokens.remove(hash_hex);
    }

    /// Number of distinct info-hashes currently tracked
    #[must_use]
    pub fn info_hash_count(&self) -> usize {
        self.peers.len()
    }
}
