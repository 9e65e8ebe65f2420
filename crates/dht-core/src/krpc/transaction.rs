//! Transaction-identifier pool correlating outbound queries with their replies
//!
//! A [`TransactionRegistry`] owns the fixed universe of 2-character TIDs
//! drawn from `[0-9A-Za-z]` (62² = 3844 of them). Each outbound query
//! borrows one and attaches a [`RequestContext`] describing what was asked;
//! the matching response (or error, or timeout) returns it to the free pool.

use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::DhtError;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Total number of distinct 2-character TIDs in the pool
pub const TOTAL_TIDS: usize = ALPHABET.len() * ALPHABET.len();

/// Transaction expiry. The "5 minutes" comment in the upstream source this
/// was ported from is stale; the numeric constant (24h) is authoritative.
pub const TTL_MS: u64 = 24 * 60 * 60 * 1000;

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Which query a borrowed TID was issued for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    Ping,
    FindNode,
    GetPeers,
    AnnouncePeer,
}

/// Context attached to a borrowed TID, recovered when its response arrives
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub query_type: QueryType,
    pub target_addr: String,
    pub target_port: u16,
    pub info_hash: Option<[u8; 20]>,
}

struct Borrowed {
    ctx: RequestContext,
    expires_at: u64,
}

/// The fixed TID pool plus the in-flight borrow map
pub struct TransactionRegistry {
    free: Vec<String>,
    borrowed: HashMap<String, Borrowed>,
    ttl_ms: u64,
}

impl TransactionRegistry {
    /// Build a registry with a freshly shuffled pool of all 3844 TIDs
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::krpc::transaction::TransactionRegistry;
    ///
    /// let registry = TransactionRegistry::new();
    /// assert_eq!(registry.free_count(), 3844);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(TTL_MS)
    }

    /// Build a registry with a custom expiry, for tests that want to
    /// exercise expiry/reclaim without waiting 24 hours.
    #[must_use]
    pub fn with_ttl(ttl_ms: u64) -> Self {
        let mut free = Vec::with_capacity(TOTAL_TIDS);
        for &a in ALPHABET {
            for &b in ALPHABET {
                free.push(String::from_utf8(vec![a, b]).expect("ASCII alphabet"));
            }
        }
        free.shuffle(&mut rand::thread_rng());
        Self {
            free,
            borrowed: HashMap::new(),
            ttl_ms,
        }
    }

    /// Number of TIDs currently in the free pool
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Number of TIDs currently borrowed (including expired-but-not-reclaimed)
    #[must_use]
    pub fn borrowed_count(&self) -> usize {
        self.borrowed.len()
    }

    /// Borrow a TID for an outbound query, attaching `ctx`
    ///
    /// Per spec §4.5: if at least half the pool is borrowed, expired
    /// borrowings are garbage-collected first; if the pool is still
    /// exhausted after that, the oldest-expiring half of the borrowed map
    /// is forcibly reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::RegistryExhausted`] if no TID becomes available
    /// (unreachable in practice: the forced-reclaim step always frees at
    /// least one TID as long as any are borrowed).
    pub fn create(&mut self, ctx: RequestContext) -> Result<String, DhtError> {
        if self.borrowed.len() * 2 >= TOTAL_TIDS {
            self.reclaim_expired();
        }
        if self.free.is_empty() {
            self.reclaim_oldest_half();
        }
        let tid = self.free.pop().ok_or(DhtError::RegistryExhausted)?;
        self.borrowed.insert(
            tid.clone(),
            Borrowed {
                ctx,
                expires_at: now_ms() + self.ttl_ms,
            },
        );
        Ok(tid)
    }

    /// Look up the context for a borrowed, unexpired TID
    #[must_use]
    pub fn get(&self, tid: &str) -> Option<&RequestContext> {
        self.borrowed
            .get(tid)
            .filter(|b| b.expires_at > now_ms())
            .map(|b| &b.ctx)
    }

    /// Whether `tid` is currently borrowed and unexpired
    #[must_use]
    pub fn is_valid(&self, tid: &str) -> bool {
        self.borrowed
            .get(tid)
            .is_some_and(|b| b.expires_at > now_ms())
    }

    /// Return `tid` to the free pool, yielding its context if it was borrowed
    ///
    /// A no-op (returns `None`) if `tid` was not borrowed. An
    /// expired-but-still-present TID is still reclaimable this way.
    pub fn finish(&mut self, tid: &str) -> Option<RequestContext> {
        let (key, borrowed) = self.borrowed.remove_entry(tid)?;
        self.free.push(key);
        Some(borrowed.ctx)
    }

    /// Move every expired borrowed TID back to the free pool
    fn reclaim_expired(&mut self) {
        let now = now_ms();
        let expired: Vec<String> = self
            .borrowed
            .iter()
            .filter(|(_, b)| b.expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.borrowed.remove(&key);
            self.free.push(key);
        }
    }

    /// Forcibly reclaim the oldest-expiring half of the borrowed map
    fn reclaim_oldest_half(&mut self) {
        let mut entries: Vec<(String, u64)> = self
            .borrowed
            .iter()
            .map(|(k, b)| (k.clone(), b.expires_at))
            .collect();
        entries.sort_by_key(|&(_, expires_at)| expires_at);
        let reclaim_count = (entries.len() / 2).max(1).min(entries.len());
        for (key, _) in entries.into_iter().take(reclaim_count) {
            self.borrowed.remove(&key);
            self.free.push(key);
        }
    }
}

impl Default for TransactionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
