//! DHT node identity and the XOR distance metric
//!
//! `NodeId` is the 160-bit identifier used throughout the Kademlia routing
//! table. Distances are computed with XOR and treated as unsigned big-endian
//! 160-bit integers, which is what gives the metric its commutative and
//! triangle-inequality properties.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::cmp::Ordering;
use std::fmt;

/// 160-bit (20-byte) node identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 20]);

impl NodeId {
    /// Number of bytes in a NodeId
    pub const LEN: usize = 20;

    /// Generate a random NodeId
    ///
    /// Per spec, random identifiers are the SHA-1 hash of 20 random bytes
    /// rather than raw random bytes, so the distribution matches ids
    /// produced from real key material.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::NodeId;
    ///
    /// let id = NodeId::random();
    /// assert_eq!(id.as_bytes().len(), 20);
    /// ```
    #[must_use]
    pub fn random() -> Self {
        let mut seed = [0u8; 20];
        rand::thread_rng().fill_bytes(&mut seed);
        Self::from_sha1(&seed)
    }

    /// Derive a NodeId from a stable local seed (e.g. a MAC address)
    ///
    /// The local node's identifier is intended to be derived this way so it
    /// stays stable across restarts on the same machine.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::NodeId;
    ///
    /// let id1 = NodeId::from_mac_seed(&[0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
    /// let id2 = NodeId::from_mac_seed(&[0x02, 0x42, 0xac, 0x11, 0x00, 0x02]);
    /// assert_eq!(id1, id2);
    /// ```
    #[must_use]
    pub fn from_mac_seed(seed: &[u8]) -> Self {
        Self::from_sha1(seed)
    }

    fn from_sha1(input: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(input);
        let digest = hasher.finalize();
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Build a NodeId from exactly 20 bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Build a NodeId from a byte slice, failing if it is not exactly 20 bytes
    ///
    /// # Errors
    ///
    /// Returns [`crate::DhtError::InvalidId`] if `slice.len() != 20`.
    pub fn from_slice(slice: &[u8]) -> Result<Self, crate::DhtError> {
        let bytes: [u8; 20] = slice.try_into().map_err(|_| crate::DhtError::InvalidId)?;
        Ok(Self(bytes))
    }

    /// Raw bytes of this identifier
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// XOR distance to another NodeId, itself a 160-bit value
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::NodeId;
    ///
    /// let a = NodeId::from_bytes([1u8; 20]);
    /// let b = NodeId::from_bytes([2u8; 20]);
    /// assert_eq!(a.distance(&b).as_bytes()[0], 3);
    /// ```
    #[must_use]
    pub fn distance(&self, other: &NodeId) -> NodeId {
        let mut out = [0u8; 20];
        for i in 0..20 {
            out[i] = self.0[i] ^ other.0[i];
        }
        NodeId(out)
    }

    /// Sort key for "closest to `target`" ordering: ascending distance, ties
    /// broken by byte-lexicographic id order (distances can't actually tie
    /// for distinct ids against the same target, but the tuple keeps the
    /// ordering total and stable regardless).
    #[must_use]
    pub fn distance_key(&self, target: &NodeId) -> (NodeId, NodeId) {
        (self.distance(target), *self)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", hex::encode(self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl PartialOrd for NodeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for NodeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}
