//! Remote DHT node: identity, endpoint, and liveness tracking

use crate::endpoint::Endpoint;
use crate::error::DhtError;
use crate::node_id::NodeId;
use std::time::{SystemTime, UNIX_EPOCH};

/// A node becomes stale (and is a candidate for replacement) after this long
/// without activity.
pub const STALE_AFTER_MS: u64 = 5 * 60 * 1000;

/// Current time in milliseconds since the Unix epoch
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// A remote node known to the routing table
///
/// `active_at` is updated on construction, on [`Node::touch`], and on every
/// re-add into a bucket (see [`crate::bucket::Bucket::insert`]).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    endpoint: Endpoint,
    id: NodeId,
    active_at: u64,
}

impl Node {
    /// Construct a new node, stamping `active_at` to the current time
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::{Node, NodeId, endpoint::Endpoint};
    ///
    /// let ep = Endpoint::new("127.0.0.1", 6881).unwrap();
    /// let node = Node::new(NodeId::random(), ep);
    /// assert!(node.is_active());
    /// ```
    #[must_use]
    pub fn new(id: NodeId, endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            id,
            active_at: now_ms(),
        }
    }

    /// This node's identifier
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// This node's endpoint
    #[must_use]
    pub const fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Timestamp (ms since epoch) of the last observed activity
    #[must_use]
    pub const fn active_at(&self) -> u64 {
        self.active_at
    }

    /// Update the endpoint's address/port and refresh `active_at`
    ///
    /// Called whenever fresh contact information for an already-known node
    /// is observed (e.g. a differing source port on a response).
    pub fn update(&mut self, port: u16, addr: impl Into<String>) -> Result<(), DhtError> {
        self.endpoint = Endpoint::new(addr, port)?;
        self.touch();
        Ok(())
    }

    /// Refresh `active_at` to the current time without changing the endpoint
    pub fn touch(&mut self) {
        self.active_at = now_ms();
    }

    /// Whether this node has been active within the staleness threshold
    ///
    /// A pure derived view over `active_at` — never a lifetime operation.
    #[must_use]
    pub fn is_active(&self) -> bool {
        now_ms().saturating_sub(self.active_at) < STALE_AFTER_MS
    }

    /// Encode as the 26-byte compact node record: `NodeId(20) || Endpoint(6)`
    ///
    /// # Errors
    ///
    /// Returns an error if this node's endpoint is not IPv4.
    pub fn to_compact(&self) -> Result<[u8; 26], DhtError> {
        let mut out = [0u8; 26];
        out[..20].copy_from_slice(self.id.as_bytes());
        out[20..].copy_from_slice(&self.endpoint.to_compact()?);
        Ok(out)
    }

    /// Decode a 26-byte compact node record
    #[must_use]
    pub fn from_compact(bytes: &[u8; 26]) -> Self {
        let mut id_bytes = [0u8; 20];
        id_bytes.copy_from_slice(&bytes[..20]);
        let mut ep_bytes = [0u8; 6];
        ep_bytes.copy_from_slice(&bytes[20..]);
        Self {
            endpoint: Endpoint::from_compact(&ep_bytes),
            id: NodeId::from_bytes(id_bytes),
            active_at: now_ms(),
        }
    }

    /// Decode a `nodes` payload (concatenated 26-byte records) into a `Vec<Node>`
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::MalformedCompact`] if `bytes.len()` is not a
    /// multiple of 26.
    pub fn decode_many(bytes: &[u8]) -> Result<Vec<Self>, DhtError> {
        if bytes.len() % 26 != 0 {
            return Err(DhtError::MalformedCompact(bytes.len(), 26));
        }
        Ok(bytes
            .chunks_exact(26)
            .map(|chunk| {
                let mut arr = [0u8; 26];
                arr.copy_from_slice(chunk);
                Self::from_compact(&arr)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: [u8; 20]) -> Node {
        Node::new(
            NodeId::from_bytes(id),
            Endpoint::new("127.0.0.1", 6881).unwrap(),
        )
    }

    #[test]
    fn new_node_is_active() {
        assert!(node([1u8; 20]).is_active());
    }

    #[test]
    fn touch_refreshes_active_at() {
        let mut n = node([1u8; 20]);
        let first = n.active_at();
        n.active_at = first - 1000;
        assert!(n.active_at() < first);
        n.touch();
        assert!(n.active_at() >= first);
    }

    #[test]
    fn stale_node_is_not_active() {
        let mut n = node([1u8; 20]);
        n.active_at = now_ms() - STALE_AFTER_MS - 1;
        assert!(!n.is_active());
    }

    #[test]
    fn update_changes_endpoint_and_touches() {
        let mut n = node([1u8; 20]);
        n.active_at = 0;
        n.update(6882, "10.0.0.5").unwrap();
        assert_eq!(n.endpoint().addr(), "10.0.0.5");
        assert_eq!(n.endpoint().port(), 6882);
        assert!(n.active_at() > 0);
    }

    #[test]
    fn compact_round_trip() {
        let n = node([7u8; 20]);
        let compact = n.to_compact().unwrap();
        let decoded = Node::from_compact(&compact);
        assert_eq!(n.id(), decoded.id());
        assert_eq!(n.endpoint(), decoded.endpoint());
    }

    #[test]
    fn decode_many_rejects_bad_length() {
        assert!(Node::decode_many(&[0u8; 25]).is_err());
        assert!(Node::decode_many(&[0u8; 52]).is_ok());
    }

    #[test]
    fn decode_many_splits_records() {
        let a = node([1u8; 20]).to_compact().unwrap();
        let b = node([2u8; 20]).to_compact().unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&a);
        buf.extend_from_slice(&b);
        let decoded = Node::decode_many(&buf).unwrap();
        assert_eq!(decoded.len(), 2);
        assert_eq!(decoded[0].id(), &NodeId::from_bytes([1u8; 20]));
        assert_eq!(decoded[1].id(), &NodeId::from_bytes([2u8; 20]));
    }
}
