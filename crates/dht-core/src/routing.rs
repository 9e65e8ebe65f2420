//! Kademlia routing table: prefix-tree bucket partitioning and lookups
//!
//! The id space `[0, 2^160-1]` is split, at construction time, into the
//! disjoint set of buckets described in spec §4.2: at each step the half of
//! the remaining range that does *not* contain the local id becomes a
//! bucket, and the half that does contain it is recursed into. The result
//! is a list of buckets whose ranges get geometrically finer as they
//! approach the local id — expressed here iteratively with two cursors
//! walking from the full range toward the local id, per spec §9's
//! redesign note, rather than as actual recursion.

use crate::bucket::Bucket;
use crate::error::DhtError;
use crate::node::Node;
use crate::node_id::NodeId;

/// Default number of closest nodes to return from a lookup
pub const K: usize = 8;

/// A Kademlia routing table owned by one local node
#[derive(Debug)]
pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<Bucket>,
}

impl RoutingTable {
    /// Build a routing table for `local_id`, partitioning the id space per
    /// spec §4.2.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::{RoutingTable, NodeId};
    ///
    /// let table = RoutingTable::new(NodeId::from_bytes([0u8; 20]));
    /// assert!(table.bucket_count() > 0);
    /// assert_eq!(table.peer_count(), 0);
    /// ```
    #[must_use]
    pub fn new(local_id: NodeId) -> Self {
        Self {
            local_id,
            buckets: partition(local_id),
        }
    }

    /// The local node's identifier
    #[must_use]
    pub const fn local_id(&self) -> &NodeId {
        &self.local_id
    }

    /// Number of buckets in this table (bounded by the id's bit length)
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// All buckets, coarsest (farthest from local) first
    #[must_use]
    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    fn bucket_index_for(&self, id: &NodeId) -> Option<usize> {
        self.buckets.iter().position(|b| b.covers(id))
    }

    /// Add (or refresh) a node, delegating to the bucket whose range covers it
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::SelfInsert`] if `node.id()` is the local id.
    pub fn add(&mut self, node: Node) -> Result<bool, DhtError> {
        if node.id() == &self.local_id {
            return Err(DhtError::SelfInsert);
        }
        let idx = self
            .bucket_index_for(node.id())
            .expect("buckets cover every non-local id");
        Ok(self.buckets[idx].insert(node))
    }

    /// Remove a node by value (matched by id)
    pub fn remove(&mut self, node: &Node) -> bool {
        self.remove_by_id(node.id())
    }

    /// Remove a node by id
    pub fn remove_by_id(&mut self, id: &NodeId) -> bool {
        match self.bucket_index_for(id) {
            Some(idx) => self.buckets[idx].remove(id),
            None => false,
        }
    }

    /// Remove all nodes (across every bucket) whose endpoint address equals `addr`
    ///
    /// Used by the dispatcher to penalise a peer that sent a malformed
    /// datagram (spec §4.7).
    pub fn remove_by_addr(&mut self, addr: &str) -> usize {
        self.buckets.iter_mut().map(|b| b.remove_by_addr(addr)).sum()
    }

    /// The `k` nodes (across all buckets) closest to `target`, ascending distance
    #[must_use]
    pub fn find_closest_nodes(&self, target: &NodeId, k: usize) -> Vec<Node> {
        let mut all: Vec<Node> = self
            .buckets
            .iter()
            .flat_map(|b| b.nodes().iter().cloned())
            .collect();
        all.sort_by_key(|n| n.id().distance_key(target));
        all.truncate(k);
        all
    }

    /// Find a node by exact id match
    #[must_use]
    pub fn find(&self, id: &NodeId) -> Option<Node> {
        self.bucket_index_for(id)
            .and_then(|idx| self.buckets[idx].nodes().iter().find(|n| n.id() == id))
            .cloned()
    }

    /// The first node of the first non-empty bucket, or `None` if the table is empty
    #[must_use]
    pub fn random_node(&self) -> Option<Node> {
        self.buckets
            .iter()
            .find(|b| !b.is_empty())
            .and_then(|b| b.nodes().front())
            .cloned()
    }

    /// Total number of nodes across all buckets
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.buckets.iter().map(Bucket::len).sum()
    }
}

/// Build the ordered bucket list for `local_id` per spec §4.2
fn partition(local_id: NodeId) -> Vec<Bucket> {
    let mut buckets = Vec::new();
    let mut lo = NodeId::from_bytes([0u8; 20]);
    let mut hi = NodeId::from_bytes([0xffu8; 20]);

    loop {
        if lo == hi {
            // Singleton range; by construction this is always {local_id}.
            break;
        }

        let mid = bigid::midpoint(&lo, &hi);
        if lo <= local_id && local_id <= mid {
            // Local id is in the left half; the right half is off-path.
            let right_start = bigid::inc(&mid);
            buckets.push(Bucket::new(right_start, hi));
            hi = mid;
        } else {
            // Local id is in the right half; the left half is off-path.
            buckets.push(Bucket::new(lo, mid));
            lo = bigid::inc(&mid);
        }
    }

    buckets
}

/// Minimal 160-bit unsigned big-integer helpers over `NodeId`'s byte
/// representation, used only for bucket-range partitioning.
mod bigid {
    use super::NodeId;

    /// `a + 1`, saturating at the all-ones value (never hit in practice:
    /// the partitioner only increments a midpoint that is strictly below
    /// the range's upper bound).
    pub fn inc(a: &NodeId) -> NodeId {
        let mut out = *a.as_bytes();
        for byte in out.iter_mut().rev() {
            if *byte == 0xff {
                *byte = 0;
            } else {
                *byte += 1;
                return NodeId::from_bytes(out);
            }
        }
        NodeId::from_bytes([0xffu8; 20]) // saturate on overflow
    }

    /// `(a + b - 1) / 2`, computed with a 21-byte (168-bit) accumulator so
    /// the intermediate sum (up to `2*(2^160-1)`) never overflows.
    pub fn midpoint(a: &NodeId, b: &NodeId) -> NodeId {
        let mut sum = [0u8; 21];
        let mut carry = 0u16;
        for i in (0..20).rev() {
            let s = u16::from(a.as_bytes()[i]) + u16::from(b.as_bytes()[i]) + carry;
            sum[i + 1] = (s & 0xff) as u8;
            carry = s >> 8;
        }
        sum[0] = carry as u8;

        // subtract 1
        let mut borrow = 1u16;
        for byte in sum.iter_mut().rev() {
            if borrow == 0 {
                break;
            }
            if *byte == 0 {
                *byte = 0xff;
            } else {
                *byte -= 1;
                borrow = 0;
            }
        }

        // divide by 2 (right shift one bit)
        let mut shifted = [0u8; 21];
        let mut carry_bit = 0u8;
        for (i, byte) in sum.iter().enumerate() {
            shifted[i] = (byte >> 1) | (carry_bit << 7);
            carry_bit = byte & 1;
        }

        let mut out = [0u8; 20];
        out.copy_from_slice(&shifted[1..]);
        NodeId::from_bytes(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::Endpoint;

    fn node(byte: u8) -> Node {
        Node::new(
            NodeId::from_bytes([byte; 20]),
            Endpoint::new("127.0.0.1", 6881).unwrap(),
        )
    }

    #[test]
    fn buckets_cover_disjoint_ranges() {
        let table = RoutingTable::new(NodeId::from_bytes([0u8; 20]));
        let buckets = table.buckets();
        for i in 0..buckets.len() {
            for j in (i + 1)..buckets.len() {
                let (a, b) = (&buckets[i], &buckets[j]);
                let disjoint = a.end() < b.start() || b.end() < a.start();
                assert!(disjoint, "bucket ranges must not overlap");
            }
        }
    }

    #[test]
    fn buckets_union_covers_id_space_minus_local() {
        let local = NodeId::from_bytes([0u8; 20]);
        let table = RoutingTable::new(local);
        let mut covered = 0u32;
        for b in table.buckets() {
            assert!(b.start() <= b.end());
        }
        // Spot-check a sample of ids all land in exactly one bucket, or are the local id.
        for byte in 0u8..=255 {
            let id = NodeId::from_bytes([byte; 20]);
            let matches: Vec<_> = table.buckets().iter().filter(|b| b.covers(&id)).collect();
            if id == local {
                assert!(matches.is_empty());
            } else {
                assert_eq!(matches.len(), 1);
                covered += 1;
            }
        }
        assert_eq!(covered, 255);
    }

    #[test]
    fn add_rejects_local_id() {
        let local = NodeId::from_bytes([5u8; 20]);
        let mut table = RoutingTable::new(local);
        let self_node = Node::new(local, Endpoint::new("127.0.0.1", 6881).unwrap());
        assert!(matches!(table.add(self_node), Err(DhtError::SelfInsert)));
    }

    #[test]
    fn add_and_find() {
        let mut table = RoutingTable::new(NodeId::from_bytes([0u8; 20]));
        let n = node(0xff);
        table.add(n.clone()).unwrap();
        let found = table.find(n.id()).unwrap();
        assert_eq!(found.id(), n.id());
    }

    #[test]
    fn remove_by_addr_scans_every_bucket() {
        let mut table = RoutingTable::new(NodeId::from_bytes([0u8; 20]));
        table.add(node(0x10)).unwrap();
        table.add(node(0x80)).unwrap();
        assert_eq!(table.peer_count(), 2);
        assert_eq!(table.remove_by_addr("127.0.0.1"), 2);
        assert_eq!(table.peer_count(), 0);
    }

    #[test]
    fn find_closest_nodes_orders_and_bounds() {
        let mut table = RoutingTable::new(NodeId::from_bytes([0u8; 20]));
        for b in [0x01, 0x02, 0x04, 0xff] {
            table.add(node(b)).unwrap();
        }
        let target = NodeId::from_bytes([0u8; 20]);
        let closest = table.find_closest_nodes(&target, 3);
        let ids: Vec<u8> = closest.iter().map(|n| n.id().as_bytes()[0]).collect();
        assert_eq!(ids, vec![0x01, 0x02, 0x04]);
    }

    #[test]
    fn random_node_returns_first_nonempty_bucket_head() {
        let mut table = RoutingTable::new(NodeId::from_bytes([0u8; 20]));
        assert!(table.random_node().is_none());
        table.add(node(0x80)).unwrap();
        assert!(table.random_node().is_some());
    }

    #[test]
    fn bigid_midpoint_matches_spec_formula() {
        let start = NodeId::from_bytes([0u8; 20]);
        let mut end_bytes = [0u8; 20];
        end_bytes[19] = 0x05;
        let end = NodeId::from_bytes(end_bytes);
        // (0 + 5 - 1) / 2 = 2
        let mid = bigid::midpoint(&start, &end);
        assert_eq!(mid.as_bytes()[19], 2);
    }
}
