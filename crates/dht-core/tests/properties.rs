//! Property-based tests for the invariants spec'd across the routing
//! table, wire codec, transaction registry, and info-hash store.

use mdht_core::endpoint::Endpoint;
use mdht_core::krpc::message::Frame;
use mdht_core::krpc::transaction::{QueryType, RequestContext, TransactionRegistry};
use mdht_core::node::Node;
use mdht_core::store::InfoHashStore;
use mdht_core::{NodeId, RoutingTable};
use proptest::prelude::*;

fn arb_node_id_bytes() -> impl Strategy<Value = [u8; 20]> {
    proptest::array::uniform20(any::<u8>())
}

fn arb_node(local: NodeId) -> impl Strategy<Value = Node> {
    (arb_node_id_bytes(), 1u16..=65535).prop_filter_map("non-local id", move |(bytes, port)| {
        let id = NodeId::from_bytes(bytes);
        if id == local {
            None
        } else {
            Some(Node::new(id, Endpoint::new("127.0.0.1", port).unwrap()))
        }
    })
}

proptest! {
    /// I1: every bucket's members fall within its own `[start, end]` range
    #[test]
    fn bucket_range_invariant_holds(local_bytes in arb_node_id_bytes(), nodes in prop::collection::vec(arb_node_id_bytes(), 1..40)) {
        let local = NodeId::from_bytes(local_bytes);
        let mut table = RoutingTable::new(local);
        for bytes in nodes {
            let id = NodeId::from_bytes(bytes);
            if id == local {
                continue;
            }
            let node = Node::new(id, Endpoint::new("127.0.0.1", 6881).unwrap());
            let _ = table.add(node);
        }
        for bucket in table.buckets() {
            for n in bucket.nodes() {
                prop_assert!(bucket.covers(n.id()));
            }
        }
    }

    /// I2: bucket ranges partition the id space disjointly, covering every
    /// id except the local one exactly once
    #[test]
    fn bucket_union_is_disjoint_and_total(local_bytes in arb_node_id_bytes(), probes in prop::collection::vec(arb_node_id_bytes(), 1..50)) {
        let local = NodeId::from_bytes(local_bytes);
        let table = RoutingTable::new(local);
        let buckets = table.buckets();
        for i in 0..buckets.len() {
            for j in (i + 1)..buckets.len() {
                let disjoint = buckets[i].end() < buckets[j].start() || buckets[j].end() < buckets[i].start();
                prop_assert!(disjoint);
            }
        }
        for bytes in probes {
            let id = NodeId::from_bytes(bytes);
            let matches = buckets.iter().filter(|b| b.covers(&id)).count();
            if id == local {
                prop_assert_eq!(matches, 0);
            } else {
                prop_assert_eq!(matches, 1);
            }
        }
    }

    /// I3: a bucket never exceeds its fixed capacity regardless of insert volume
    #[test]
    fn bucket_capacity_is_never_exceeded(local_bytes in arb_node_id_bytes(), extra in 0usize..30) {
        let local = NodeId::from_bytes(local_bytes);
        let mut table = RoutingTable::new(local);
        // Drive enough distinct inserts at the bucket farthest from local
        // (index 0, the top-level split) to threaten overflow.
        let bucket_range_start = *table.buckets()[0].start();
        for i in 0..(mdht_core::bucket::CAPACITY + extra) {
            let mut bytes = *bucket_range_start.as_bytes();
            bytes[19] = bytes[19].wrapping_add(i as u8);
            let id = NodeId::from_bytes(bytes);
            if id == local || !table.buckets()[0].covers(&id) {
                continue;
            }
            let node = Node::new(id, Endpoint::new("127.0.0.1", 6881).unwrap());
            let _ = table.add(node);
        }
        for bucket in table.buckets() {
            prop_assert!(bucket.len() <= mdht_core::bucket::CAPACITY);
        }
    }

    /// R1: `Frame` survives an encode/decode cycle for each message shape
    #[test]
    fn find_node_frame_round_trips(tid in "[a-zA-Z0-9]{2}", id in arb_node_id_bytes(), target in arb_node_id_bytes()) {
        let frame = Frame::find_node_query(tid.clone().into_bytes(), id, target);
        let bytes = frame.encode().unwrap();
        let decoded = Frame::decode(&bytes).unwrap();
        prop_assert_eq!(decoded.tid_string(), tid);
        prop_assert_eq!(decoded.args.unwrap().target, Some(target.to_vec()));
    }

    /// R2: a compact node record round-trips through its 26-byte encoding
    #[test]
    fn compact_node_round_trips(id in arb_node_id_bytes(), port in 1u16..=65535) {
        let node = Node::new(NodeId::from_bytes(id), Endpoint::new("127.0.0.1", port).unwrap());
        let compact = node.to_compact().unwrap();
        let decoded = Node::decode_many(&compact).unwrap();
        prop_assert_eq!(decoded.len(), 1);
        prop_assert_eq!(decoded[0].id(), node.id());
        prop_assert_eq!(decoded[0].endpoint().port(), port);
    }

    /// O1: `find_closest_nodes` always returns ids in strictly ascending
    /// distance order from the target
    #[test]
    fn find_closest_nodes_is_sorted_by_distance(local_bytes in arb_node_id_bytes(), target_bytes in arb_node_id_bytes(), candidate_bytes in prop::collection::vec(arb_node_id_bytes(), 0..20)) {
        let local = NodeId::from_bytes(local_bytes);
        let mut table = RoutingTable::new(local);
        for bytes in candidate_bytes {
            let id = NodeId::from_bytes(bytes);
            if id == local {
                continue;
            }
            let node = Node::new(id, Endpoint::new("127.0.0.1", 6881).unwrap());
            let _ = table.add(node);
        }
        let target = NodeId::from_bytes(target_bytes);
        let closest = table.find_closest_nodes(&target, 8);
        for pair in closest.windows(2) {
            let d0 = pair[0].id().distance(&target);
            let d1 = pair[1].id().distance(&target);
            prop_assert!(d0 <= d1);
        }
    }

    /// I4: no two simultaneously-borrowed transactions ever share a TID
    #[test]
    fn borrowed_tids_are_always_unique(count in 1usize..500) {
        let mut registry = TransactionRegistry::new();
        let mut tids = std::collections::HashSet::new();
        for _ in 0..count {
            let tid = registry.create(RequestContext {
                query_type: QueryType::Ping,
                target_addr: "127.0.0.1".into(),
                target_port: 6881,
                info_hash: None,
            }).unwrap();
            prop_assert!(tids.insert(tid), "TID handed out twice while still borrowed");
        }
    }

    /// I5: once a token is bound to an info-hash, no later write can change it
    #[test]
    fn stored_token_is_immutable(first in prop::collection::vec(any::<u8>(), 1..20), second in prop::collection::vec(any::<u8>(), 1..20), port in 1u16..=65535) {
        prop_assume!(first != second);
        let mut store = InfoHashStore::new();
        let peer = Endpoint::new("127.0.0.1", port).unwrap();
        store.add("deadbeef", peer.clone(), first.clone()).unwrap();
        let result = store.add("deadbeef", peer, second);
        prop_assert!(result.is_err());
        prop_assert_eq!(store.find_token("deadbeef"), Some(first));
    }

    /// I6: a hash's peer set never exceeds its fixed cap
    #[test]
    fn peer_set_never_exceeds_cap(ports in prop::collection::hash_set(1u16..=65535, 0..150)) {
        let mut store = InfoHashStore::new();
        for port in ports {
            let _ = store.add("deadbeef", Endpoint::new("127.0.0.1", port).unwrap(), b"tok".to_vec());
        }
        let peers = store.find("deadbeef").unwrap_or_default();
        prop_assert!(peers.len() <= mdht_core::store::MAX_PEERS_PER_HASH);
    }
}
