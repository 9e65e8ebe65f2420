//! Query, response, and error handlers (spec §4.8)
//!
//! These are invoked by the [`dispatcher`](crate::dispatcher) once a frame
//! has been decoded and classified by `y`. They are the only code that
//! mutates the routing table, transaction registry, and info-hash store in
//! reaction to network traffic.

use std::net::SocketAddr;

use crate::endpoint::Endpoint;
use crate::error::DhtError;
use crate::krpc::message::{Args, Frame, ERR_GENERIC, ERR_PROTOCOL};
use crate::krpc::QueryType;
use crate::node::Node;
use crate::node_id::NodeId;
use crate::routing::K;
use crate::runtime::DhtRuntime;
use crate::sender::Sender;

fn id_from(bytes: &[u8]) -> Option<NodeId> {
    let arr: [u8; 20] = bytes.try_into().ok()?;
    Some(NodeId::from_bytes(arr))
}

fn encode_nodes(nodes: &[Node]) -> Vec<u8> {
    let mut out = Vec::with_capacity(nodes.len() * 26);
    for node in nodes {
        if let Ok(compact) = node.to_compact() {
            out.extend_from_slice(&compact);
        }
    }
    out
}

async fn add_node(runtime: &DhtRuntime, node: Node) {
    if node.id() == &runtime.local_id() {
        return;
    }
    let _ = runtime.routing().lock().await.add(node);
}

/// Handle an incoming query (`y == "q"`), dispatching by `q` (spec §4.8.Q)
pub async fn handle_query(
    runtime: &DhtRuntime,
    sender: &Sender,
    frame: &Frame,
    src: SocketAddr,
) -> Result<(), DhtError> {
    let tid = frame.tid.clone();
    let Some(args) = &frame.args else {
        return sender.reply_error(src, tid, ERR_PROTOCOL, "missing arguments").await;
    };
    let Some(remote_id) = id_from(&args.id) else {
        return sender.reply_error(src, tid, ERR_PROTOCOL, "invalid id").await;
    };
    let endpoint = Endpoint::new(src.ip().to_string(), src.port())?;
    let ephemeral = Node::new(remote_id, endpoint);

    match frame.query.as_deref() {
        Some("ping") => {
            let local_id = *runtime.local_id().as_bytes();
            sender
                .send_to(src, &Frame::id_only_response(tid, local_id))
                .await
        }
        Some("find_node") => handle_find_node(runtime, sender, src, tid, args).await,
        Some("get_peers") => handle_get_peers(runtime, sender, src, tid, args).await,
        Some("announce_peer") => handle_announce_peer(runtime, sender, src, tid, args, &ephemeral).await,
        Some(other) => {
            tracing::error!("unknown query kind {other:?} from {src}");
            Ok(())
        }
        None => {
            tracing::error!("query with no method from {src}");
            Ok(())
        }
    }
}

async fn handle_find_node(
    runtime: &DhtRuntime,
    sender: &Sender,
    src: SocketAddr,
    tid: Vec<u8>,
    args: &Args,
) -> Result<(), DhtError> {
    let Some(target) = args.target.as_deref().and_then(id_from) else {
        return sender.reply_error(src, tid, ERR_PROTOCOL, "invalid target").await;
    };
    let closest = runtime.routing().lock().await.find_closest_nodes(&target, K);
    if closest.is_empty() {
        return sender.reply_error(src, tid, ERR_GENERIC, "no known nodes").await;
    }
    let local_id = *runtime.local_id().as_bytes();
    sender
        .send_to(src, &Frame::nodes_response(tid, local_id, encode_nodes(&closest)))
        .await
}

async fn handle_get_peers(
    runtime: &DhtRuntime,
    sender: &Sender,
    src: SocketAddr,
    tid: Vec<u8>,
    args: &Args,
) -> Result<(), DhtError> {
    let Some(info_hash) = args.info_hash.as_deref().and_then(id_from) else {
        return sender
            .reply_error(src, tid, ERR_PROTOCOL, "invalid info_hash")
            .await;
    };
    let hash_hex = info_hash.to_string();
    let local_id = *runtime.local_id().as_bytes();

    let stored_peers = {
        let store = runtime.store().lock().await;
        store.find(&hash_hex).filter(|peers| !peers.is_empty())
    };
    if let Some(peers) = stored_peers {
        let token = runtime
            .store()
            .lock()
            .await
            .find_token(&hash_hex)
            .unwrap_or_default();
        let values: Vec<Vec<u8>> = peers
            .iter()
            .filter_map(|p| p.to_compact().ok().map(|c| c.to_vec()))
            .collect();
        return sender
            .send_to(src, &Frame::values_response(tid, local_id, token, values))
            .await;
    }

    let closest = runtime
        .routing()
        .lock()
        .await
        .find_closest_nodes(&info_hash, K);
    if closest.is_empty() {
        return sender
            .reply_error(src, tid, ERR_GENERIC, "no peers or nodes")
            .await;
    }
    sender
        .send_to(src, &Frame::nodes_response(tid, local_id, encode_nodes(&closest)))
        .await
}

async fn handle_announce_peer(
    runtime: &DhtRuntime,
    sender: &Sender,
    src: SocketAddr,
    tid: Vec<u8>,
    args: &Args,
    ephemeral: &Node,
) -> Result<(), DhtError> {
    let Some(info_hash) = args.info_hash.as_deref().and_then(id_from) else {
        return sender
            .reply_error(src, tid, ERR_PROTOCOL, "invalid info_hash")
            .await;
    };
    let Some(port) = args.port.filter(|p| *p != 0) else {
        return sender.reply_error(src, tid, ERR_PROTOCOL, "invalid port").await;
    };
    let Some(token) = args.token.clone() else {
        return sender.reply_error(src, tid, ERR_PROTOCOL, "missing token").await;
    };

    let hash_hex = info_hash.to_string();
    let mismatched = {
        let store = runtime.store().lock().await;
        store
            .find_token(&hash_hex)
            .is_some_and(|existing| existing != token)
    };
    if mismatched {
        return sender
            .reply_error(src, tid, ERR_PROTOCOL, "token mismatch")
            .await;
    }

    let implied_port = args.implied_port == Some(1);
    let download_port = if implied_port { src.port() } else { port };
    let peer_endpoint = Endpoint::new(ephemeral.endpoint().addr(), download_port)?;
    {
        let mut store = runtime.store().lock().await;
        if let Err(e) = store.add(&hash_hex, peer_endpoint, token) {
            tracing::warn!("announce_peer store rejected write for {hash_hex}: {e}");
        }
    }

    let local_id = *runtime.local_id().as_bytes();
    sender
        .send_to(src, &Frame::id_only_response(tid, local_id))
        .await
}

/// Handle an incoming response (`y == "r"`), dispatching by the stored
/// query type of the transaction it correlates to (spec §4.8.R)
pub async fn handle_response(
    runtime: &DhtRuntime,
    sender: &Sender,
    frame: &Frame,
    src: SocketAddr,
) -> Result<(), DhtError> {
    let tid = frame.tid_string();
    let valid = runtime.registry().lock().await.is_valid(&tid);
    if !valid {
        return Ok(());
    }
    let Some(reply) = &frame.reply else {
        return Ok(());
    };
    let Some(responder_id) = id_from(&reply.id) else {
        return Ok(());
    };
    let Some(ctx) = runtime.registry().lock().await.finish(&tid) else {
        return Ok(());
    };

    let responder_endpoint = Endpoint::new(src.ip().to_string(), src.port())?;
    let responder_node = Node::new(responder_id, responder_endpoint);

    match ctx.query_type {
        QueryType::Ping => add_node(runtime, responder_node).await,
        QueryType::FindNode => {
            if let Some(nodes_bytes) = &reply.nodes {
                for node in Node::decode_many(nodes_bytes)? {
                    add_node(runtime, node).await;
                }
            }
            add_node(runtime, responder_node).await;
        }
        QueryType::GetPeers => {
            // Per spec §9's documented open question, the token is taken
            // from this response's transaction id rather than `r.token`.
            let token = tid.clone().into_bytes();
            if let Some(values) = &reply.values {
                let mut peers = Vec::with_capacity(values.len());
                for value in values {
                    let bytes: [u8; 6] = value
                        .as_slice()
                        .try_into()
                        .map_err(|_| DhtError::MalformedCompact(value.len(), 6))?;
                    peers.push(Endpoint::from_compact(&bytes));
                }
                if let Some(hash) = ctx.info_hash {
                    let hash_hex = NodeId::from_bytes(hash).to_string();
                    runtime.store().lock().await.add_list(&hash_hex, peers, token);
                }
            } else if let Some(nodes_bytes) = &reply.nodes {
                let nodes = Node::decode_many(nodes_bytes)?;
                if let Some(hash) = ctx.info_hash {
                    for node in &nodes {
                        let _ = sender.send_get_peers(node, hash).await;
                    }
                }
            }
            add_node(runtime, responder_node).await;
        }
        QueryType::AnnouncePeer => add_node(runtime, responder_node).await,
    }
    Ok(())
}

/// Handle an incoming error (`y == "e"`) (spec §4.8.E)
///
/// Implements the *corrected* validity guard (spec §9 flags the source's
/// inverted guard as a bug): the transaction is only finished if `tid` is
/// non-empty and currently valid.
pub async fn handle_error(runtime: &DhtRuntime, frame: &Frame) -> Result<(), DhtError> {
    let tid = frame.tid_string();
    match &frame.error {
        Some((code, message)) => tracing::warn!("krpc error {code} from tid {tid:?}: {message}"),
        None => tracing::warn!("krpc error frame with no payload, tid {tid:?}"),
    }

    let valid = !tid.is_empty() && runtime.registry().lock().await.is_valid(&tid);
    if valid {
        runtime.registry().lock().await.finish(&tid);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::krpc::RequestContext;

    fn make_runtime() -> std::sync::Arc<DhtRuntime> {
        // Built lazily per test via a current-thread runtime, since bind()
        // is async.
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(DhtRuntime::bind(NodeId::from_bytes([0u8; 20]), 0))
            .unwrap()
    }

    #[tokio::test]
    async fn ping_response_adds_node_and_finishes_transaction() {
        let runtime = make_runtime();
        let sender = Sender::new(runtime.clone());
        let tid = runtime
            .registry()
            .lock()
            .await
            .create(RequestContext {
                query_type: QueryType::Ping,
                target_addr: "127.0.0.1".into(),
                target_port: 6881,
                info_hash: None,
            })
            .unwrap();

        let responder_id = [9u8; 20];
        let frame = Frame {
            tid: tid.clone().into_bytes(),
            y: "r".into(),
            reply: Some(crate::krpc::message::Reply {
                id: responder_id.to_vec(),
                ..Default::default()
            }),
            ..Default::default()
        };

        handle_response(&runtime, &sender, &frame, "127.0.0.1:6881".parse().unwrap())
            .await
            .unwrap();

        assert!(!runtime.registry().lock().await.is_valid(&tid));
        assert!(runtime
            .routing()
            .lock()
            .await
            .find(&NodeId::from_bytes(responder_id))
            .is_some());
    }

    #[tokio::test]
    async fn response_with_unknown_tid_is_dropped() {
        let runtime = make_runtime();
        let sender = Sender::new(runtime.clone());
        let frame = Frame {
            tid: b"zz".to_vec(),
            y: "r".into(),
            reply: Some(crate::krpc::message::Reply {
                id: [1u8; 20].to_vec(),
                ..Default::default()
            }),
            ..Default::default()
        };
        handle_response(&runtime, &sender, &frame, "127.0.0.1:6881".parse().unwrap())
            .await
            .unwrap();
        assert_eq!(runtime.routing().lock().await.peer_count(), 0);
    }

    #[tokio::test]
    async fn ping_query_is_answered_with_id_only_response() {
        let runtime = make_runtime();
        let sender = Sender::new(runtime.clone());
        let frame = Frame::ping_query(b"aa".to_vec(), [7u8; 20]);
        // Can't observe the reply over a real socket in this test; just
        // assert the handler runs clean for a well-formed ping.
        handle_query(&runtime, &sender, &frame, "127.0.0.1:6881".parse().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn find_node_with_empty_table_replies_error_and_does_not_panic() {
        let runtime = make_runtime();
        let sender = Sender::new(runtime.clone());
        let frame = Frame::find_node_query(b"bb".to_vec(), [7u8; 20], [1u8; 20]);
        handle_query(&runtime, &sender, &frame, "127.0.0.1:6881".parse().unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn announce_peer_rejects_mismatched_token() {
        let runtime = make_runtime();
        let sender = Sender::new(runtime.clone());
        let hash = [5u8; 20];
        runtime
            .store()
            .lock()
            .await
            .add(
                &NodeId::from_bytes(hash).to_string(),
                Endpoint::new("1.2.3.4", 111).unwrap(),
                b"good".to_vec(),
            )
            .unwrap();

        let frame = Frame::announce_peer_query(
            b"cc".to_vec(),
            [9u8; 20],
            hash,
            6881,
            false,
            b"bad".to_vec(),
        );
        handle_query(&runtime, &sender, &frame, "127.0.0.1:6881".parse().unwrap())
            .await
            .unwrap();

        // The mismatched-token announce must not have added a second peer.
        let peers = runtime
            .store()
            .lock()
            .await
            .find(&NodeId::from_bytes(hash).to_string())
            .unwrap();
        assert_eq!(peers.len(), 1);
    }
}
