//! The single task that owns the UDP socket: decode, classify, route.
//!
//! Per spec §4.7, a datagram that fails to decode is dropped and its
//! source address is evicted from the routing table (`remove_by_addr`) as
//! a light penalty for sending malformed traffic. Every other error raised
//! by a handler is logged and otherwise ignored — one bad frame never
//! brings the loop down.

use std::sync::Arc;

use crate::error::DhtError;
use crate::handlers;
use crate::krpc::message::Frame;
use crate::runtime::DhtRuntime;
use crate::sender::Sender;

/// Run the dispatch loop until the socket errors out
///
/// # Errors
///
/// Returns an error only if receiving from the socket itself fails (for
/// example, the OS tears down the interface); individual malformed or
/// mishandled datagrams never propagate out of this loop.
pub async fn run(runtime: Arc<DhtRuntime>) -> Result<(), DhtError> {
    let sender = Sender::new(runtime.clone());
    let mut buf = [0u8; 2048];
    loop {
        let (len, src) = runtime.recv(&mut buf).await?;
        dispatch_one(&runtime, &sender, &buf[..len], src).await;
    }
}

async fn dispatch_one(runtime: &DhtRuntime, sender: &Sender, datagram: &[u8], src: std::net::SocketAddr) {
    let frame = match Frame::decode(datagram) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!("dropping malformed datagram from {src}: {e}");
            let removed = runtime.routing().lock().await.remove_by_addr(&src.ip().to_string());
            if removed > 0 {
                tracing::debug!("evicted {removed} node(s) at {src} for sending malformed traffic");
            }
            return;
        }
    };

    let result = match frame.y.as_str() {
        "q" => handlers::handle_query(runtime, sender, &frame, src).await,
        "r" => handlers::handle_response(runtime, sender, &frame, src).await,
        "e" => handlers::handle_error(runtime, &frame).await,
        other => {
            tracing::debug!("frame from {src} with unknown y={other:?}");
            Ok(())
        }
    };

    if let Err(e) = result {
        tracing::warn!("handler error for datagram from {src}: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_id::NodeId;

    async fn make_runtime() -> Arc<DhtRuntime> {
        DhtRuntime::bind(NodeId::from_bytes([0u8; 20]), 0).await.unwrap()
    }

    #[tokio::test]
    async fn malformed_datagram_is_dropped_without_panicking() {
        let runtime = make_runtime().await;
        let sender = Sender::new(runtime.clone());
        dispatch_one(&runtime, &sender, b"not bencode", "127.0.0.1:6881".parse().unwrap()).await;
    }

    #[tokio::test]
    async fn malformed_datagram_evicts_sender_from_routing_table() {
        use crate::endpoint::Endpoint;
        use crate::node::Node;

        let runtime = make_runtime().await;
        let sender = Sender::new(runtime.clone());
        let addr: std::net::SocketAddr = "127.0.0.1:6881".parse().unwrap();
        let known = Node::new(NodeId::random(), Endpoint::new("127.0.0.1", 6881).unwrap());
        runtime.routing().lock().await.add(known).unwrap();
        assert_eq!(runtime.routing().lock().await.peer_count(), 1);

        dispatch_one(&runtime, &sender, b"garbage", addr).await;
        assert_eq!(runtime.routing().lock().await.peer_count(), 0);
    }

    #[tokio::test]
    async fn well_formed_ping_query_does_not_error() {
        let runtime = make_runtime().await;
        let sender = Sender::new(runtime.clone());
        let frame = Frame::ping_query(b"aa".to_vec(), [7u8; 20]);
        let bytes = frame.encode().unwrap();
        dispatch_one(&runtime, &sender, &bytes, "127.0.0.1:6881".parse().unwrap()).await;
    }
}
