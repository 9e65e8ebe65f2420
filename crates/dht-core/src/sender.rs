//! The `Sender` capability: everything handlers and the driver use to issue
//! outbound KRPC queries (spec §4.9)
//!
//! Each `send_*` call allocates a transaction id from the
//! [`TransactionRegistry`](crate::krpc::TransactionRegistry), builds the
//! matching query frame, and transmits it. A transmit failure is logged and
//! swallowed here — there is no retry at this layer, per spec.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use crate::error::DhtError;
use crate::krpc::{Frame, QueryType, RequestContext};
use crate::node::Node;
use crate::node_id::NodeId;
use crate::runtime::DhtRuntime;

/// Resolve a [`Node`]'s endpoint to a concrete `SocketAddr`
///
/// # Errors
///
/// Returns [`DhtError::InvalidEndpoint`] if the node's endpoint is not an
/// IPv4 address (the wire protocol is IPv4-only, so this should not occur
/// for nodes learned from compact records).
pub fn socket_addr_of(node: &Node) -> Result<SocketAddr, DhtError> {
    let ip: Ipv4Addr = node
        .endpoint()
        .addr()
        .parse()
        .map_err(|_| DhtError::InvalidEndpoint(node.endpoint().addr().to_string()))?;
    Ok(SocketAddr::V4(std::net::SocketAddrV4::new(
        ip,
        node.endpoint().port(),
    )))
}

/// Outbound-query capability bound to one runtime
#[derive(Clone)]
pub struct Sender {
    runtime: Arc<DhtRuntime>,
}

impl Sender {
    /// Build a sender over `runtime`
    #[must_use]
    pub fn new(runtime: Arc<DhtRuntime>) -> Self {
        Self { runtime }
    }

    async fn register(
        &self,
        addr: SocketAddr,
        query_type: QueryType,
        info_hash: Option<[u8; 20]>,
    ) -> Result<Vec<u8>, DhtError> {
        let ctx = RequestContext {
            query_type,
            target_addr: addr.ip().to_string(),
            target_port: addr.port(),
            info_hash,
        };
        let tid = self.runtime.registry().lock().await.create(ctx)?;
        Ok(tid.into_bytes())
    }

    /// Transmit `frame` to `addr`, logging and swallowing any send failure
    pub async fn send_to(&self, addr: SocketAddr, frame: &Frame) -> Result<(), DhtError> {
        if let Err(e) = self.runtime.send_frame(addr, frame).await {
            tracing::warn!("send to {addr} failed: {e}");
        }
        Ok(())
    }

    /// Reply to an incoming query with a KRPC error
    pub async fn reply_error(
        &self,
        addr: SocketAddr,
        tid: Vec<u8>,
        code: i64,
        message: impl Into<String>,
    ) -> Result<(), DhtError> {
        self.send_to(addr, &Frame::error_response(tid, code, message))
            .await
    }

    /// Issue a `ping` query
    pub async fn send_ping(&self, addr: SocketAddr) -> Result<(), DhtError> {
        let local_id = *self.runtime.local_id().as_bytes();
        let tid = self.register(addr, QueryType::Ping, None).await?;
        self.send_to(addr, &Frame::ping_query(tid, local_id)).await
    }

    /// Ping a bootstrap endpoint — identical to [`Self::send_ping`], named
    /// separately per spec §4.9 since it is issued by the driver rather
    /// than a handler reacting to traffic.
    pub async fn send_ping_bootstrap(&self, addr: SocketAddr) -> Result<(), DhtError> {
        self.send_ping(addr).await
    }

    /// Issue a `find_node` query toward `target`
    pub async fn send_find_node(&self, addr: SocketAddr, target: NodeId) -> Result<(), DhtError> {
        let local_id = *self.runtime.local_id().as_bytes();
        let target_bytes = *target.as_bytes();
        let tid = self.register(addr, QueryType::FindNode, None).await?;
        self.send_to(addr, &Frame::find_node_query(tid, local_id, target_bytes))
            .await
    }

    /// Issue a `get_peers` query to `node` for `info_hash`
    pub async fn send_get_peers(&self, node: &Node, info_hash: [u8; 20]) -> Result<(), DhtError> {
        let addr = socket_addr_of(node)?;
        let local_id = *self.runtime.local_id().as_bytes();
        let tid = self.register(addr, QueryType::GetPeers, Some(info_hash)).await?;
        self.send_to(addr, &Frame::get_peers_query(tid, local_id, info_hash))
            .await
    }

    /// Issue an `announce_peer` query to `node`
    pub async fn send_announce_peer(
        &self,
        node: &Node,
        info_hash: [u8; 20],
        port: u16,
        implied_port: bool,
        token: Vec<u8>,
    ) -> Result<(), DhtError> {
        let addr = socket_addr_of(node)?;
        let local_id = *self.runtime.local_id().as_bytes();
        let tid = self
            .register(addr, QueryType::AnnouncePeer, Some(info_hash))
            .await?;
        self.send_to(
            addr,
            &Frame::announce_peer_query(tid, local_id, info_hash, port, implied_port, token),
        )
        .await
    }
}
