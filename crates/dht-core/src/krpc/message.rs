//! Bencoded KRPC wire frames (BEP-5)
//!
//! A [`Frame`] is the one wire shape for all three message kinds (`query`,
//! `response`, `error`) — which keys are populated depends on `y`. This
//! mirrors the protocol itself: a bencoded dictionary with a handful of
//! top-level keys, not a neatly tagged union, so the typed surface here
//! follows the wire shape rather than fighting it with enum tricks.

use crate::error::DhtError;
use serde::{Deserialize, Serialize};

/// Generic server error
pub const ERR_GENERIC: i64 = 201;
/// Server failed to process the query
pub const ERR_SERVER: i64 = 202;
/// Malformed packet, invalid arguments, or bad token
pub const ERR_PROTOCOL: i64 = 203;
/// Unknown query method
pub const ERR_METHOD_UNKNOWN: i64 = 204;

/// A decoded (or to-be-encoded) KRPC message
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Frame {
    /// Transaction id
    #[serde(rename = "t", with = "serde_bytes")]
    pub tid: Vec<u8>,
    /// Message type: `"q"`, `"r"`, or `"e"`
    pub y: String,
    /// Query method name, present only when `y == "q"`
    #[serde(rename = "q", default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    /// Query arguments, present only when `y == "q"`
    #[serde(rename = "a", default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Args>,
    /// Response values, present only when `y == "r"`
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Reply>,
    /// `[code, message]`, present only when `y == "e"`
    #[serde(rename = "e", default, skip_serializing_if = "Option::is_none")]
    pub error: Option<(i64, String)>,
}

/// The `a` dictionary of a query
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Args {
    /// Querying node's id
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    /// `find_node` lookup target
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub target: Option<Vec<u8>>,
    /// `get_peers` / `announce_peer` content identifier
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub info_hash: Option<Vec<u8>>,
    /// `announce_peer` advertised port
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// `announce_peer`: use the source port instead of `port` when `1`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implied_port: Option<u8>,
    /// `announce_peer` token, echoing a prior `get_peers` response
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub token: Option<Vec<u8>>,
}

/// The `r` dictionary of a response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Reply {
    /// Responding node's id
    #[serde(with = "serde_bytes")]
    pub id: Vec<u8>,
    /// Concatenated compact node records, a multiple of 26 bytes
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub nodes: Option<Vec<u8>>,
    /// `get_peers` opaque token
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_bytes")]
    pub token: Option<Vec<u8>>,
    /// `get_peers` compact peer records, each exactly 6 bytes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_bytes::ByteBuf>>,
}

impl Frame {
    /// Encode to bencoded bytes
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::Codec`] on encode failure.
    pub fn encode(&self) -> Result<Vec<u8>, DhtError> {
        Ok(serde_bencode::to_bytes(self)?)
    }

    /// Decode a bencoded KRPC frame
    ///
    /// Per spec, a missing `t` or `y` key (or any other malformed shape)
    /// is indistinguishable from any other decode failure: the caller
    /// drops the datagram either way.
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::Codec`] on decode failure.
    pub fn decode(bytes: &[u8]) -> Result<Self, DhtError> {
        Ok(serde_bencode::from_bytes(bytes)?)
    }

    /// The transaction id as a string, coercing from raw bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::krpc::message::Frame;
    ///
    /// let frame = Frame::ping_query(b"aa".to_vec(), [1u8; 20]);
    /// assert_eq!(frame.tid_string(), "aa");
    /// ```
    #[must_use]
    pub fn tid_string(&self) -> String {
        String::from_utf8_lossy(&self.tid).into_owned()
    }

    /// Build a `ping` query
    #[must_use]
    pub fn ping_query(tid: Vec<u8>, local_id: [u8; 20]) -> Self {
        Self {
            tid,
            y: "q".into(),
            query: Some("ping".into()),
            args: Some(Args {
                id: local_id.to_vec(),
                ..Default::default()
            }),
            reply: None,
            error: None,
        }
    }

    /// Build a `find_node` query
    #[must_use]
    pub fn find_node_query(tid: Vec<u8>, local_id: [u8; 20], target: [u8; 20]) -> Self {
        Self {
            tid,
            y: "q".into(),
            query: Some("find_node".into()),
            args: Some(Args {
                id: local_id.to_vec(),
                target: Some(target.to_vec()),
                ..Default::default()
            }),
            reply: None,
            error: None,
        }
    }

    /// Build a `get_peers` query
    #[must_use]
    pub fn get_peers_query(tid: Vec<u8>, local_id: [u8; 20], info_hash: [u8; 20]) -> Self {
        Self {
            tid,
            y: "q".into(),
            query: Some("get_peers".into()),
            args: Some(Args {
                id: local_id.to_vec(),
                info_hash: Some(info_hash.to_vec()),
                ..Default::default()
            }),
            reply: None,
            error: None,
        }
    }

    /// Build an `announce_peer` query
    #[must_use]
    pub fn announce_peer_query(
        tid: Vec<u8>,
        local_id: [u8; 20],
        info_hash: [u8; 20],
        port: u16,
        implied_port: bool,
        token: Vec<u8>,
    ) -> Self {
        Self {
            tid,
            y: "q".into(),
            query: Some("announce_peer".into()),
            args: Some(Args {
                id: local_id.to_vec(),
                info_hash: Some(info_hash.to_vec()),
                port: Some(port),
                implied_port: Some(u8::from(implied_port)),
                token: Some(token),
            }),
            reply: None,
            error: None,
        }
    }

    /// Build a `ping`/`announce_peer` response, which carries only `id`
    #[must_use]
    pub fn id_only_response(tid: Vec<u8>, local_id: [u8; 20]) -> Self {
        Self {
            tid,
            y: "r".into(),
            reply: Some(Reply {
                id: local_id.to_vec(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build a `find_node` response, or a `get_peers` response's nodes branch
    #[must_use]
    pub fn nodes_response(tid: Vec<u8>, local_id: [u8; 20], nodes: Vec<u8>) -> Self {
        Self {
            tid,
            y: "r".into(),
            reply: Some(Reply {
                id: local_id.to_vec(),
                nodes: Some(nodes),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build a `get_peers` response's values branch
    #[must_use]
    pub fn values_response(
        tid: Vec<u8>,
        local_id: [u8; 20],
        token: Vec<u8>,
        values: Vec<Vec<u8>>,
    ) -> Self {
        Self {
            tid,
            y: "r".into(),
            reply: Some(Reply {
                id: local_id.to_vec(),
                token: Some(token),
                values: Some(values.into_iter().map(serde_bytes::ByteBuf::from).collect()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Build a KRPC error reply
    #[must_use]
    pub fn error_response(tid: Vec<u8>, code: i64, message: impl Into<String>) -> Self {
        Self {
            tid,
            y: "e".into(),
            error: Some((code, message.into())),
            ..Default::default()
        }
    }
}
