//! Shared error type for the DHT core
//!
//! Every fallible operation in this crate returns `DhtError`. Handlers and
//! the dispatcher catch these at the event-loop boundary (spec §7); nothing
//! should need to introduce a second error type.

use thiserror::Error;

/// Errors produced by the DHT core
#[derive(Debug, Error)]
pub enum DhtError {
    /// Port outside `0..=65535` or `addr` not a valid IPv4 dotted-quad / domain name
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A node id, target, or info-hash was not exactly 20 bytes
    #[error("invalid 20-byte identifier")]
    InvalidId,

    /// A k-bucket is full and admission was attempted without an eviction path
    #[error("bucket is full")]
    BucketFull,

    /// Attempted to insert the local id into the routing table
    #[error("cannot insert local node into routing table")]
    SelfInsert,

    /// Bencode encode/decode failure
    #[error("bencode codec error: {0}")]
    Codec(#[from] serde_bencode::Error),

    /// `nodes` or `values` payload length was not a multiple of the expected record size
    #[error("malformed compact payload: length {0} is not a multiple of {1}")]
    MalformedCompact(usize, usize),

    /// The transaction registry has no free or reclaimable TID
    #[error("transaction registry exhausted")]
    RegistryExhausted,

    /// `InfoHashStore` rejected a write
    #[error("info-hash store rejected write: {0}")]
    StoreRejected(&'static str),

    /// Socket I/O failure
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the core
pub type Result<T> = std::result::Result<T, DhtError>;
