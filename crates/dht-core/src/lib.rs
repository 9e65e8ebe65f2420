//! Core Kademlia routing table, KRPC protocol engine, and info-hash store
//! for a Mainline BitTorrent DHT node.
//!
//! This crate has no network entry point of its own beyond
//! [`runtime::DhtRuntime`] and [`dispatcher::run`]; wiring up a long-running
//! process (configuration, bootstrap, periodic maintenance) is the job of
//! the `mdht-cli` binary crate.

pub mod bucket;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod handlers;
pub mod krpc;
pub mod node;
pub mod node_id;
pub mod routing;
pub mod runtime;
pub mod sender;
pub mod store;

pub use bucket::Bucket;
pub use endpoint::Endpoint;
pub use error::{DhtError, Result};
pub use node::Node;
pub use node_id::NodeId;
pub use routing::RoutingTable;
pub use runtime::DhtRuntime;
pub use sender::Sender;
pub use store::InfoHashStore;
