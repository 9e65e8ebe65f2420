//! The KRPC protocol engine: bencoded wire frames and transaction tracking

pub mod message;
pub mod transaction;

pub use message::{Args, Frame, Reply, ERR_GENERIC, ERR_METHOD_UNKNOWN, ERR_PROTOCOL, ERR_SERVER};
pub use transaction::{QueryType, RequestContext, TransactionRegistry};
