//! Network endpoints: validated `(addr, port)` pairs and their compact codec
//!
//! An [`Endpoint`] classifies its address as IPv4 or domain at construction
//! time, rejecting anything else. Only IPv4 endpoints have a compact wire
//! encoding — the KRPC frame (spec §4.4) is IPv4-only.

use crate::error::DhtError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Classification of an [`Endpoint`]'s address
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddrType {
    /// Dotted-quad IPv4 address
    Ipv4,
    /// A domain name (e.g. a bootstrap hostname)
    Domain,
}

/// A validated `(addr, port)` pair
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    addr: String,
    port: u16,
    addr_type: AddrType,
}

impl Endpoint {
    /// Construct an endpoint, classifying and validating `addr`
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::InvalidEndpoint`] if `addr` is neither a valid
    /// IPv4 dotted-quad nor a syntactically valid domain name.
    ///
    /// # Examples
    ///
    /// ```
    /// use mdht_core::endpoint::Endpoint;
    ///
    /// let ep = Endpoint::new("127.0.0.1", 6881).unwrap();
    /// assert!(ep.is_ipv4());
    ///
    /// let ep = Endpoint::new("router.bittorrent.com", 6881).unwrap();
    /// assert!(!ep.is_ipv4());
    /// ```
    pub fn new(addr: impl Into<String>, port: u16) -> Result<Self, DhtError> {
        let addr = addr.into();
        let addr_type = if addr.parse::<Ipv4Addr>().is_ok() {
            AddrType::Ipv4
        } else if is_valid_domain(&addr) {
            AddrType::Domain
        } else {
            return Err(DhtError::InvalidEndpoint(addr));
        };
        Ok(Self {
            addr,
            port,
            addr_type,
        })
    }

    /// The textual address (dotted-quad or domain name)
    #[must_use]
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// The UDP port
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// The address's classification
    #[must_use]
    pub const fn addr_type(&self) -> AddrType {
        self.addr_type
    }

    /// Whether this endpoint's address is an IPv4 dotted-quad
    #[must_use]
    pub const fn is_ipv4(&self) -> bool {
        matches!(self.addr_type, AddrType::Ipv4)
    }

    /// Encode as the 6-byte compact peer format: 4 bytes IPv4 + 2 bytes
    /// big-endian port
    ///
    /// # Errors
    ///
    /// Returns [`DhtError::InvalidEndpoint`] if this endpoint is a domain
    /// name rather than an IPv4 address.
    pub fn to_compact(&self) -> Result<[u8; 6], DhtError> {
        let ip: Ipv4Addr = self
            .addr
            .parse()
            .map_err(|_| DhtError::InvalidEndpoint(self.addr.clone()))?;
        let mut out = [0u8; 6];
        out[..4].copy_from_slice(&ip.octets());
        out[4..].copy_from_slice(&self.port.to_be_bytes());
        Ok(out)
    }

    /// Decode a 6-byte compact peer record into an IPv4 endpoint
    #[must_use]
    pub fn from_compact(bytes: &[u8; 6]) -> Self {
        let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
        let port = u16::from_be_bytes([bytes[4], bytes[5]]);
        Self {
            addr: ip.to_string(),
            port,
            addr_type: AddrType::Ipv4,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.port)
    }
}

/// Minimal domain-name syntax check: dot-separated labels, each 1-63
/// characters of alphanumerics/hyphens, no leading or trailing hyphen.
fn is_valid_domain(addr: &str) -> bool {
    if addr.is_empty() || addr.len() > 253 {
        return false;
    }
    addr.split('.').all(|label| {
        !label.is_empty()
            && label.len() <= 63
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    })
}
