//! Client identity used to key rate limit windows.

use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// An opaque identifier a limit is tracked per.
///
/// Typically a network address or an API token. The limiter never inspects
/// the contents, it only hashes and compares them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientKey(String);

impl ClientKey {
    /// Create a key from any string-like identity.
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientKey {
    fn from(identity: &str) -> Self {
        Self::new(identity)
    }
}

impl From<String> for ClientKey {
    fn from(identity: String) -> Self {
        Self(identity)
    }
}

impl From<IpAddr> for ClientKey {
    fn from(addr: IpAddr) -> Self {
        Self(addr.to_string())
    }
}

/// Only the IP is kept; the ephemeral port would give every connection its own window.
impl From<SocketAddr> for ClientKey {
    fn from(addr: SocketAddr) -> Self {
        Self::from(addr.ip())
    }
}

impl AsRef<str> for ClientKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
