//! Blockchain node endpoint identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a blockchain node peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeEndpoint {
    pub ip: String,
    pub port: u16,
    /// Node public key, when the transport exposes one.
    pub public_key: Option<String>,
}

impl NodeEndpoint {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self {
            ip: ip.into(),
            port,
            public_key: None,
        }
    }
}

impl fmt::Display for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let endpoint = NodeEndpoint::new("10.0.0.7", 30303);
        assert_eq!(endpoint.to_string(), "10.0.0.7:30303");
    }
}
