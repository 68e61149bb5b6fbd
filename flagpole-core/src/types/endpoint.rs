//! Concrete endpoint identity.

use serde::{Deserialize, Serialize};

use crate::traits::EndpointIdentity;

/// A fixed endpoint identity described by its key and host.
///
/// Hosts that wrap a richer connection object can implement
/// [`EndpointIdentity`] on it directly; this type covers the common case of
/// a known key/host pair and is what the tests use.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticEndpoint {
    /// Stable unique key for registry sharing.
    pub key: String,
    /// Reachable host name.
    pub host: String,
}

impl StaticEndpoint {
    /// Creates an endpoint identity from key and host.
    pub fn new(key: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            host: host.into(),
        }
    }
}

impl EndpointIdentity for StaticEndpoint {
    fn endpoint_key(&self) -> &str {
        &self.key
    }

    fn host(&self) -> &str {
        &self.host
    }
}
