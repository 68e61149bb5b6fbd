//! Collaborator traits for flagpole.
//!
//! These traits define the interfaces the cache core needs from its host:
//! who the endpoint is, how to authenticate against it, and how to fetch one
//! flag payload. Keeping them as traits lets tests substitute deterministic
//! implementations for the network.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::FlagPayload;

/// A request header as (name, value).
pub type Header = (String, String);

/// Identity of one remote compute endpoint.
///
/// The key is the sharing key for the registry: every caller presenting the
/// same key shares one context. The host is where the flag resource lives.
pub trait EndpointIdentity: Send + Sync {
    /// Stable unique key identifying this endpoint.
    fn endpoint_key(&self) -> &str;

    /// Reachable host name of the endpoint.
    fn host(&self) -> &str;
}

/// Produces the authentication headers for one request.
///
/// Called once per refresh cycle so rotated tokens are picked up without any
/// coordination with the scheduler.
#[async_trait]
pub trait RequestAuthenticator: Send + Sync {
    /// Returns the headers to attach to the next request.
    async fn headers(&self) -> Result<Vec<Header>>;
}

/// A fixed set of headers, for endpoints with static credentials and for tests.
#[derive(Clone, Debug, Default)]
pub struct StaticHeaders(pub Vec<Header>);

#[async_trait]
impl RequestAuthenticator for StaticHeaders {
    async fn headers(&self) -> Result<Vec<Header>> {
        Ok(self.0.clone())
    }
}

/// Performs one fetch-and-decode cycle against a flag endpoint.
///
/// Implementations might use:
/// - HTTP against a live endpoint (production)
/// - Canned payloads or failure scripts (testing)
#[async_trait]
pub trait FlagSource: Send + Sync {
    /// Fetches the complete current flag payload.
    async fn fetch(&self) -> Result<FlagPayload>;
}
