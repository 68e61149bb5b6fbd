//! Domain types for flagpole.
//!
//! - [`FlagPayload`]: the decoded wire payload of one server response
//! - [`FlagSnapshot`]: the complete, immutable flag mapping held at one instant
//! - [`StaticEndpoint`]: a simple concrete endpoint identity

mod endpoint;
mod flag;

pub use endpoint::*;
pub use flag::*;
