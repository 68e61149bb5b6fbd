//! Shared feature-flag contexts for flagpole.
//!
//! A [`FlagContext`] couples one snapshot store, one flag source, and one
//! background poller that refreshes the snapshot at a server-dictated
//! interval. A [`FlagRegistry`] hands out exactly one context per endpoint
//! identity, reference-counted so teardown happens exactly once, when the
//! last caller releases it.

mod context;
mod registry;

pub use context::{FlagContext, RefreshPolicy};
pub use registry::{FlagRegistry, SourceFactory};
