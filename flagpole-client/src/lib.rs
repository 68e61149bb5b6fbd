//! HTTP flag source for flagpole.
//!
//! Implements one fetch-and-decode cycle against a remote compute endpoint's
//! feature-flag resource.

mod http;

pub use http::{ClientConfig, HttpFlagSource};
