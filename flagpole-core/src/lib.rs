//! # Flagpole Core
//!
//! Core types, errors, and traits for the flagpole remote feature-flag cache.
//!
//! This crate provides the foundational building blocks used by the other
//! flagpole crates:
//!
//! - **Types**: the wire payload, the immutable flag snapshot, endpoint identity
//! - **Errors**: error taxonomy for fetch-and-decode cycles
//! - **Constants**: default refresh interval, resource path, shutdown grace
//! - **Traits**: collaborator interfaces (identity, authenticator, flag source)
//!
//! ## Example
//!
//! ```rust
//! use flagpole_core::{FlagPayload, FlagSnapshot};
//!
//! let payload: FlagPayload =
//!     serde_json::from_str(r#"{"flags":[{"name":"a","value":"true"}]}"#).unwrap();
//! let snapshot = FlagSnapshot::from(payload);
//! assert!(snapshot.is_enabled("a"));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{FlagError, Result};
pub use traits::*;
pub use types::*;
