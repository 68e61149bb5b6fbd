//! Snapshot store for flagpole.
//!
//! Thread-safe holder of the current flag snapshot, replaced wholesale on
//! each successful refresh.

mod store;

pub use store::SnapshotStore;
