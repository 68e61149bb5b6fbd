//! In-memory snapshot store.

use std::sync::Arc;

use parking_lot::RwLock;

use flagpole_core::types::FlagSnapshot;

/// Thread-safe holder of the currently installed [`FlagSnapshot`].
///
/// Reads never block on a refresh in progress: a refresh builds a complete
/// new snapshot off to the side and [`replace`](Self::replace) swaps the
/// `Arc` in one step, so concurrent readers observe either the old snapshot
/// or the new one, never an intermediate empty state.
///
/// # Thread Safety
///
/// Safe under arbitrary concurrent readers and a single concurrent writer
/// (the refresh scheduler is the only writer in practice, though nothing
/// here depends on that).
#[derive(Debug, Default)]
pub struct SnapshotStore {
    current: RwLock<Arc<FlagSnapshot>>,
}

impl SnapshotStore {
    /// Creates a store holding the empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store preloaded with the given snapshot.
    pub fn with_snapshot(snapshot: FlagSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Returns the raw value of a flag from the current snapshot.
    pub fn get(&self, name: &str) -> Option<String> {
        self.current.read().get(name).map(str::to_owned)
    }

    /// Returns true if the named flag is present and truthy in the current
    /// snapshot. Absence is disabled, never an error.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.current.read().is_enabled(name)
    }

    /// Atomically installs a new snapshot, discarding the old one whole.
    pub fn replace(&self, snapshot: FlagSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Returns a cheap handle to the current snapshot for bulk inspection.
    pub fn snapshot(&self) -> Arc<FlagSnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Returns the number of flags in the current snapshot.
    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    /// Returns true if the current snapshot holds no flags.
    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}
