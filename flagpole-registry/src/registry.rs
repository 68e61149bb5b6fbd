//! Reference-counted directory of shared flag contexts.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, instrument};

use flagpole_core::traits::{EndpointIdentity, FlagSource};

use crate::context::FlagContext;

/// Builds the flag source for one endpoint identity.
pub type SourceFactory = dyn Fn(&dyn EndpointIdentity) -> Arc<dyn FlagSource> + Send + Sync;

/// A context that may still be priming. Cloning shares the one underlying
/// construction; every awaiter resolves to the same context.
type ContextFuture = Shared<BoxFuture<'static, Arc<FlagContext>>>;

struct RegistryEntry {
    context: ContextFuture,
    refs: usize,
}

/// Directory mapping endpoint identity to exactly one live [`FlagContext`].
///
/// An explicit, constructible object: the host application creates one,
/// scopes its lifetime, and injects it into every consumer. Contexts are
/// shared by reference count; the context is constructed (and primed) on
/// first acquire for a key and shut down exactly when the last reference is
/// released.
///
/// # Thread Safety
///
/// The map lock is never held across an await. A first-reference `acquire`
/// installs a shared priming future under the lock and awaits it outside,
/// so concurrent acquires for that key share exactly one construction and
/// one priming fetch, while acquires for other keys and every `release`
/// proceed without waiting behind a slow prime.
pub struct FlagRegistry {
    factory: Box<SourceFactory>,
    entries: Mutex<HashMap<String, RegistryEntry>>,
}

impl FlagRegistry {
    /// Creates a registry that builds flag sources with `factory`.
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(&dyn EndpointIdentity) -> Arc<dyn FlagSource> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the shared context for `endpoint`, creating and priming it on
    /// first reference.
    ///
    /// Awaits the priming fetch only when the context for this key is not
    /// ready yet; acquiring an existing context just bumps its reference
    /// count and resolves immediately.
    #[instrument(skip(self, endpoint), fields(key = endpoint.endpoint_key()))]
    pub async fn acquire(&self, endpoint: &dyn EndpointIdentity) -> Arc<FlagContext> {
        let pending = {
            let mut entries = self.entries.lock();
            if let Some(entry) = entries.get_mut(endpoint.endpoint_key()) {
                entry.refs += 1;
                debug!(refs = entry.refs, "Sharing existing flag context");
                entry.context.clone()
            } else {
                // First reference: install the priming future under the map
                // lock so concurrent acquires for this key observe exactly
                // one context and one priming fetch, then await it outside
                // the lock so other keys are never held up behind it.
                let source = (self.factory)(endpoint);
                let pending = FlagContext::start(source).boxed().shared();
                entries.insert(
                    endpoint.endpoint_key().to_string(),
                    RegistryEntry {
                        context: pending.clone(),
                        refs: 1,
                    },
                );
                debug!("Created flag context");
                pending
            }
        };
        pending.await
    }

    /// Drops one reference to the context for `endpoint`.
    ///
    /// When the count reaches zero the entry is removed and the context shut
    /// down. Releasing a key that is not present (never acquired, or already
    /// released to zero) is a no-op, never an error.
    #[instrument(skip(self, endpoint), fields(key = endpoint.endpoint_key()))]
    pub async fn release(&self, endpoint: &dyn EndpointIdentity) {
        let torn_down = {
            let mut entries = self.entries.lock();
            match entries.get_mut(endpoint.endpoint_key()) {
                Some(entry) => {
                    entry.refs -= 1;
                    if entry.refs == 0 {
                        // Removed in the same atomic step as the decrement;
                        // the shutdown itself runs outside the map lock.
                        entries.remove(endpoint.endpoint_key()).map(|e| e.context)
                    } else {
                        debug!(refs = entry.refs, "Released flag context reference");
                        None
                    }
                }
                None => {
                    debug!("Release of unknown endpoint ignored");
                    None
                }
            }
        };

        if let Some(pending) = torn_down {
            // The context may still be priming; teardown waits for that so
            // shutdown runs exactly once, on the live context.
            pending.await.shutdown().await;
            debug!("Flag context shut down");
        }
    }

    /// Installs a preloaded context under `endpoint_key` with one reference.
    ///
    /// Test seam: combined with [`FlagContext::with_snapshot`] this lets
    /// tests run consumers against a known flag set with no network at all.
    /// Installing over a live key replaces it; the displaced context is shut
    /// down.
    pub async fn install(&self, endpoint_key: impl Into<String>, context: Arc<FlagContext>) {
        let displaced = {
            let mut entries = self.entries.lock();
            entries.insert(
                endpoint_key.into(),
                RegistryEntry {
                    context: futures::future::ready(context).boxed().shared(),
                    refs: 1,
                },
            )
        };
        if let Some(entry) = displaced {
            entry.context.await.shutdown().await;
        }
    }

    /// Returns the current reference count for `endpoint_key`, if present.
    pub fn ref_count(&self, endpoint_key: &str) -> Option<usize> {
        self.entries.lock().get(endpoint_key).map(|e| e.refs)
    }

    /// Returns the number of live contexts.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no contexts are live.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for FlagRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlagRegistry").finish_non_exhaustive()
    }
}
