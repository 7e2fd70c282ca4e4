//! Lifecycle manager: registration and bulk teardown of native resources.
//!
//! The manager is the single place where native resources enter the
//! lifecycle system. Registering a resource:
//!
//! * asks it once for its [`DestroyAction`],
//! * wraps that action in a fresh [`Reference`] with a new unique id,
//! * records the Reference in a concurrent registry keyed by id,
//! * returns a [`Tracked`] wrapper whose `Drop` destroys the Reference.
//!
//! ## Registry
//!
//! Entries are **not** removed when a Reference is destroyed individually; a
//! destroyed Reference is inert and stays registered until [`clear`]. The
//! registry exists for deterministic shutdown and diagnostics only.
//!
//! ## Concurrency
//!
//! The registry is a sharded `DashMap`; registration and lookup never take a
//! global lock. `clear` snapshots the ids present when it starts and removes
//! them one by one, so resources registered concurrently are either destroyed
//! by that sweep or left registered, never dropped from the registry without
//! being destroyed.
//!
//! ## Dependency injection
//!
//! Every API in this crate takes `&LifecycleManager`; tests construct their
//! own isolated instance. A process-wide default lives in
//! [`global`](crate::global) for top-level wiring.
//!
//! [`clear`]: LifecycleManager::clear

use dashmap::DashMap;

use crate::lifecycle::reference::{DestroyAction, Reference};
use crate::lifecycle::resource::{NativeResource, Tracked};
use crate::lifecycle::types::ReferenceID;

/// Registry of native resource References with an explicit teardown sweep.
///
/// Dropping the manager runs [`clear`](LifecycleManager::clear).

#[derive(Debug, Default)]
pub struct LifecycleManager {
    registry: DashMap<ReferenceID, Reference>,
}

impl LifecycleManager {

    /// Creates an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` and returns its owning wrapper.
    ///
    /// ## Behavior
    /// * Calls [`NativeResource::create_destroy_action`] exactly once.
    /// * The action runs when the wrapper is dropped, when the Reference (or
    ///   an ancestor it depends on) is destroyed, or during [`clear`].
    ///
    /// [`clear`]: LifecycleManager::clear

    pub fn register<R: NativeResource>(&self, resource: R) -> Tracked<R> {
        let reference = self.register_action(resource.create_destroy_action());
        Tracked::new(resource, reference)
    }

    /// Registers a bare destroy action and returns its Reference.
    ///
    /// Unlike [`register`](LifecycleManager::register) nothing destroys the
    /// Reference automatically; the caller owns that responsibility (or
    /// relies on [`clear`](LifecycleManager::clear)).

    pub fn register_action(&self, action: DestroyAction) -> Reference {
        let reference = Reference::new(action);
        self.registry.insert(reference.id(), reference.clone());
        log::debug!("registered reference {}", reference.id());
        reference
    }

    /// Returns the registered Reference with `id`, if any.
    pub fn get(&self, id: ReferenceID) -> Option<Reference> {
        self.registry.get(&id).map(|entry| entry.value().clone())
    }

    /// Destroys the registered Reference with `id` (and its dependents).
    ///
    /// Returns `false` if no Reference with that id is registered. The
    /// Reference stays registered until [`clear`](LifecycleManager::clear).

    pub fn destroy(&self, id: ReferenceID) -> bool {
        match self.get(id) {
            Some(reference) => {
                reference.destroy();
                true
            }
            None => false,
        }
    }

    /// Number of registered References, destroyed or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.registry.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }

    /// Number of registered References that are still active.
    pub fn active_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|entry| !entry.value().is_destroyed())
            .count()
    }

    /// Destroys every registered Reference and empties the registry.
    ///
    /// ## Semantics
    /// * Synchronous and deterministic; runs on the calling thread.
    /// * References are visited in reverse registration order, so resources
    ///   are released in the reverse order of their creation. Each visit uses
    ///   the regular cascade, so overlapping dependency edges never run an
    ///   action twice.
    /// * Calling `clear` on an empty manager is a no-op.

    pub fn clear(&self) {
        let mut ids: Vec<ReferenceID> = self.registry.iter().map(|entry| *entry.key()).collect();
        if ids.is_empty() {
            return;
        }
        ids.sort_unstable_by(|a, b| b.cmp(a));

        let mut removed = 0usize;
        for id in ids {
            if let Some((_, reference)) = self.registry.remove(&id) {
                reference.destroy();
                removed += 1;
            }
        }

        log::debug!("lifecycle manager cleared ({removed} reference(s) removed)");
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.clear();
    }
}
