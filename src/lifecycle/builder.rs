//! Builder collaborator pattern.
//!
//! Higher-level factories (buffer builders, texture builders, pipeline
//! builders) all follow the same shape:
//!
//! 1. **instantiate** a cheap target instance describing what to build,
//! 2. optionally route it through a [`KeyedCache`] with the expensive native
//!    construction as the build side effect,
//! 3. return the (possibly cached) instance.
//!
//! Implementing [`ResourceBuilder`] gives a factory caching and lifecycle
//! tracking through the provided [`ResourceBuilder::build`].

use std::hash::Hash;

use crate::lifecycle::cache::KeyedCache;
use crate::lifecycle::error::LifecycleResult;
use crate::lifecycle::manager::LifecycleManager;

/// Factory for targets that own native resources.
///
/// `construct` is expected to create the native object, register it with the
/// supplied manager, and link any dependency References. It runs once per
/// cache key while the entry lives.

pub trait ResourceBuilder {
    /// Cache key identifying equivalent targets.
    type Key: Eq + Hash + Clone;

    /// Built target, usually an `Arc` around a resource wrapper.
    type Target: Clone;

    /// Produces a target instance without touching the native layer.
    fn instantiate(&self) -> Self::Target;

    /// Performs the native construction for `target`.
    fn construct(&self, manager: &LifecycleManager, target: &Self::Target) -> LifecycleResult<()>;

    /// Instantiates a target and constructs it, deduplicating through `cache`
    /// when one is supplied.
    ///
    /// ## Semantics
    /// * Without a cache the target is always constructed.
    /// * With a cache, a hit returns the cached target and skips `construct`;
    ///   a failed `construct` leaves no entry behind.
    ///
    /// ## Concurrency
    /// A hit does not wait for a `construct` still running on another
    /// thread. Such a caller gets `Ok` with the shared target before its
    /// native object exists, and if that `construct` then fails, the target
    /// is never constructed and no longer cached. Targets should expose
    /// their native side as optional (the GPU targets return `None` from
    /// `buffer()` / `texture()` until constructed), and callers needing the
    /// built state must check it or serialize on the key.

    fn build(
        &self,
        manager: &LifecycleManager,
        cache: Option<&KeyedCache<Self::Key, Self::Target>>,
    ) -> LifecycleResult<Self::Target> {
        let target = self.instantiate();
        match cache {
            Some(cache) => cache
                .try_allocate(target, |target| self.construct(manager, target))
                .map(|allocation| allocation.into_inner()),
            None => {
                self.construct(manager, &target)?;
                Ok(target)
            }
        }
    }
}
