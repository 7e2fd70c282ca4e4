//! # Native Lifecycle
//!
//! Lifetime management for **native resources**: objects whose real state
//! lives outside the Rust heap (GPU buffers, textures, views, device memory)
//! and whose destruction must happen exactly once, in dependency order.
//!
//! ## Design Goals
//! - Exactly-once destruction, even under concurrent `destroy` calls
//! - Dependents destroyed before the resource they depend on
//! - Ownership-driven cleanup (`Drop`) with an explicit shutdown sweep
//! - Deduplicated construction of equivalent resources through a keyed cache
//!
//! ## Building blocks
//! - [`Reference`]: destruction state plus the dependents that cascade with it
//! - [`NativeResource`] / [`Tracked`]: the capability a native owner implements,
//!   and the owning wrapper returned by registration
//! - [`LifecycleManager`]: registry of References with a `clear()` sweep
//! - [`KeyedCache`]: single build per key, idle-based eviction
//! - [`ResourceBuilder`]: the construction pattern tying the two together
//!
//! The optional `gpu` feature provides wgpu-backed buffers, textures and
//! texture views built on top of these pieces.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![allow(clippy::module_inception)]

pub mod lifecycle;

#[cfg(feature = "gpu")]
pub mod gpu;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports (Public API)
// ─────────────────────────────────────────────────────────────────────────────

pub use lifecycle::reference::{
    DestroyAction,
    Reference,
};

pub use lifecycle::resource::{
    NativeResource,
    Tracked,
};

pub use lifecycle::manager::LifecycleManager;

pub use lifecycle::cache::{
    Allocation,
    CacheConfig,
    CacheStats,
    KeyedCache,
};

pub use lifecycle::builder::ResourceBuilder;

pub use lifecycle::global;

pub use lifecycle::error::{
    DestroyedResourceError,
    LifecycleError,
    LifecycleResult,
    NativeAllocationError,
};

pub use lifecycle::types::{
    ReferenceID,
    DEFAULT_IDLE_TIMEOUT,
};

// ─────────────────────────────────────────────────────────────────────────────
// Prelude
// ─────────────────────────────────────────────────────────────────────────────

/// Commonly used lifecycle types.
///
/// Import with:
/// ```rust
/// use native_lifecycle::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Allocation,
        CacheConfig,
        DestroyAction,
        KeyedCache,
        LifecycleManager,
        LifecycleResult,
        NativeResource,
        Reference,
        ResourceBuilder,
        Tracked,
    };
}
