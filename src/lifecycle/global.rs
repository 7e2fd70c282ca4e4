//! # Default Lifecycle Manager
//!
//! A process-wide default [`LifecycleManager`] for top-level wiring.
//!
//! ## Purpose
//! Library code takes `&LifecycleManager` explicitly; this module only
//! provides a convenient default for application entry points that do not
//! want to thread a manager through by hand.
//!
//! ## Design
//! - The default is created lazily on first access.
//! - [`set_instance`] swaps the default and hands back the previous one.
//!   Existing registrations are **not** migrated: they remain in the manager
//!   they were registered with.
//! - Only one instance is current at a time.
//!
//! ## Concurrency
//! The current instance sits behind an `RwLock`; reads clone an `Arc` and
//! release the lock immediately, so no lock is held while the manager is
//! used.

use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::lifecycle::manager::LifecycleManager;

static INSTANCE: OnceLock<RwLock<Arc<LifecycleManager>>> = OnceLock::new();

fn slot() -> &'static RwLock<Arc<LifecycleManager>> {
    INSTANCE.get_or_init(|| RwLock::new(Arc::new(LifecycleManager::new())))
}

/// Returns the current default manager.
pub fn instance() -> Arc<LifecycleManager> {
    slot().read().clone()
}

/// Replaces the current default manager and returns the previous one.
///
/// ## Notes
/// The previous manager keeps its registrations. Dropping the returned
/// `Arc` (once no other clones remain) clears it.

pub fn set_instance(manager: Arc<LifecycleManager>) -> Arc<LifecycleManager> {
    let previous = std::mem::replace(&mut *slot().write(), manager);
    log::debug!("default lifecycle manager replaced");
    previous
}
