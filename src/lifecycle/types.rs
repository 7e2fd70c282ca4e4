//! Core identifiers and defaults shared by the lifecycle subsystems.
//!
//! ## Identifiers
//!
//! Every [`Reference`](crate::Reference) receives a [`ReferenceID`] drawn from
//! a single process-wide counter. Identifiers are:
//!
//! - unique for the lifetime of the process,
//! - monotonically increasing in allocation order,
//! - never reused, even after the owning reference is destroyed.
//!
//! Allocation order doubles as creation order, which the manager relies on to
//! tear References down in reverse.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Process-unique identifier of a [`Reference`](crate::Reference).
pub type ReferenceID = u64;

/// Default idle window after which an unused cache entry is evicted by
/// [`KeyedCache::flush`](crate::KeyedCache::flush).
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(2000);

static NEXT_REFERENCE_ID: AtomicU64 = AtomicU64::new(1);

/// Allocates the next reference identifier.
#[inline]
pub(crate) fn next_reference_id() -> ReferenceID {
    NEXT_REFERENCE_ID.fetch_add(1, Ordering::Relaxed)
}
