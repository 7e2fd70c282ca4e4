//! Error types for reference linking and native resource construction.
//!
//! This module declares the small set of failures the lifecycle layer can
//! surface. Each error carries enough context to make the failure actionable
//! while remaining cheap to pass around or convert into [`LifecycleError`].
//!
//! ## Taxonomy
//! * [`DestroyedResourceError`] — a dependent was linked to a Reference that
//!   has already been destroyed. This is a programming error in dependency
//!   ordering and is never retried internally.
//! * [`NativeAllocationError`] — a collaborator failed to create a native
//!   object. The core never interprets these; builders produce them and
//!   callers decide what to do.
//!
//! Double destroy and double clear are **not** errors: both are silent
//! no-ops. Cache hits and misses are both successful outcomes and are
//! distinguished by [`Allocation`](crate::Allocation), not by an error.
//!
//! ## Typical flow
//! ```ignore
//! fn link(parent: &Reference, child: &Reference) -> LifecycleResult<()> {
//!     parent.add_dependent(child)?; // DestroyedResourceError -> LifecycleError
//!     Ok(())
//! }
//! ```

use std::borrow::Cow;

use thiserror::Error;

use crate::lifecycle::types::ReferenceID;

/// Returned when a dependent is added to a Reference that is already
/// destroyed.
///
/// A destroyed Reference has nothing left to cascade from, so it can never
/// grow new dependents.
///
/// ### Fields
/// * `id` — Identifier of the destroyed Reference that rejected the link.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reference {id} is already destroyed and cannot accept dependents")]
pub struct DestroyedResourceError {

    /// Identifier of the destroyed Reference.
    pub id: ReferenceID,
}

/// Returned by collaborators when a native object could not be created.
///
/// ### Fields
/// * `resource` — Short name of the resource kind (e.g. `"buffer"`).
/// * `message` — Human-readable detail from the native layer.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to allocate native {resource}: {message}")]
pub struct NativeAllocationError {

    /// Resource kind that failed to allocate.
    pub resource: &'static str,

    /// Detail reported by the native layer.
    pub message: Cow<'static, str>,
}

impl NativeAllocationError {
    /// Creates an allocation error for `resource` with the given detail.
    pub fn new(resource: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self { resource, message: message.into() }
    }
}

/// Aggregate error for lifecycle and builder operations.
///
/// `From` conversions exist for each specific error so that `?` can be used
/// uniformly in builder code.

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {

    /// A dependent was linked to an already-destroyed Reference.
    #[error(transparent)]
    DestroyedResource(#[from] DestroyedResourceError),

    /// A collaborator failed to create a native object.
    #[error(transparent)]
    NativeAllocation(#[from] NativeAllocationError),
}

/// Result alias used across the lifecycle API.
pub type LifecycleResult<T> = Result<T, LifecycleError>;
