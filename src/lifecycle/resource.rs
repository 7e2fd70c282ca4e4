//! Native Resources
//!
//! A **native resource** is any owner of a handle whose real state lives
//! outside the Rust heap. The lifecycle layer never touches the handle
//! itself: it only asks the owner for a [`DestroyAction`] once, at
//! registration, and runs it when the owning [`Tracked`] wrapper goes away or
//! an ancestor in the dependency graph is destroyed.
//!
//! ## Ownership
//!
//! [`Tracked<R>`] is the owning wrapper returned by
//! [`LifecycleManager::register`](crate::LifecycleManager::register). When it
//! is dropped its Reference is destroyed, which runs the destroy action (and
//! cascades to dependents). Leaking a resource therefore requires leaking its
//! wrapper (`mem::forget`, reference cycles), never simply forgetting to call
//! `destroy`.
//!
//! Share a `Tracked<R>` through `Arc` when several owners need it; the
//! resource is destroyed when the last owner drops, or earlier if destroyed
//! explicitly.

use std::fmt;
use std::ops::Deref;

use crate::lifecycle::reference::{DestroyAction, Reference};

/// Capability implemented by owners of a native handle.
///
/// Implementors typically hold a cheaply clonable native handle (or an `Arc`
/// around one) so the destroy action can capture its own copy.
///
/// ## Example
/// ```ignore
/// struct RawBuffer { handle: Arc<wgpu::Buffer> }
///
/// impl NativeResource for RawBuffer {
///     type Handle = Arc<wgpu::Buffer>;
///
///     fn native_object(&self) -> Self::Handle { self.handle.clone() }
///
///     fn create_destroy_action(&self) -> DestroyAction {
///         let handle = self.handle.clone();
///         Box::new(move || handle.destroy())
///     }
/// }
/// ```

pub trait NativeResource: Send + Sync {
    /// Opaque native handle exposed to callers.
    type Handle;

    /// Returns the native object owned by this resource.
    fn native_object(&self) -> Self::Handle;

    /// Produces the action that releases the native object.
    ///
    /// Called exactly once, at registration. The action must not capture
    /// `self` (see [`DestroyAction`]).
    fn create_destroy_action(&self) -> DestroyAction;
}

/// Owning wrapper pairing a native resource with its [`Reference`].
///
/// Dereferences to the wrapped resource. Dropping the wrapper destroys the
/// Reference.

pub struct Tracked<R: NativeResource> {
    resource: R,
    reference: Reference,
}

impl<R: NativeResource> Tracked<R> {

    /// Pairs `resource` with an already-created `reference`.
    pub(crate) fn new(resource: R, reference: Reference) -> Self {
        Self { resource, reference }
    }

    /// Returns the Reference tracking this resource.
    #[inline]
    pub fn reference(&self) -> &Reference {
        &self.reference
    }

    /// Returns the native object owned by the wrapped resource.
    #[inline]
    pub fn native_object(&self) -> R::Handle {
        self.resource.native_object()
    }

    /// Returns `true` once the resource has been destroyed, either directly
    /// or through a cascade from something it depends on.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.reference.is_destroyed()
    }

    /// Destroys the resource (and its dependents) now.
    ///
    /// Equivalent to `self.reference().destroy()`; idempotent.
    #[inline]
    pub fn destroy(&self) {
        self.reference.destroy();
    }
}

impl<R: NativeResource> Deref for Tracked<R> {
    type Target = R;

    #[inline]
    fn deref(&self) -> &R {
        &self.resource
    }
}

impl<R: NativeResource> Drop for Tracked<R> {
    fn drop(&mut self) {
        self.reference.destroy();
    }
}

impl<R: NativeResource + fmt::Debug> fmt::Debug for Tracked<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("resource", &self.resource)
            .field("reference", &self.reference)
            .finish()
    }
}
