//! # References and the Dependency Graph
//!
//! A [`Reference`] tracks the destruction state of exactly one native
//! resource, together with the References that **depend** on it and must be
//! destroyed when it is.
//!
//! ## State machine
//!
//! ```text
//! active ──destroy()──▶ destroyed   (one-way, at most once)
//! ```
//!
//! The transition is a single compare-and-set on an atomic flag. Only the
//! caller that wins it performs the cascade; every other caller (concurrent
//! or later) observes the Reference as destroyed and returns immediately.
//!
//! ## Cascade order
//!
//! Winning `destroy()` on a Reference:
//! 1. destroys each dependent, in the order they were added, applying the
//!    same contract to each (their own dependents go first),
//! 2. clears the dependents list,
//! 3. runs the Reference's own destroy action exactly once.
//!
//! Consumers (e.g. a texture view) are therefore always torn down before the
//! object they consume (the texture).
//!
//! A dependent already claimed by another thread is still in flight from the
//! parent's point of view: the cascade blocks until that thread has finished
//! the dependent's action before it runs the parent's. Waits only ever point
//! from a Reference to its dependents, so an acyclic graph cannot deadlock.
//!
//! The traversal is driven by an explicit work-list rather than recursion,
//! so arbitrarily deep dependency chains cannot exhaust the stack.
//!
//! ## Invariants
//! * A destroyed Reference has an empty dependents list.
//! * A destroyed Reference rejects `add_dependent` with
//!   [`DestroyedResourceError`].
//! * A destroy action runs at most once, whatever path reaches it.
//! * A Reference's own action starts only after every dependent's action
//!   has returned, whichever thread ran it.

use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::mem;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use crate::lifecycle::error::DestroyedResourceError;
use crate::lifecycle::types::{next_reference_id, ReferenceID};

/// Zero-argument action that releases a native resource.
///
/// ## Contract
/// * Must capture only what destruction needs (the raw native handle and any
///   device/context handles), never the Rust wrapper that owns the resource.
/// * Must be best-effort and non-failing. A panic is caught and logged so the
///   surrounding cascade still completes.
/// * May run on any thread: the caller's thread for explicit destruction, or
///   whichever thread drops the last owner of a [`Tracked`](crate::Tracked).
pub type DestroyAction = Box<dyn FnOnce() + Send + 'static>;

/// Shared state behind a [`Reference`].
struct ReferenceNode {
    id: ReferenceID,
    active: AtomicBool,
    dependents: Mutex<Vec<Reference>>,
    action: Mutex<Option<DestroyAction>>,
    /// Set once the destroy action has returned (or panicked).
    released: Mutex<bool>,
    released_signal: Condvar,
}

impl ReferenceNode {

    /// Claims the active→destroyed transition. Returns `true` for the single
    /// winning caller.
    #[inline]
    fn deactivate(&self) -> bool {
        self.active
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Runs the destroy action if it has not run yet.
    fn release(&self) -> bool {
        let action = self.action.lock().take();
        let Some(action) = action else {
            self.mark_released();
            return false;
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(action)) {
            log::error!(
                "destroy action for reference {} panicked: {}",
                self.id,
                panic_message(payload.as_ref())
            );
        }
        self.mark_released();
        true
    }

    fn mark_released(&self) {
        *self.released.lock() = true;
        self.released_signal.notify_all();
    }

    #[inline]
    fn is_released(&self) -> bool {
        *self.released.lock()
    }

    /// Blocks until whichever thread claimed this node has run its action.
    fn wait_released(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.released_signal.wait(&mut released);
        }
    }
}

impl Drop for ReferenceNode {
    fn drop(&mut self) {
        // Unwind dependents iteratively so dropping a long, never-destroyed
        // chain does not recurse once per link.
        let mut pending = mem::take(self.dependents.get_mut());
        while let Some(reference) = pending.pop() {
            if let Ok(mut node) = Arc::try_unwrap(reference.node) {
                pending.append(node.dependents.get_mut());
            }
        }
    }
}

/// One unit of cascade work.
enum Step {
    /// Try to claim a dependent; expand it if the claim succeeds.
    Visit(Reference),

    /// All dependents are done; run this Reference's own action.
    Release(Reference),
}

/// Destruction-state tracker and dependency-cascade node for one native
/// resource.
///
/// `Reference` is a cheap, clonable handle; clones share the same state.
/// References are created by the [`LifecycleManager`](crate::LifecycleManager)
/// at registration time.
///
/// ## Example
/// ```ignore
/// let texture = manager.register(texture);
/// let view = manager.register(view);
/// texture.reference().add_dependent(view.reference())?;
///
/// texture.reference().destroy(); // view's action runs first, then texture's
/// assert!(view.reference().is_destroyed());
/// ```

#[derive(Clone)]
pub struct Reference {
    node: Arc<ReferenceNode>,
}

impl Reference {

    /// Creates a fresh, active Reference owning `action`.
    pub(crate) fn new(action: DestroyAction) -> Self {
        Self {
            node: Arc::new(ReferenceNode {
                id: next_reference_id(),
                active: AtomicBool::new(true),
                dependents: Mutex::new(Vec::new()),
                action: Mutex::new(Some(action)),
                released: Mutex::new(false),
                released_signal: Condvar::new(),
            }),
        }
    }

    /// Returns the process-unique identifier of this Reference.
    #[inline]
    pub fn id(&self) -> ReferenceID {
        self.node.id
    }

    /// Returns `true` once this Reference has been destroyed.
    ///
    /// Non-blocking.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        !self.node.active.load(Ordering::Acquire)
    }

    /// Returns the number of dependents currently linked to this Reference.
    ///
    /// Includes dependents destroyed on their own since the last link. Always
    /// `0` once destroyed.
    pub fn dependent_count(&self) -> usize {
        self.node.dependents.lock().len()
    }

    /// Registers `dependent` to be destroyed when `self` is destroyed.
    ///
    /// ## Errors
    /// Returns [`DestroyedResourceError`] if `self` is already destroyed.
    ///
    /// ## Notes
    /// Dependents are expected to be linked when the dependent is created,
    /// pointing at a parent that already exists, so the graph stays acyclic.
    /// Linking an already-destroyed dependent is allowed; the cascade simply
    /// skips it.
    ///
    /// Each call first drops dependents whose actions have already run, so a
    /// long-lived parent does not accumulate every short-lived dependent it
    /// ever had (views created and dropped on one texture, for example).

    pub fn add_dependent(&self, dependent: &Reference) -> Result<(), DestroyedResourceError> {
        let mut dependents = self.node.dependents.lock();

        // Checked under the dependents lock: `destroy` flips the flag before
        // draining the list under the same lock, so a dependent pushed here is
        // either drained by that cascade or rejected.
        if self.is_destroyed() {
            return Err(DestroyedResourceError { id: self.id() });
        }

        dependents.retain(|linked| !linked.node.is_released());
        dependents.push(dependent.clone());
        Ok(())
    }

    /// Destroys this Reference and, transitively, all of its dependents.
    ///
    /// ## Semantics
    /// * Idempotent: only the first call (across all threads) does any work.
    /// * Dependents are destroyed before this Reference's own action runs. A
    ///   dependent being destroyed by another thread is waited for.
    /// * Runs to completion on the calling thread; not cancellable.

    pub fn destroy(&self) {
        if !self.node.deactivate() {
            return;
        }

        let mut work = Vec::new();
        let mut claimed = HashSet::from([self.id()]);
        self.expand(&mut work);

        let mut released = 0usize;
        while let Some(step) = work.pop() {
            match step {
                Step::Visit(reference) => {
                    if reference.node.deactivate() {
                        claimed.insert(reference.id());
                        reference.expand(&mut work);
                    } else if !claimed.contains(&reference.id()) {
                        // Claimed elsewhere; its action may still be running.
                        reference.node.wait_released();
                    }
                }
                Step::Release(reference) => {
                    if reference.node.release() {
                        released += 1;
                    }
                    log::trace!("reference {} destroyed", reference.id());
                }
            }
        }

        log::debug!(
            "destroyed reference {} ({} destroy action(s) run)",
            self.id(),
            released
        );
    }

    /// Drains this (already claimed) Reference's dependents onto the
    /// work-list, scheduling its own release after all of them.
    fn expand(&self, work: &mut Vec<Step>) {
        let dependents = mem::take(&mut *self.node.dependents.lock());
        work.push(Step::Release(self.clone()));
        work.extend(dependents.into_iter().rev().map(Step::Visit));
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Reference {}

impl Hash for Reference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reference")
            .field("id", &self.id())
            .field("destroyed", &self.is_destroyed())
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}
