#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use native_lifecycle::{DestroyAction, LifecycleManager, Reference};

pub const REFS_SMALL: usize = 1_000;
pub const REFS_MED: usize = 10_000;
pub const REFS_LARGE: usize = 100_000;

pub fn counting_action(counter: &Arc<AtomicUsize>) -> DestroyAction {
    let counter = counter.clone();
    Box::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    })
}

/// Root with `width` direct dependents.
pub fn fan_out(manager: &LifecycleManager, width: usize, counter: &Arc<AtomicUsize>) -> Reference {
    let root = manager.register_action(counting_action(counter));
    for _ in 0..width {
        let child = manager.register_action(counting_action(counter));
        root.add_dependent(&child).expect("root destroyed during setup");
    }
    root
}

/// Chain of `len` References, each depending on the previous one.
pub fn chain(manager: &LifecycleManager, len: usize, counter: &Arc<AtomicUsize>) -> Reference {
    let root = manager.register_action(counting_action(counter));
    let mut tail = root.clone();
    for _ in 1..len {
        let next = manager.register_action(counting_action(counter));
        tail.add_dependent(&next).expect("tail destroyed during setup");
        tail = next;
    }
    root
}
