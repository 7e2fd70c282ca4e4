use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use native_lifecycle::{
    DestroyAction, KeyedCache, LifecycleError, LifecycleManager, LifecycleResult,
    NativeAllocationError, NativeResource, Reference, ResourceBuilder, Tracked,
};

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Minimal device double: hands out integer handles and counts frees.
#[derive(Default)]
struct FakeDevice {
    next_handle: AtomicU32,
    created: AtomicUsize,
    freed: Arc<AtomicUsize>,
}

#[derive(Debug)]
struct FakeAllocation {
    handle: u32,
    freed: Arc<AtomicUsize>,
}

impl NativeResource for FakeAllocation {
    type Handle = u32;

    fn native_object(&self) -> u32 {
        self.handle
    }

    fn create_destroy_action(&self) -> DestroyAction {
        let freed = self.freed.clone();
        Box::new(move || {
            freed.fetch_add(1, Ordering::SeqCst);
        })
    }
}

#[derive(Debug)]
struct Surface {
    size: u32,
    native: OnceLock<Tracked<FakeAllocation>>,
}

impl Surface {
    fn handle(&self) -> Option<u32> {
        self.native.get().map(Tracked::native_object)
    }

    fn reference(&self) -> Option<&Reference> {
        self.native.get().map(Tracked::reference)
    }
}

struct SurfaceBuilder<'a> {
    device: &'a FakeDevice,
    size: u32,
}

impl ResourceBuilder for SurfaceBuilder<'_> {
    type Key = u32;
    type Target = Arc<Surface>;

    fn instantiate(&self) -> Arc<Surface> {
        Arc::new(Surface { size: self.size, native: OnceLock::new() })
    }

    fn construct(&self, manager: &LifecycleManager, target: &Arc<Surface>) -> LifecycleResult<()> {
        if target.size == 0 {
            return Err(NativeAllocationError::new("surface", "size must be non-zero").into());
        }
        self.device.created.fetch_add(1, Ordering::SeqCst);
        let tracked = manager.register(FakeAllocation {
            handle: self.device.next_handle.fetch_add(1, Ordering::SeqCst),
            freed: self.device.freed.clone(),
        });
        let _ = target.native.set(tracked);
        Ok(())
    }
}

fn surface_cache() -> KeyedCache<u32, Arc<Surface>> {
    KeyedCache::new(|surface: &Arc<Surface>| surface.size)
}

#[test]
fn build_without_cache_always_constructs() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();
    let builder = SurfaceBuilder { device: &device, size: 64 };

    let a = builder.build(&manager, None).unwrap();
    let b = builder.build(&manager, None).unwrap();

    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.handle(), b.handle());
    assert_eq!(device.created.load(Ordering::SeqCst), 2);
    assert_eq!(manager.len(), 2);
}

#[test]
fn build_with_cache_constructs_once_per_key() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();
    let cache = surface_cache();

    let a = SurfaceBuilder { device: &device, size: 64 }.build(&manager, Some(&cache)).unwrap();
    let b = SurfaceBuilder { device: &device, size: 64 }.build(&manager, Some(&cache)).unwrap();
    let c = SurfaceBuilder { device: &device, size: 128 }.build(&manager, Some(&cache)).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(device.created.load(Ordering::SeqCst), 2);
    assert_eq!(manager.len(), 2);
    assert!(a.handle().is_some());
}

#[test]
fn failed_construct_leaves_cache_empty() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();
    let cache = surface_cache();

    let err = SurfaceBuilder { device: &device, size: 0 }
        .build(&manager, Some(&cache))
        .unwrap_err();

    assert!(matches!(err, LifecycleError::NativeAllocation(ref e) if e.resource == "surface"));
    assert_eq!(err.to_string(), "failed to allocate native surface: size must be non-zero");
    assert!(cache.is_empty());
    assert!(manager.is_empty());
}

#[test]
fn evicted_target_is_destroyed_when_last_owner_drops() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();
    let cache = surface_cache();

    let surface = SurfaceBuilder { device: &device, size: 64 }.build(&manager, Some(&cache)).unwrap();
    let reference = surface.reference().cloned().unwrap();

    cache.clear();
    assert!(!reference.is_destroyed(), "eviction alone never destroys");

    drop(surface);
    assert!(reference.is_destroyed());
    assert_eq!(device.freed.load(Ordering::SeqCst), 1);

    manager.clear();
    assert_eq!(device.freed.load(Ordering::SeqCst), 1);
}

#[test]
fn manager_clear_destroys_cached_targets() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();
    let cache = surface_cache();

    for size in [16, 32, 64] {
        SurfaceBuilder { device: &device, size }.build(&manager, Some(&cache)).unwrap();
    }

    manager.clear();
    assert_eq!(device.freed.load(Ordering::SeqCst), 3);

    // Cached wrappers are now inert; dropping them does nothing further.
    cache.clear();
    assert_eq!(device.freed.load(Ordering::SeqCst), 3);
}

#[test]
fn builders_can_link_dependents() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();

    let texture = SurfaceBuilder { device: &device, size: 256 }.build(&manager, None).unwrap();
    let view = SurfaceBuilder { device: &device, size: 256 }.build(&manager, None).unwrap();

    let texture_ref = texture.reference().unwrap();
    let view_ref = view.reference().unwrap();
    texture_ref.add_dependent(view_ref).map_err(LifecycleError::from).unwrap();

    assert!(manager.destroy(texture_ref.id()));
    assert!(view_ref.is_destroyed());
    assert_eq!(device.freed.load(Ordering::SeqCst), 2);
}

/// Looks up its own key while its construct is still running, then fails.
struct InterruptedBuilder<'a> {
    inner: SurfaceBuilder<'a>,
    cache: &'a KeyedCache<u32, Arc<Surface>>,
    observed: Mutex<Option<Arc<Surface>>>,
}

impl ResourceBuilder for InterruptedBuilder<'_> {
    type Key = u32;
    type Target = Arc<Surface>;

    fn instantiate(&self) -> Arc<Surface> {
        self.inner.instantiate()
    }

    fn construct(&self, manager: &LifecycleManager, _target: &Arc<Surface>) -> LifecycleResult<()> {
        let early = self.inner.build(manager, Some(self.cache))?;
        *self.observed.lock() = Some(early);
        Err(NativeAllocationError::new("surface", "device lost").into())
    }
}

#[test]
fn hit_during_construct_sees_unconstructed_target() {
    init_logging();
    let device = FakeDevice::default();
    let manager = LifecycleManager::new();
    let cache = surface_cache();

    let builder = InterruptedBuilder {
        inner: SurfaceBuilder { device: &device, size: 64 },
        cache: &cache,
        observed: Mutex::new(None),
    };
    let err = builder.build(&manager, Some(&cache)).unwrap_err();
    assert!(matches!(err, LifecycleError::NativeAllocation(_)));

    let early = builder.observed.lock().take().unwrap();
    assert!(early.handle().is_none(), "the racing caller got the target before construction");
    assert!(!cache.contains_key(&64));
    assert_eq!(device.created.load(Ordering::SeqCst), 0);

    let rebuilt = SurfaceBuilder { device: &device, size: 64 }.build(&manager, Some(&cache)).unwrap();
    assert!(!Arc::ptr_eq(&rebuilt, &early));
    assert!(rebuilt.handle().is_some());
}
