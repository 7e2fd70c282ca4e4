//! GPU buffers.
//!
//! A [`GpuBuffer`] is instantiated from a [`BufferKey`] without touching the
//! device; [`BufferBuilder::construct`](crate::ResourceBuilder::construct)
//! creates the `wgpu::Buffer`, registers it with the lifecycle manager and
//! stores the owning wrapper in the target. Equivalent buffers (same key)
//! share one native allocation while a cache entry for them lives.

#![cfg(feature = "gpu")]

use std::fmt;
use std::sync::{Arc, OnceLock};

use wgpu::util::DeviceExt;

use crate::gpu::context::GPUContext;
use crate::gpu::hash_bytes;
use crate::lifecycle::builder::ResourceBuilder;
use crate::lifecycle::error::{LifecycleResult, NativeAllocationError};
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::reference::{DestroyAction, Reference};
use crate::lifecycle::resource::{NativeResource, Tracked};

/// Cache key identifying equivalent buffers.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BufferKey {
    /// Debug label.
    pub label: Option<String>,

    /// Size in bytes.
    pub size: u64,

    /// Allowed usages.
    pub usage: wgpu::BufferUsages,

    /// FNV-1a hash of the initial contents, if any.
    pub contents_hash: Option<u64>,
}

/// Native side of a buffer: the shared wgpu handle.
struct NativeBuffer {
    buffer: Arc<wgpu::Buffer>,
}

impl NativeResource for NativeBuffer {
    type Handle = Arc<wgpu::Buffer>;

    fn native_object(&self) -> Self::Handle {
        self.buffer.clone()
    }

    fn create_destroy_action(&self) -> DestroyAction {
        let buffer = self.buffer.clone();
        Box::new(move || buffer.destroy())
    }
}

/// A GPU buffer target.
///
/// Empty until constructed by [`BufferBuilder`].

pub struct GpuBuffer {
    key: BufferKey,
    native: OnceLock<Tracked<NativeBuffer>>,
}

impl GpuBuffer {

    /// Returns the key this buffer was built from.
    #[inline]
    pub fn key(&self) -> &BufferKey {
        &self.key
    }

    /// Returns the native buffer, or `None` before construction.
    pub fn buffer(&self) -> Option<Arc<wgpu::Buffer>> {
        self.native.get().map(|native| native.native_object())
    }

    /// Returns the Reference tracking the native buffer, or `None` before
    /// construction.
    pub fn reference(&self) -> Option<&Reference> {
        self.native.get().map(|native| native.reference())
    }

    /// Returns `true` once the native buffer has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.native.get().is_some_and(|native| native.is_destroyed())
    }
}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("key", &self.key)
            .field("reference", &self.reference())
            .finish()
    }
}

/// Builds [`GpuBuffer`]s on a [`GPUContext`].
///
/// ## Example
/// ```ignore
/// let cache = KeyedCache::new(|buffer: &Arc<GpuBuffer>| buffer.key().clone());
/// let vertices = BufferBuilder::new(&context, 0, wgpu::BufferUsages::VERTEX)
///     .label("quad.vertices")
///     .contents(&QUAD)
///     .build(&manager, Some(&cache))?;
/// ```

pub struct BufferBuilder<'a> {
    context: &'a GPUContext,
    key: BufferKey,
    contents: Option<Vec<u8>>,
}

impl<'a> BufferBuilder<'a> {

    /// Starts a builder for an uninitialized buffer of `size` bytes.
    pub fn new(context: &'a GPUContext, size: u64, usage: wgpu::BufferUsages) -> Self {
        Self {
            context,
            key: BufferKey { label: None, size, usage, contents_hash: None },
            contents: None,
        }
    }

    /// Sets the debug label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.key.label = Some(label.into());
        self
    }

    /// Initializes the buffer from `data`; the size becomes its byte length.
    pub fn contents<T: bytemuck::Pod>(mut self, data: &[T]) -> Self {
        let bytes = bytemuck::cast_slice::<T, u8>(data).to_vec();
        self.key.size = bytes.len() as u64;
        self.key.contents_hash = Some(hash_bytes(&bytes));
        self.contents = Some(bytes);
        self
    }

    /// Returns the key targets of this builder are cached under.
    #[inline]
    pub fn key(&self) -> &BufferKey {
        &self.key
    }

    fn validate(&self) -> Result<(), NativeAllocationError> {
        let max = self.context.device.limits().max_buffer_size;
        if self.key.size == 0 {
            return Err(NativeAllocationError::new("buffer", "size must be non-zero"));
        }
        if self.key.size > max {
            return Err(NativeAllocationError::new(
                "buffer",
                format!("size {} exceeds device limit {}", self.key.size, max),
            ));
        }
        Ok(())
    }
}

impl ResourceBuilder for BufferBuilder<'_> {
    type Key = BufferKey;
    type Target = Arc<GpuBuffer>;

    fn instantiate(&self) -> Self::Target {
        Arc::new(GpuBuffer {
            key: self.key.clone(),
            native: OnceLock::new(),
        })
    }

    fn construct(&self, manager: &LifecycleManager, target: &Self::Target) -> LifecycleResult<()> {
        self.validate()?;

        let label = target.key.label.as_deref();
        let buffer = match &self.contents {
            Some(contents) => self.context.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label,
                contents: contents.as_slice(),
                usage: target.key.usage,
            }),
            None => self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label,
                size: target.key.size,
                usage: target.key.usage,
                mapped_at_creation: false,
            }),
        };

        let tracked = manager.register(NativeBuffer { buffer: Arc::new(buffer) });
        log::debug!(
            "created buffer {:?} ({} bytes) as reference {}",
            target.key.label,
            target.key.size,
            tracked.reference().id()
        );

        // A second construct on the same target drops (and so destroys) the
        // duplicate.
        if target.native.set(tracked).is_err() {
            log::warn!("buffer {:?} constructed twice; duplicate destroyed", target.key.label);
        }
        Ok(())
    }
}
