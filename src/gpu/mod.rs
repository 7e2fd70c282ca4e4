//! # GPU Resources
//!
//! wgpu-backed native resources built on the lifecycle core.
//!
//! The GPU module is an **optional, feature-gated extension** (`feature = "gpu"`)
//! and a reference consumer of the lifecycle API: every type here follows the
//! builder pattern of [`ResourceBuilder`](crate::ResourceBuilder) and tracks
//! its native object through a [`LifecycleManager`](crate::LifecycleManager).
//!
//! ---
//!
//! ## Resource model
//!
//! * [`GpuBuffer`] — a `wgpu::Buffer`, deduplicated by [`BufferKey`]
//!   (label, size, usage, hash of initial contents).
//! * [`GpuTexture`] — a 2D `wgpu::Texture`, deduplicated by [`TextureKey`].
//! * [`GpuTextureView`] — a view of a texture. Its Reference is a dependent
//!   of the texture's, so destroying the texture tears the view down first.
//!   The view keeps its texture alive for as long as it exists.
//!
//! Targets are instantiated cheaply and constructed lazily: the native
//! object is created by the build side effect, which runs once per cache key.
//!
//! ---
//!
//! ## Threading
//!
//! wgpu handles are `Send + Sync` on native backends, and their destroy
//! calls need no device lock, so destroy actions may run on whichever thread
//! triggers them: the caller of `destroy`/`clear`, or the thread dropping the
//! last owner. Destroy actions capture only the `Arc`ed native handle.
//!
//! ---
//!
//! ## Public API
//!
//! * [`GPUContext`] — device and queue
//! * [`BufferBuilder`], [`TextureBuilder`] — cached constructors

#![cfg(feature = "gpu")]

mod context;
mod buffer;
mod texture;

pub use context::GPUContext;

pub use buffer::{
    BufferBuilder,
    BufferKey,
    GpuBuffer,
};

pub use texture::{
    GpuTexture,
    GpuTextureView,
    TextureBuilder,
    TextureKey,
};

/// FNV-1a over raw bytes; used to key buffers by their initial contents.
#[inline]
pub(crate) fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 1469598103934665603;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}
