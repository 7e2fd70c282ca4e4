//! GPU textures and texture views.
//!
//! Views depend on their texture: a view's Reference is linked as a
//! dependent of the texture's when the view is created, so an explicit
//! destroy of the texture (or a manager `clear`) releases the view first.
//! A view also holds an `Arc` to its texture, so the texture's wrapper cannot
//! be dropped, and the texture destroyed by ownership, while a view exists.

#![cfg(feature = "gpu")]

use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use crate::gpu::context::GPUContext;
use crate::lifecycle::builder::ResourceBuilder;
use crate::lifecycle::error::{DestroyedResourceError, LifecycleResult, NativeAllocationError};
use crate::lifecycle::manager::LifecycleManager;
use crate::lifecycle::reference::{DestroyAction, Reference};
use crate::lifecycle::resource::{NativeResource, Tracked};

/// Cache key identifying equivalent 2D textures.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureKey {
    /// Debug label.
    pub label: Option<String>,

    /// Width in texels.
    pub width: u32,

    /// Height in texels.
    pub height: u32,

    /// Texel format.
    pub format: wgpu::TextureFormat,

    /// Allowed usages.
    pub usage: wgpu::TextureUsages,
}

struct NativeTexture {
    texture: Arc<wgpu::Texture>,
}

impl NativeResource for NativeTexture {
    type Handle = Arc<wgpu::Texture>;

    fn native_object(&self) -> Self::Handle {
        self.texture.clone()
    }

    fn create_destroy_action(&self) -> DestroyAction {
        let texture = self.texture.clone();
        Box::new(move || texture.destroy())
    }
}

/// Views have no explicit destroy call; releasing the last handle frees
/// them, so the slot is emptied by the destroy action.
type ViewSlot = Arc<Mutex<Option<wgpu::TextureView>>>;

struct NativeTextureView {
    view: ViewSlot,
}

impl NativeResource for NativeTextureView {
    type Handle = ViewSlot;

    fn native_object(&self) -> Self::Handle {
        self.view.clone()
    }

    fn create_destroy_action(&self) -> DestroyAction {
        let view = self.view.clone();
        Box::new(move || drop(view.lock().take()))
    }
}

/// A 2D GPU texture target.
///
/// Empty until constructed by [`TextureBuilder`].

pub struct GpuTexture {
    key: TextureKey,
    native: OnceLock<Tracked<NativeTexture>>,
}

impl GpuTexture {

    /// Returns the key this texture was built from.
    #[inline]
    pub fn key(&self) -> &TextureKey {
        &self.key
    }

    /// Returns the native texture, or `None` before construction.
    pub fn texture(&self) -> Option<Arc<wgpu::Texture>> {
        self.native.get().map(|native| native.native_object())
    }

    /// Returns the Reference tracking the native texture, or `None` before
    /// construction.
    pub fn reference(&self) -> Option<&Reference> {
        self.native.get().map(|native| native.reference())
    }

    /// Returns `true` once the native texture has been destroyed.
    pub fn is_destroyed(&self) -> bool {
        self.native.get().is_some_and(|native| native.is_destroyed())
    }

    /// Creates a default view of this texture and links it as a dependent.
    ///
    /// ## Errors
    /// * [`NativeAllocationError`] if the texture has not been constructed.
    /// * [`DestroyedResourceError`] if the texture is already destroyed. A
    ///   view created while the texture is being destroyed is released.

    pub fn create_view(self: &Arc<Self>, manager: &LifecycleManager) -> LifecycleResult<GpuTextureView> {
        let native = self.native.get().ok_or_else(|| {
            NativeAllocationError::new("texture view", "texture has not been constructed")
        })?;
        if native.is_destroyed() {
            return Err(DestroyedResourceError { id: native.reference().id() }.into());
        }

        let view = native
            .native_object()
            .create_view(&wgpu::TextureViewDescriptor::default());

        let tracked = manager.register(NativeTextureView {
            view: Arc::new(Mutex::new(Some(view))),
        });
        native.reference().add_dependent(tracked.reference())?;

        Ok(GpuTextureView {
            texture: Arc::clone(self),
            native: tracked,
        })
    }
}

impl fmt::Debug for GpuTexture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTexture")
            .field("key", &self.key)
            .field("reference", &self.reference())
            .finish()
    }
}

/// A view of a [`GpuTexture`], destroyed no later than its texture.
pub struct GpuTextureView {
    texture: Arc<GpuTexture>,
    native: Tracked<NativeTextureView>,
}

impl GpuTextureView {

    /// Returns the viewed texture.
    #[inline]
    pub fn texture(&self) -> &Arc<GpuTexture> {
        &self.texture
    }

    /// Returns the Reference tracking this view.
    #[inline]
    pub fn reference(&self) -> &Reference {
        self.native.reference()
    }

    /// Returns `true` once the view has been destroyed, directly or through
    /// its texture.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.native.is_destroyed()
    }

    /// Runs `f` with the native view, or returns `None` once destroyed.
    pub fn with_view<T>(&self, f: impl FnOnce(&wgpu::TextureView) -> T) -> Option<T> {
        let slot = self.native.native_object();
        let guard = slot.lock();
        let result = guard.as_ref().map(f);
        result
    }
}

impl fmt::Debug for GpuTextureView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuTextureView")
            .field("texture", &self.texture.key)
            .field("reference", self.reference())
            .finish()
    }
}

/// Builds 2D [`GpuTexture`]s on a [`GPUContext`].
pub struct TextureBuilder<'a> {
    context: &'a GPUContext,
    key: TextureKey,
}

impl<'a> TextureBuilder<'a> {

    /// Starts a builder for a `width` × `height` texture.
    pub fn new(
        context: &'a GPUContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        usage: wgpu::TextureUsages,
    ) -> Self {
        Self {
            context,
            key: TextureKey { label: None, width, height, format, usage },
        }
    }

    /// Sets the debug label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.key.label = Some(label.into());
        self
    }

    /// Returns the key targets of this builder are cached under.
    #[inline]
    pub fn key(&self) -> &TextureKey {
        &self.key
    }

    fn validate(&self) -> Result<(), NativeAllocationError> {
        let max = self.context.device.limits().max_texture_dimension_2d;
        let (width, height) = (self.key.width, self.key.height);
        if width == 0 || height == 0 {
            return Err(NativeAllocationError::new("texture", "dimensions must be non-zero"));
        }
        if width > max || height > max {
            return Err(NativeAllocationError::new(
                "texture",
                format!("{width}x{height} exceeds device limit {max}"),
            ));
        }
        Ok(())
    }
}

impl ResourceBuilder for TextureBuilder<'_> {
    type Key = TextureKey;
    type Target = Arc<GpuTexture>;

    fn instantiate(&self) -> Self::Target {
        Arc::new(GpuTexture {
            key: self.key.clone(),
            native: OnceLock::new(),
        })
    }

    fn construct(&self, manager: &LifecycleManager, target: &Self::Target) -> LifecycleResult<()> {
        self.validate()?;

        let key = &target.key;
        let texture = self.context.device.create_texture(&wgpu::TextureDescriptor {
            label: key.label.as_deref(),
            size: wgpu::Extent3d {
                width: key.width,
                height: key.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: key.format,
            usage: key.usage,
            view_formats: &[],
        });

        let tracked = manager.register(NativeTexture { texture: Arc::new(texture) });
        log::debug!(
            "created texture {:?} ({}x{} {:?}) as reference {}",
            key.label,
            key.width,
            key.height,
            key.format,
            tracked.reference().id()
        );

        if target.native.set(tracked).is_err() {
            log::warn!("texture {:?} constructed twice; duplicate destroyed", key.label);
        }
        Ok(())
    }
}
