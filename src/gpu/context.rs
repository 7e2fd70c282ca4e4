//! GPU device and queue.

#![cfg(feature = "gpu")]

use crate::lifecycle::error::NativeAllocationError;

/// Device and queue used to create GPU resources.
///
/// ## Role
/// Builders borrow the context to issue native creation calls. Destroy
/// actions never need it: wgpu resources release themselves.

#[derive(Debug)]
pub struct GPUContext {
    /// Logical device.
    pub device: wgpu::Device,

    /// Submission queue for `device`.
    pub queue: wgpu::Queue,
}

impl GPUContext {

    /// Wraps an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        Self { device, queue }
    }

    /// Requests the default adapter and a device on it, blocking the calling
    /// thread.
    ///
    /// ## Errors
    /// Returns [`NativeAllocationError`] if no adapter is available or the
    /// device request is rejected.

    pub fn request() -> Result<Self, NativeAllocationError> {
        pollster::block_on(async {
            let instance = wgpu::Instance::default();

            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions::default())
                .await
                .ok_or_else(|| NativeAllocationError::new("device", "no compatible GPU adapter"))?;

            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor::default(), None)
                .await
                .map_err(|e| NativeAllocationError::new("device", e.to_string()))?;

            log::debug!("gpu context created on {:?}", adapter.get_info().name);
            Ok::<Self, NativeAllocationError>(Self { device, queue })
        })
    }
}
