//! GPU memory allocation.
//!
//! A thin reference-counted wrapper around the Vulkan Memory Allocator. The
//! allocator is cloned into every buffer and image so the VMA instance
//! outlives all allocations made from it.

use std::{ops::Deref, sync::Arc};

use ash::prelude::VkResult;

use crate::{
    device::{Device, HasDevice},
    utils::AsVkHandle,
};

/// A GPU memory allocator backed by VMA.
///
/// Thread-safe and cheap to clone.
#[derive(Clone)]
pub struct Allocator(Arc<AllocatorInner>);
struct AllocatorInner {
    device: Device,
    inner: vk_mem::Allocator,
}

impl HasDevice for Allocator {
    fn device(&self) -> &Device {
        &self.0.device
    }
}

impl Allocator {
    /// Creates a new allocator for the given device.
    pub fn new(device: Device) -> VkResult<Self> {
        let info = vk_mem::AllocatorCreateInfo::new(
            device.instance(),
            &device,
            device.physical_device().vk_handle(),
        );
        let alloc = unsafe { vk_mem::Allocator::new(info)? };
        Ok(Self(Arc::new(AllocatorInner {
            device,
            inner: alloc,
        })))
    }
}

impl Deref for Allocator {
    type Target = vk_mem::Allocator;

    fn deref(&self) -> &Self::Target {
        &self.0.inner
    }
}
