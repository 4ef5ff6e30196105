//! Immutable samplers owned by the context.
//!
//! Two samplers cover every sampled binding: a linear filtering sampler for
//! color images and a comparison sampler for depth images. Both are created
//! at context initialization and live as long as the context.

use std::fmt::Debug;

use ash::{prelude::VkResult, vk};

use crate::{
    device::{Device, HasDevice},
    utils::AsVkHandle,
};

pub struct Sampler {
    device: Device,
    handle: vk::Sampler,
}
impl Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.handle.fmt(f)
    }
}
impl HasDevice for Sampler {
    fn device(&self) -> &Device {
        &self.device
    }
}

impl Sampler {
    fn new(device: Device, compare_op: vk::CompareOp, anisotropy: bool) -> VkResult<Self> {
        let info = vk::SamplerCreateInfo {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            anisotropy_enable: if anisotropy { vk::TRUE } else { vk::FALSE },
            max_anisotropy: 4.0,
            compare_enable: if compare_op == vk::CompareOp::NEVER {
                vk::FALSE
            } else {
                vk::TRUE
            },
            compare_op,
            max_lod: vk::LOD_CLAMP_NONE,
            ..Default::default()
        };
        let handle = unsafe { device.create_sampler(&info, None) }?;
        Ok(Self { device, handle })
    }

    /// Linear filtering sampler for color images.
    pub(crate) fn image(device: Device, anisotropy: bool) -> VkResult<Self> {
        Self::new(device, vk::CompareOp::NEVER, anisotropy)
    }

    /// Comparison sampler for depth images.
    pub(crate) fn depth(device: Device, anisotropy: bool) -> VkResult<Self> {
        Self::new(device, vk::CompareOp::LESS, anisotropy)
    }
}

impl AsVkHandle for Sampler {
    type Handle = vk::Sampler;

    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}
impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.destroy_sampler(self.handle, None) }
    }
}
