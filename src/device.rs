//! Logical device creation.

use std::{collections::BTreeMap, fmt::Debug, ops::Deref, sync::Arc};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    error::{Error, Result},
    instance::Instance,
    physical_device::{PhysicalDevice, QueueRole},
    utils::AsVkHandle,
};

/// A trait for types created from a logical device.
pub trait HasDevice {
    /// Returns a reference to the Vulkan device.
    fn device(&self) -> &Device;

    fn physical_device(&self) -> &PhysicalDevice {
        self.device().physical_device()
    }

    fn instance(&self) -> &Instance {
        self.device().physical_device().instance()
    }
}

/// A queue retrieved from the device, together with its family index.
#[derive(Clone, Copy, Debug)]
pub struct Queue {
    pub(crate) handle: vk::Queue,
    pub(crate) family_index: u32,
}
impl Queue {
    pub fn family_index(&self) -> u32 {
        self.family_index
    }
}
impl AsVkHandle for Queue {
    type Handle = vk::Queue;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}

/// A reference-counted Vulkan logical device.
///
/// Dereferences to [`ash::Device`] so raw Vulkan entry points remain
/// reachable. One queue per role is retrieved at creation; roles may share a
/// queue on devices with a single universal family.
#[derive(Clone)]
pub struct Device(Arc<DeviceInner>);
impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Device {}
impl Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Device")
            .field(&self.0.device.handle())
            .finish()
    }
}

struct DeviceInner {
    physical_device: PhysicalDevice,
    device: ash::Device,
    queues: BTreeMap<u32, vk::Queue>,
    graphics_family: u32,
    compute_family: u32,
    transfer_family: u32,
}

fn feature_unsupported(feature: &'static str) -> Error {
    tracing::error!(feature, "required device feature unsupported");
    Error::FeatureUnsupported(feature)
}

impl Device {
    /// Creates a logical device with one queue for each role.
    ///
    /// Synchronization2 is required and enabled through the Vulkan 1.3
    /// feature chain. Anisotropic filtering is enabled when supported.
    pub fn new(physical_device: PhysicalDevice) -> Result<Self> {
        let api_version = physical_device.properties().api_version;
        if vk::api_version_major(api_version) == 1 && vk::api_version_minor(api_version) < 3 {
            return Err(feature_unsupported("Vulkan 1.3"));
        }

        let graphics_family = physical_device
            .select_queue_family(QueueRole::Graphics)
            .ok_or_else(|| feature_unsupported("graphics queue"))?;
        let compute_family = physical_device
            .select_queue_family(QueueRole::Compute)
            .ok_or_else(|| feature_unsupported("compute queue"))?;
        let transfer_family = physical_device
            .select_queue_family(QueueRole::Transfer)
            .ok_or_else(|| feature_unsupported("transfer queue"))?;

        let mut families: SmallVec<[u32; 3]> = SmallVec::new();
        for family in [graphics_family, compute_family, transfer_family] {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        let priority = 1.0f32;
        let queue_create_infos: SmallVec<[vk::DeviceQueueCreateInfo; 3]> = families
            .iter()
            .map(|&family| vk::DeviceQueueCreateInfo {
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: &priority,
                ..Default::default()
            })
            .collect();

        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: physical_device.supported_features().sampler_anisotropy,
            ..Default::default()
        };
        let mut vulkan13 = vk::PhysicalDeviceVulkan13Features {
            synchronization2: vk::TRUE,
            ..Default::default()
        };
        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_features(&features)
            .push_next(&mut vulkan13);

        let device = unsafe {
            physical_device.instance().create_device(
                physical_device.vk_handle(),
                &create_info,
                None,
            )?
        };
        tracing::info!(
            device = ?device.handle(),
            name = physical_device.name(),
            "create device"
        );

        let queues: BTreeMap<u32, vk::Queue> = families
            .iter()
            .map(|&family| (family, unsafe { device.get_device_queue(family, 0) }))
            .collect();

        Ok(Self(Arc::new(DeviceInner {
            physical_device,
            device,
            queues,
            graphics_family,
            compute_family,
            transfer_family,
        })))
    }

    pub fn physical_device(&self) -> &PhysicalDevice {
        &self.0.physical_device
    }

    pub fn instance(&self) -> &Instance {
        self.0.physical_device.instance()
    }

    /// Returns the queue serving `role`.
    pub fn queue(&self, role: QueueRole) -> Queue {
        let family_index = self.queue_family(role);
        Queue {
            handle: self.0.queues[&family_index],
            family_index,
        }
    }

    /// Returns the queue family index serving `role`.
    pub fn queue_family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics => self.0.graphics_family,
            QueueRole::Compute => self.0.compute_family,
            QueueRole::Transfer => self.0.transfer_family,
        }
    }
}

impl Deref for Device {
    type Target = ash::Device;

    fn deref(&self) -> &Self::Target {
        &self.0.device
    }
}
impl AsVkHandle for Device {
    type Handle = vk::Device;

    fn vk_handle(&self) -> Self::Handle {
        self.0.device.handle()
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        tracing::info!(device = ?self.device.handle(), "drop device");
        // Safety: we have &mut self and therefore exclusive control of the
        // device. Every child object retains an Arc to the device, so none
        // remain alive at this point.
        unsafe {
            self.device.destroy_device(None);
        }
    }
}
