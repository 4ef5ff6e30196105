//! Physical device enumeration and queue family selection.

use std::{ops::Deref, sync::Arc};

use ash::vk;

use crate::{instance::Instance, utils::AsVkHandle};

/// Queue roles assignable to an invocation.
///
/// The three roles may resolve to the same queue family on devices that
/// expose a single universal queue.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum QueueRole {
    Graphics,
    Compute,
    Transfer,
}

/// A physical device enumerated from an [`Instance`], with its properties
/// queried once and cached.
#[derive(Clone)]
pub struct PhysicalDevice(Arc<PhysicalDeviceInner>);
impl PartialEq for PhysicalDevice {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for PhysicalDevice {}

struct PhysicalDeviceInner {
    instance: Instance,
    physical_device: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    queue_families: Vec<vk::QueueFamilyProperties>,
    features: vk::PhysicalDeviceFeatures,
}

impl Instance {
    /// Enumerates the physical devices visible through this instance.
    pub fn enumerate_physical_devices(&self) -> ash::prelude::VkResult<Vec<PhysicalDevice>> {
        let pdevices = unsafe { self.deref().enumerate_physical_devices()? };
        Ok(pdevices
            .into_iter()
            .map(|pdevice| {
                let properties = unsafe { self.get_physical_device_properties(pdevice) };
                let memory_properties =
                    unsafe { self.get_physical_device_memory_properties(pdevice) };
                let queue_families =
                    unsafe { self.get_physical_device_queue_family_properties(pdevice) };
                let features = unsafe { self.get_physical_device_features(pdevice) };
                PhysicalDevice(Arc::new(PhysicalDeviceInner {
                    instance: self.clone(),
                    physical_device: pdevice,
                    properties,
                    memory_properties,
                    queue_families,
                    features,
                }))
            })
            .collect())
    }
}

impl AsVkHandle for PhysicalDevice {
    type Handle = vk::PhysicalDevice;
    fn vk_handle(&self) -> Self::Handle {
        self.0.physical_device
    }
}

impl PhysicalDevice {
    /// Returns the instance this physical device was enumerated from.
    pub fn instance(&self) -> &Instance {
        &self.0.instance
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.0.properties
    }

    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.0.memory_properties
    }

    pub fn queue_families(&self) -> &[vk::QueueFamilyProperties] {
        &self.0.queue_families
    }

    pub fn supported_features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.0.features
    }

    /// Returns the device name as a lossy UTF-8 string.
    pub fn name(&self) -> String {
        self.0
            .properties
            .device_name_as_c_str()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Nanoseconds per timestamp tick.
    pub fn timestamp_period(&self) -> f32 {
        self.0.properties.limits.timestamp_period
    }

    /// Picks the queue family best suited for `role`.
    ///
    /// Families are searched from most capable to least, so a device exposing
    /// a dedicated transfer family still resolves every role when it has only
    /// one universal family. Transfer work is accepted on any family that
    /// supports graphics, compute, or transfer operations.
    pub fn select_queue_family(&self, role: QueueRole) -> Option<u32> {
        let accepts = |flags: vk::QueueFlags| match role {
            QueueRole::Graphics => flags.contains(vk::QueueFlags::GRAPHICS),
            QueueRole::Compute => flags.contains(vk::QueueFlags::COMPUTE),
            QueueRole::Transfer => flags.intersects(
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
            ),
        };
        let mut candidates: Vec<(u32, u32)> = self
            .0
            .queue_families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0 && accepts(family.queue_flags))
            .map(|(i, family)| (i as u32, family.queue_flags.as_raw().count_ones()))
            .collect();
        candidates.sort_by_key(|&(_, popcount)| std::cmp::Reverse(popcount));
        candidates.first().map(|&(i, _)| i)
    }
}

/// Returns a human-readable description of the device at `index`, or an empty
/// string when the index exceeds the device count.
pub fn describe_device(instance: &Instance, index: u32) -> String {
    let Ok(devices) = instance.enumerate_physical_devices() else {
        return String::new();
    };
    let Some(device) = devices.get(index as usize) else {
        return String::new();
    };
    let properties = device.properties();
    let ty = match properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => "discrete",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "integrated",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "virtual",
        vk::PhysicalDeviceType::CPU => "cpu",
        _ => "other",
    };
    format!(
        "{} ({}; api {}.{}.{})",
        device.name(),
        ty,
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version),
    )
}
