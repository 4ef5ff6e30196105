//! Instance creation.
//!
//! The [`Instance`] is the connection to the Vulkan loader. It is created once
//! by [`Context::new`](crate::context::Context::new) and shared by reference
//! count into every physical device and logical device handle.

use std::{
    borrow::Cow,
    ffi::CStr,
    ops::Deref,
    sync::Arc,
};

use ash::vk;

use crate::error::Result;

/// A reference-counted Vulkan instance.
///
/// The instance is destroyed when the last handle referencing it is dropped.
/// Physical and logical devices retain a clone, so the instance always
/// outlives them.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);
impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Instance {}

struct InstanceInner {
    entry: ash::Entry,
    instance: ash::Instance,
}

/// Configuration for instance creation.
pub struct InstanceConfig {
    /// The application name, shown in debugging tools.
    pub application_name: Cow<'static, CStr>,
    /// The Vulkan API version to request.
    pub api_version: u32,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            application_name: Cow::Borrowed(c"scoria"),
            api_version: vk::API_VERSION_1_3,
        }
    }
}

impl InstanceConfig {
    pub fn application_name(mut self, name: &'static CStr) -> Self {
        self.application_name = Cow::Borrowed(name);
        self
    }
    pub fn api_version(mut self, version: u32) -> Self {
        self.api_version = version;
        self
    }
}

impl Instance {
    /// Loads the Vulkan library and creates an instance.
    pub fn new(config: &InstanceConfig) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|_| vk::Result::ERROR_INITIALIZATION_FAILED)?;
        let application_info = vk::ApplicationInfo {
            p_application_name: config.application_name.as_ptr(),
            api_version: config.api_version,
            ..Default::default()
        };
        let create_info = vk::InstanceCreateInfo {
            p_application_info: &application_info,
            ..Default::default()
        };
        // Safety: no host synchronization rules for vkCreateInstance.
        let instance = unsafe { entry.create_instance(&create_info, None)? };
        tracing::info!(instance = ?instance.handle(), "create instance");
        Ok(Self(Arc::new(InstanceInner { entry, instance })))
    }

    /// Returns the Vulkan entry point.
    pub fn entry(&self) -> &ash::Entry {
        &self.0.entry
    }
}

impl Deref for Instance {
    type Target = ash::Instance;

    fn deref(&self) -> &Self::Target {
        &self.0.instance
    }
}

impl Drop for InstanceInner {
    fn drop(&mut self) {
        tracing::info!(instance = ?self.instance.handle(), "drop instance");
        // Safety: we have &mut self and therefore exclusive control of the
        // instance. Physical devices retain an Arc to the instance, so none
        // remain alive at this point.
        unsafe {
            self.instance.destroy_instance(None);
        }
    }
}
