//! The context: root object binding a chosen device, its queues, the memory
//! allocator, and pooled transient objects.
//!
//! Command pools, timestamp query pools, and descriptor sets are recycled
//! through keyed free lists. A lease acquired from the context returns its
//! object to the free list on drop; pooled handles are destroyed when the
//! context itself is dropped.

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    alloc::Allocator,
    device::{Device, HasDevice, Queue},
    error::{Error, Result},
    instance::{Instance, InstanceConfig},
    physical_device::{self, QueueRole},
    sampler::Sampler,
    task::ResourceType,
    utils::AsVkHandle,
};

/// Root object of the object graph. Reference-counted; every resource built
/// from a context retains a clone, so the context outlives all of them.
#[derive(Clone)]
pub struct Context(Arc<ContextInner>);
impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Context {}

struct ContextInner {
    label: String,
    device_index: u32,
    image_sampler: Sampler,
    depth_sampler: Sampler,
    pools: Mutex<Pools>,
    set_layouts: Mutex<BTreeMap<Vec<ResourceType>, vk::DescriptorSetLayout>>,
    allocator: Allocator,
    device: Device,
    instance: Instance,
}

#[derive(Default)]
struct Pools {
    command: BTreeMap<u32, Vec<vk::CommandPool>>,
    query: Vec<vk::QueryPool>,
    descriptor: BTreeMap<Vec<ResourceType>, Vec<(vk::DescriptorPool, vk::DescriptorSet)>>,
}

impl HasDevice for Context {
    fn device(&self) -> &Device {
        &self.0.device
    }
}

impl Context {
    /// Selects the physical device at `device_index` and builds the full
    /// context: logical device, queues, allocator, and samplers.
    pub fn new(device_index: u32, label: &str) -> Result<Self> {
        let instance = Instance::new(&InstanceConfig::default())?;
        let physical_devices = instance.enumerate_physical_devices()?;
        let count = physical_devices.len() as u32;
        let physical_device = physical_devices
            .into_iter()
            .nth(device_index as usize)
            .ok_or_else(|| {
                tracing::error!(index = device_index, count, "device index out of range");
                Error::DeviceUnavailable {
                    index: device_index,
                    count,
                }
            })?;
        tracing::info!(
            label,
            device = physical_device.name(),
            "create context"
        );

        let anisotropy = physical_device.supported_features().sampler_anisotropy == vk::TRUE;
        let device = Device::new(physical_device)?;
        let allocator = Allocator::new(device.clone())?;
        let image_sampler = Sampler::image(device.clone(), anisotropy)?;
        let depth_sampler = Sampler::depth(device.clone(), anisotropy)?;

        Ok(Self(Arc::new(ContextInner {
            label: label.to_owned(),
            device_index,
            image_sampler,
            depth_sampler,
            pools: Mutex::new(Pools::default()),
            set_layouts: Mutex::new(BTreeMap::new()),
            allocator,
            device,
            instance,
        })))
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    pub fn device_index(&self) -> u32 {
        self.0.device_index
    }

    pub fn instance(&self) -> &Instance {
        &self.0.instance
    }

    pub fn allocator(&self) -> &Allocator {
        &self.0.allocator
    }

    pub fn queue(&self, role: QueueRole) -> Queue {
        self.0.device.queue(role)
    }

    pub(crate) fn image_sampler(&self) -> &Sampler {
        &self.0.image_sampler
    }

    pub(crate) fn depth_sampler(&self) -> &Sampler {
        &self.0.depth_sampler
    }

    /// Describes the device at `index` as seen through this context's
    /// instance. Empty when the index is out of range.
    pub fn describe_device(&self, index: u32) -> String {
        physical_device::describe_device(&self.0.instance, index)
    }

    /// Borrows a command pool for `family` from the free list, resetting it,
    /// or creates a fresh one.
    pub(crate) fn acquire_command_pool(&self, family: u32) -> Result<CommandPoolLease> {
        let reused = self
            .0
            .pools
            .lock()
            .unwrap()
            .command
            .get_mut(&family)
            .and_then(|list| list.pop());
        let pool = match reused {
            Some(pool) => {
                unsafe {
                    self.0.device.reset_command_pool(
                        pool,
                        vk::CommandPoolResetFlags::RELEASE_RESOURCES,
                    )?;
                }
                pool
            }
            None => unsafe {
                self.0.device.create_command_pool(
                    &vk::CommandPoolCreateInfo {
                        queue_family_index: family,
                        ..Default::default()
                    },
                    None,
                )?
            },
        };
        Ok(CommandPoolLease {
            ctx: self.clone(),
            family,
            pool,
        })
    }

    /// Borrows a two-query timestamp pool.
    pub(crate) fn acquire_query_pool(&self) -> Result<QueryPoolLease> {
        let reused = self.0.pools.lock().unwrap().query.pop();
        let pool = match reused {
            Some(pool) => pool,
            None => unsafe {
                self.0.device.create_query_pool(
                    &vk::QueryPoolCreateInfo {
                        query_type: vk::QueryType::TIMESTAMP,
                        query_count: 2,
                        ..Default::default()
                    },
                    None,
                )?
            },
        };
        Ok(QueryPoolLease {
            ctx: self.clone(),
            pool,
        })
    }

    /// Returns the cached descriptor set layout for a resource-type
    /// signature, creating it on first use.
    pub(crate) fn descriptor_set_layout(
        &self,
        signature: &[ResourceType],
    ) -> Result<vk::DescriptorSetLayout> {
        let mut layouts = self.0.set_layouts.lock().unwrap();
        if let Some(&layout) = layouts.get(signature) {
            return Ok(layout);
        }
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = signature
            .iter()
            .enumerate()
            .map(|(i, ty)| vk::DescriptorSetLayoutBinding {
                binding: i as u32,
                descriptor_type: ty.descriptor_type(),
                descriptor_count: 1,
                stage_flags: vk::ShaderStageFlags::ALL_GRAPHICS | vk::ShaderStageFlags::COMPUTE,
                ..Default::default()
            })
            .collect();
        let layout = unsafe {
            self.0.device.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings),
                None,
            )?
        };
        layouts.insert(signature.to_vec(), layout);
        Ok(layout)
    }

    /// Borrows a descriptor set matching `signature` from the free list, or
    /// allocates one from a fresh single-set pool.
    pub(crate) fn acquire_descriptor_set(
        &self,
        signature: &[ResourceType],
    ) -> Result<DescriptorSetLease> {
        let reused = self
            .0
            .pools
            .lock()
            .unwrap()
            .descriptor
            .get_mut(signature)
            .and_then(|list| list.pop());
        let (pool, set) = match reused {
            Some(entry) => entry,
            None => {
                let layout = self.descriptor_set_layout(signature)?;
                let mut sizes: SmallVec<[vk::DescriptorPoolSize; 4]> = SmallVec::new();
                for ty in signature {
                    let descriptor_type = ty.descriptor_type();
                    match sizes.iter_mut().find(|s| s.ty == descriptor_type) {
                        Some(size) => size.descriptor_count += 1,
                        None => sizes.push(vk::DescriptorPoolSize {
                            ty: descriptor_type,
                            descriptor_count: 1,
                        }),
                    }
                }
                unsafe {
                    let pool = self.0.device.create_descriptor_pool(
                        &vk::DescriptorPoolCreateInfo {
                            max_sets: 1,
                            ..Default::default()
                        }
                        .pool_sizes(&sizes),
                        None,
                    )?;
                    let sets = self.0.device.allocate_descriptor_sets(
                        &vk::DescriptorSetAllocateInfo {
                            descriptor_pool: pool,
                            ..Default::default()
                        }
                        .set_layouts(&[layout]),
                    )?;
                    (pool, sets[0])
                }
            }
        };
        Ok(DescriptorSetLease {
            ctx: self.clone(),
            signature: signature.to_vec(),
            pool,
            set,
        })
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        tracing::info!(label = self.label, "drop context");
        let pools = self.pools.get_mut().unwrap();
        unsafe {
            for (_, list) in pools.command.iter() {
                for &pool in list {
                    self.device.destroy_command_pool(pool, None);
                }
            }
            for &pool in &pools.query {
                self.device.destroy_query_pool(pool, None);
            }
            for (_, list) in pools.descriptor.iter() {
                for &(pool, _) in list {
                    self.device.destroy_descriptor_pool(pool, None);
                }
            }
            for (_, &layout) in self.set_layouts.get_mut().unwrap().iter() {
                self.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

/// A command pool borrowed from the context, returned on drop.
pub(crate) struct CommandPoolLease {
    ctx: Context,
    family: u32,
    pool: vk::CommandPool,
}
impl CommandPoolLease {
    /// Allocates a fresh primary command buffer from the leased pool. The
    /// buffer is reclaimed when the pool is reset on reuse.
    pub fn allocate_buffer(&self) -> Result<vk::CommandBuffer> {
        let buffers = unsafe {
            self.ctx.device().allocate_command_buffers(
                &vk::CommandBufferAllocateInfo {
                    command_pool: self.pool,
                    level: vk::CommandBufferLevel::PRIMARY,
                    command_buffer_count: 1,
                    ..Default::default()
                },
            )?
        };
        Ok(buffers[0])
    }
}
impl AsVkHandle for CommandPoolLease {
    type Handle = vk::CommandPool;
    fn vk_handle(&self) -> Self::Handle {
        self.pool
    }
}
impl Drop for CommandPoolLease {
    fn drop(&mut self) {
        self.ctx
            .0
            .pools
            .lock()
            .unwrap()
            .command
            .entry(self.family)
            .or_default()
            .push(self.pool);
    }
}

/// A timestamp query pool borrowed from the context, returned on drop.
pub(crate) struct QueryPoolLease {
    ctx: Context,
    pool: vk::QueryPool,
}
impl AsVkHandle for QueryPoolLease {
    type Handle = vk::QueryPool;
    fn vk_handle(&self) -> Self::Handle {
        self.pool
    }
}
impl Drop for QueryPoolLease {
    fn drop(&mut self) {
        self.ctx.0.pools.lock().unwrap().query.push(self.pool);
    }
}

/// A descriptor set (and its single-set pool) borrowed from the context,
/// returned to the free list keyed by signature on drop.
pub(crate) struct DescriptorSetLease {
    ctx: Context,
    signature: Vec<ResourceType>,
    pool: vk::DescriptorPool,
    set: vk::DescriptorSet,
}
impl DescriptorSetLease {
    pub fn set(&self) -> vk::DescriptorSet {
        self.set
    }
}
impl Drop for DescriptorSetLease {
    fn drop(&mut self) {
        self.ctx
            .0
            .pools
            .lock()
            .unwrap()
            .descriptor
            .entry(std::mem::take(&mut self.signature))
            .or_default()
            .push((self.pool, self.set));
    }
}
