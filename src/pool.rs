//! Resource pools: the bindable slot table of one task.
//!
//! A [`ResourcePool`] wraps one descriptor set allocated against the task's
//! resource-type signature. [`ResourcePool::bind`] validates the view kind
//! against the slot's declared type and writes the descriptor immediately;
//! the bound views are remembered so invocation lowering can emit barriers
//! for them.

use std::sync::{Arc, Mutex};

use ash::vk;

use crate::{
    context::DescriptorSetLease,
    device::HasDevice,
    error::{Error, Result},
    image::{ResourceView, ViewKind},
    task::{ResourceType, Task},
    utils::AsVkHandle,
};

/// Whether a view kind satisfies a slot's declared resource type.
///
/// Sampled slots accept both color and depth views; depth views bind with
/// the comparison sampler.
pub(crate) fn compatible(expected: ResourceType, kind: ViewKind) -> bool {
    match (expected, kind) {
        (ResourceType::UniformBuffer | ResourceType::StorageBuffer, ViewKind::Buffer) => true,
        (ResourceType::SampledImage, ViewKind::Image | ViewKind::DepthImage) => true,
        (ResourceType::StorageImage, ViewKind::Image) => true,
        _ => false,
    }
}

/// A descriptor set allocated against one task.
#[derive(Clone)]
pub struct ResourcePool(Arc<ResourcePoolInner>);

struct ResourcePoolInner {
    task: Task,
    lease: DescriptorSetLease,
    bound: Mutex<Vec<Option<ResourceView>>>,
}

impl ResourcePool {
    pub(crate) fn new(task: &Task) -> Result<Self> {
        let lease = task.context().acquire_descriptor_set(task.signature())?;
        let bound = vec![None; task.signature().len()];
        Ok(Self(Arc::new(ResourcePoolInner {
            task: task.clone(),
            lease,
            bound: Mutex::new(bound),
        })))
    }

    pub fn task(&self) -> &Task {
        &self.0.task
    }

    pub(crate) fn set(&self) -> vk::DescriptorSet {
        self.0.lease.set()
    }

    /// The views currently bound, paired with their slot's resource type.
    /// Unbound slots are skipped.
    pub(crate) fn bound_views(&self) -> Vec<(ResourceType, ResourceView)> {
        self.0
            .bound
            .lock()
            .unwrap()
            .iter()
            .zip(self.0.task.signature())
            .filter_map(|(view, &ty)| view.clone().map(|view| (ty, view)))
            .collect()
    }

    /// Binds `view` to `slot`, writing the descriptor.
    ///
    /// Fails with [`Error::InvalidBinding`] when the view kind does not match
    /// the slot's declared resource type.
    pub fn bind(&self, slot: u32, view: impl Into<ResourceView>) -> Result<()> {
        let view = view.into();
        let signature = self.0.task.signature();
        assert!((slot as usize) < signature.len(), "slot out of range");
        let expected = signature[slot as usize];
        if !compatible(expected, view.view_kind()) {
            tracing::error!(slot, ?expected, got = view.kind(), "incompatible binding");
            return Err(Error::InvalidBinding {
                slot,
                expected,
                got: view.kind(),
            });
        }

        let ctx = self.0.task.context();
        let write = vk::WriteDescriptorSet {
            dst_set: self.0.lease.set(),
            dst_binding: slot,
            descriptor_count: 1,
            descriptor_type: expected.descriptor_type(),
            ..Default::default()
        };
        let buffer_info;
        let image_info;
        let write = match &view {
            ResourceView::Buffer(buffer_view) => {
                buffer_info = vk::DescriptorBufferInfo {
                    buffer: buffer_view.buffer().vk_handle(),
                    offset: buffer_view.offset(),
                    range: buffer_view.size(),
                };
                write.buffer_info(std::slice::from_ref(&buffer_info))
            }
            ResourceView::Image(image_view) => {
                image_info = vk::DescriptorImageInfo {
                    sampler: ctx.image_sampler().vk_handle(),
                    image_view: image_view.image().vk_view(),
                    image_layout: match expected {
                        ResourceType::StorageImage => vk::ImageLayout::GENERAL,
                        _ => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    },
                };
                write.image_info(std::slice::from_ref(&image_info))
            }
            ResourceView::DepthImage(depth_view) => {
                image_info = vk::DescriptorImageInfo {
                    sampler: ctx.depth_sampler().vk_handle(),
                    image_view: depth_view.image().vk_view(),
                    image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                };
                write.image_info(std::slice::from_ref(&image_info))
            }
        };
        unsafe {
            ctx.device().update_descriptor_sets(&[write], &[]);
        }
        self.0.bound.lock().unwrap()[slot as usize] = Some(view);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_compatibility() {
        let kinds = [ViewKind::Buffer, ViewKind::Image, ViewKind::DepthImage];
        let table: [(ResourceType, [bool; 3]); 4] = [
            (ResourceType::UniformBuffer, [true, false, false]),
            (ResourceType::StorageBuffer, [true, false, false]),
            (ResourceType::SampledImage, [false, true, true]),
            (ResourceType::StorageImage, [false, true, false]),
        ];
        for (ty, expected) in table {
            for (&kind, &ok) in kinds.iter().zip(&expected) {
                assert_eq!(compatible(ty, kind), ok, "{ty:?} against {kind:?}");
            }
        }
    }
}
