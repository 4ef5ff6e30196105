//! Invocations: declarative, immutable descriptions of recordable GPU work.
//!
//! An [`Invocation`] is built once from an [`InvocationConfig`] and recorded
//! lazily at submission time. It owns every resource pool and view it
//! references, so nothing it touches can be destroyed while a submission is
//! in flight. Recording derives pipeline barriers from each resource's
//! tracked state; a timed invocation brackets its work with timestamps read
//! back through [`Invocation::elapsed_us`].

use std::sync::Arc;

use ash::vk;
use smallvec::SmallVec;

use crate::{
    buffer::BufferView,
    context::{Context, QueryPoolLease},
    device::{Device, HasDevice},
    error::Result,
    image::{DepthImageView, ImageView, ResourceView},
    pass::{Framebuffer, RenderPass},
    physical_device::QueueRole,
    pool::ResourcePool,
    task::ResourceType,
    tracking::{Access, MemoryBarrier, ResourceState},
    utils::AsVkHandle,
};

/// The more capable of two queue roles; composites submit to the most
/// capable queue their children need.
pub(crate) fn merge_roles(a: QueueRole, b: QueueRole) -> QueueRole {
    fn rank(role: QueueRole) -> u8 {
        match role {
            QueueRole::Transfer => 0,
            QueueRole::Compute => 1,
            QueueRole::Graphics => 2,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

/// Copy extents with zero height or depth clamp to 1.
pub(crate) fn copy_extent(width: u32, height: u32) -> vk::Extent3D {
    vk::Extent3D {
        width,
        height: height.max(1),
        depth: 1,
    }
}

enum Work {
    Transfer {
        src: ResourceView,
        dst: ResourceView,
    },
    Compute {
        pool: ResourcePool,
        count: [u32; 3],
    },
    Graphics {
        pool: ResourcePool,
        vertex_buffers: Vec<BufferView>,
        index_buffer: Option<BufferView>,
        vertex_count: u32,
        instance_count: u32,
    },
    Pass {
        pass: RenderPass,
        attachments: Vec<ResourceView>,
        children: Vec<Invocation>,
    },
    Composite {
        children: Vec<Invocation>,
    },
}

/// Invocation creation parameters.
pub struct InvocationConfig {
    label: String,
    timed: bool,
    work: Work,
}

impl InvocationConfig {
    /// A copy from `src` to `dst`. The view kinds select buffer-buffer,
    /// buffer-image, image-buffer, or image-image copies.
    pub fn transfer(src: ResourceView, dst: ResourceView) -> Self {
        Self {
            label: String::new(),
            timed: false,
            work: Work::Transfer { src, dst },
        }
    }

    /// A compute dispatch of `count` workgroups using the pool's task.
    pub fn compute(pool: &ResourcePool, count: [u32; 3]) -> Self {
        Self {
            label: String::new(),
            timed: false,
            work: Work::Compute {
                pool: pool.clone(),
                count,
            },
        }
    }

    /// A draw of `vertex_count` vertices using the pool's graphics task.
    /// Only valid inside a pass invocation.
    pub fn graphics(pool: &ResourcePool, vertex_count: u32) -> Self {
        Self {
            label: String::new(),
            timed: false,
            work: Work::Graphics {
                pool: pool.clone(),
                vertex_buffers: Vec::new(),
                index_buffer: None,
                vertex_count,
                instance_count: 1,
            },
        }
    }

    /// A render-pass scope binding `attachments` and recording `children`,
    /// which must all be graphics invocations (or composites of them).
    pub fn pass(
        pass: &RenderPass,
        attachments: Vec<ResourceView>,
        children: Vec<Invocation>,
    ) -> Self {
        Self {
            label: String::new(),
            timed: false,
            work: Work::Pass {
                pass: pass.clone(),
                attachments,
                children,
            },
        }
    }

    /// An ordered list of invocations recorded back to back.
    pub fn composite(children: Vec<Invocation>) -> Self {
        Self {
            label: String::new(),
            timed: false,
            work: Work::Composite { children },
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Brackets the recorded work with timestamps.
    pub fn timed(mut self) -> Self {
        self.timed = true;
        self
    }

    pub fn vertex_buffer(mut self, view: BufferView) -> Self {
        match &mut self.work {
            Work::Graphics { vertex_buffers, .. } => vertex_buffers.push(view),
            _ => panic!("vertex buffers only apply to graphics invocations"),
        }
        self
    }

    pub fn index_buffer(mut self, view: BufferView) -> Self {
        match &mut self.work {
            Work::Graphics { index_buffer, .. } => *index_buffer = Some(view),
            _ => panic!("an index buffer only applies to graphics invocations"),
        }
        self
    }

    pub fn instance_count(mut self, count: u32) -> Self {
        match &mut self.work {
            Work::Graphics { instance_count, .. } => *instance_count = count,
            _ => panic!("an instance count only applies to graphics invocations"),
        }
        self
    }

    /// Seals the description. A timed invocation borrows a timestamp query
    /// pool from the context here.
    pub fn build(self, ctx: &Context) -> Result<Invocation> {
        if let Work::Pass { children, .. } = &self.work {
            for child in children {
                assert!(
                    child.is_graphics_only(),
                    "pass children must be graphics invocations"
                );
            }
        }
        let query = if self.timed {
            Some(ctx.acquire_query_pool()?)
        } else {
            None
        };
        Ok(Invocation(Arc::new(InvocationInner {
            ctx: ctx.clone(),
            label: self.label,
            work: self.work,
            query,
        })))
    }
}

/// An immutable description of recordable GPU work.
#[derive(Clone)]
pub struct Invocation(Arc<InvocationInner>);

struct InvocationInner {
    ctx: Context,
    label: String,
    work: Work,
    query: Option<QueryPoolLease>,
}

impl HasDevice for Invocation {
    fn device(&self) -> &Device {
        self.0.ctx.device()
    }
}

impl Invocation {
    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    fn is_graphics_only(&self) -> bool {
        match &self.0.work {
            Work::Graphics { .. } => true,
            Work::Composite { children } => children.iter().all(Invocation::is_graphics_only),
            _ => false,
        }
    }

    /// The queue this invocation must be submitted to. Composites take the
    /// most capable role their children need.
    pub(crate) fn queue_role(&self) -> QueueRole {
        match &self.0.work {
            Work::Transfer { .. } => QueueRole::Transfer,
            Work::Compute { .. } => QueueRole::Compute,
            Work::Graphics { .. } | Work::Pass { .. } => QueueRole::Graphics,
            Work::Composite { children } => children
                .iter()
                .map(Invocation::queue_role)
                .fold(QueueRole::Transfer, merge_roles),
        }
    }

    /// True when submission flattens this invocation into its children.
    pub(crate) fn flattens(&self) -> bool {
        matches!(&self.0.work, Work::Composite { children } if !children.is_empty())
    }

    /// Splits the invocation into runs of children sharing a queue role.
    /// Non-composite invocations form a single segment.
    pub(crate) fn segments(&self) -> Vec<(QueueRole, Vec<Invocation>)> {
        let children = match &self.0.work {
            Work::Composite { children } if !children.is_empty() => children,
            _ => return vec![(self.queue_role(), vec![self.clone()])],
        };
        let mut segments: Vec<(QueueRole, Vec<Invocation>)> = Vec::new();
        for child in children {
            let role = child.queue_role();
            match segments.last_mut() {
                Some((last_role, list)) if *last_role == role => list.push(child.clone()),
                _ => segments.push((role, vec![child.clone()])),
            }
        }
        segments
    }

    pub(crate) fn query(&self) -> Option<&QueryPoolLease> {
        self.0.query.as_ref()
    }

    /// Microseconds between the two timestamps of a timed invocation. Blocks
    /// until the results are available.
    pub fn elapsed_us(&self) -> Result<f64> {
        let query = self.0.query.as_ref().expect("invocation was not timed");
        let mut timestamps = [0u64; 2];
        unsafe {
            self.0.ctx.device().get_query_pool_results(
                query.vk_handle(),
                0,
                &mut timestamps,
                vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
            )?;
        }
        let period = self.0.ctx.device().physical_device().timestamp_period() as f64;
        Ok((timestamps[1] - timestamps[0]) as f64 * period / 1000.0)
    }

    /// Records the invocation into `cmd`, emitting barriers derived from the
    /// tracked state of every touched resource.
    pub(crate) fn record(&self, cmd: vk::CommandBuffer) -> Result<()> {
        let device = self.0.ctx.device().clone();
        if let Some(query) = &self.0.query {
            unsafe {
                device.cmd_reset_query_pool(cmd, query.vk_handle(), 0, 2);
                device.cmd_write_timestamp2(
                    cmd,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    query.vk_handle(),
                    0,
                );
            }
        }
        self.record_work(cmd)?;
        if let Some(query) = &self.0.query {
            unsafe {
                device.cmd_write_timestamp2(
                    cmd,
                    vk::PipelineStageFlags2::ALL_COMMANDS,
                    query.vk_handle(),
                    1,
                );
            }
        }
        Ok(())
    }

    fn record_work(&self, cmd: vk::CommandBuffer) -> Result<()> {
        tracing::debug!(label = self.0.label, "record invocation");
        match &self.0.work {
            Work::Transfer { src, dst } => self.record_transfer(cmd, src, dst),
            Work::Compute { pool, count } => self.record_compute(cmd, pool, *count),
            Work::Graphics { .. } => {
                panic!("graphics invocations must be recorded inside a pass")
            }
            Work::Pass {
                pass,
                attachments,
                children,
            } => self.record_pass(cmd, pass, attachments, children),
            Work::Composite { children } => {
                for child in children {
                    child.record(cmd)?;
                }
                Ok(())
            }
        }
    }

    fn record_transfer(
        &self,
        cmd: vk::CommandBuffer,
        src: &ResourceView,
        dst: &ResourceView,
    ) -> Result<()> {
        let device = self.0.ctx.device().clone();
        match (src, dst) {
            (ResourceView::Buffer(src), ResourceView::Buffer(dst)) => {
                let read = src.buffer().state().transition(Access::COPY_READ, false);
                let write = dst.buffer().state().transition(Access::COPY_WRITE, false);
                emit_global_barrier(&device, cmd, read | write);
                unsafe {
                    device.cmd_copy_buffer(
                        cmd,
                        src.buffer().vk_handle(),
                        dst.buffer().vk_handle(),
                        &[vk::BufferCopy {
                            src_offset: src.offset(),
                            dst_offset: dst.offset(),
                            size: src.size(),
                        }],
                    );
                }
            }
            (ResourceView::Buffer(src), ResourceView::Image(dst)) => {
                let read = src.buffer().state().transition(Access::COPY_READ, false);
                emit_global_barrier(&device, cmd, read);
                transition_color_image(
                    &device,
                    cmd,
                    dst.image().vk_handle(),
                    &mut dst.image().state(),
                    Access::COPY_WRITE,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                );
                unsafe {
                    device.cmd_copy_buffer_to_image(
                        cmd,
                        src.buffer().vk_handle(),
                        dst.image().vk_handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[buffer_image_copy(src.offset(), dst)],
                    );
                }
            }
            (ResourceView::Image(src), ResourceView::Buffer(dst)) => {
                transition_color_image(
                    &device,
                    cmd,
                    src.image().vk_handle(),
                    &mut src.image().state(),
                    Access::COPY_READ,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                );
                let write = dst.buffer().state().transition(Access::COPY_WRITE, false);
                emit_global_barrier(&device, cmd, write);
                unsafe {
                    device.cmd_copy_image_to_buffer(
                        cmd,
                        src.image().vk_handle(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.buffer().vk_handle(),
                        &[buffer_image_copy(dst.offset(), src)],
                    );
                }
            }
            (ResourceView::Image(src), ResourceView::Image(dst)) => {
                transition_color_image(
                    &device,
                    cmd,
                    src.image().vk_handle(),
                    &mut src.image().state(),
                    Access::COPY_READ,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                );
                transition_color_image(
                    &device,
                    cmd,
                    dst.image().vk_handle(),
                    &mut dst.image().state(),
                    Access::COPY_WRITE,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                );
                let subresource = vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                };
                unsafe {
                    device.cmd_copy_image(
                        cmd,
                        src.image().vk_handle(),
                        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                        dst.image().vk_handle(),
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[vk::ImageCopy {
                            src_subresource: subresource,
                            src_offset: vk::Offset3D {
                                x: src.x() as i32,
                                y: src.y() as i32,
                                z: 0,
                            },
                            dst_subresource: subresource,
                            dst_offset: vk::Offset3D {
                                x: dst.x() as i32,
                                y: dst.y() as i32,
                                z: 0,
                            },
                            extent: copy_extent(src.width(), src.height()),
                        }],
                    );
                }
            }
            _ => panic!("unsupported transfer view combination"),
        }
        Ok(())
    }

    fn record_compute(
        &self,
        cmd: vk::CommandBuffer,
        pool: &ResourcePool,
        count: [u32; 3],
    ) -> Result<()> {
        let device = self.0.ctx.device().clone();
        emit_pool_barriers(&device, cmd, pool, vk::PipelineStageFlags2::COMPUTE_SHADER);
        let task = pool.task();
        unsafe {
            device.cmd_bind_pipeline(cmd, task.bind_point(), task.vk_handle());
            device.cmd_bind_descriptor_sets(
                cmd,
                task.bind_point(),
                task.vk_layout(),
                0,
                &[pool.set()],
                &[],
            );
            device.cmd_dispatch(cmd, count[0], count[1], count[2]);
        }
        Ok(())
    }

    fn record_pass(
        &self,
        cmd: vk::CommandBuffer,
        pass: &RenderPass,
        attachments: &[ResourceView],
        children: &[Invocation],
    ) -> Result<()> {
        let device = self.0.ctx.device().clone();

        // Barriers cannot be emitted inside a render pass, so attachments
        // and every resource the children touch are transitioned up front.
        for attachment in attachments {
            match attachment {
                ResourceView::Image(view) => {
                    transition_color_image(
                        &device,
                        cmd,
                        view.image().vk_handle(),
                        &mut view.image().state(),
                        Access::COLOR_ATTACHMENT,
                        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    );
                }
                ResourceView::DepthImage(view) => {
                    transition_depth_image(&device, cmd, view);
                }
                ResourceView::Buffer(_) => panic!("attachment must be an image view"),
            }
        }
        for child in children {
            child.emit_graphics_barriers(&device, cmd);
        }

        let framebuffer: Framebuffer = pass.acquire_framebuffer(attachments)?;
        unsafe {
            device.cmd_begin_render_pass(
                cmd,
                &vk::RenderPassBeginInfo {
                    render_pass: pass.vk_handle(),
                    framebuffer: framebuffer.vk_handle(),
                    render_area: vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: vk::Extent2D {
                            width: pass.width(),
                            height: pass.height(),
                        },
                    },
                    ..Default::default()
                }
                .clear_values(pass.clear_values()),
                vk::SubpassContents::INLINE,
            );
        }
        let result = children
            .iter()
            .try_for_each(|child| child.record_draws(&device, cmd));
        unsafe {
            device.cmd_end_render_pass(cmd);
        }
        // The framebuffer guard drops here, returning the handle to the pool.
        result
    }

    fn emit_graphics_barriers(&self, device: &Device, cmd: vk::CommandBuffer) {
        match &self.0.work {
            Work::Graphics {
                pool,
                vertex_buffers,
                index_buffer,
                ..
            } => {
                emit_pool_barriers(device, cmd, pool, vk::PipelineStageFlags2::ALL_GRAPHICS);
                let mut barrier = MemoryBarrier::default();
                for view in vertex_buffers {
                    barrier |= view.buffer().state().transition(Access::VERTEX_READ, false);
                }
                if let Some(view) = index_buffer {
                    barrier |= view.buffer().state().transition(Access::INDEX_READ, false);
                }
                emit_global_barrier(device, cmd, barrier);
            }
            Work::Composite { children } => {
                for child in children {
                    child.emit_graphics_barriers(device, cmd);
                }
            }
            _ => unreachable!("pass children are graphics-only"),
        }
    }

    fn record_draws(&self, device: &Device, cmd: vk::CommandBuffer) -> Result<()> {
        match &self.0.work {
            Work::Graphics {
                pool,
                vertex_buffers,
                index_buffer,
                vertex_count,
                instance_count,
            } => {
                let task = pool.task();
                unsafe {
                    device.cmd_bind_pipeline(cmd, task.bind_point(), task.vk_handle());
                    device.cmd_bind_descriptor_sets(
                        cmd,
                        task.bind_point(),
                        task.vk_layout(),
                        0,
                        &[pool.set()],
                        &[],
                    );
                    if !vertex_buffers.is_empty() {
                        let handles: SmallVec<[vk::Buffer; 4]> = vertex_buffers
                            .iter()
                            .map(|view| view.buffer().vk_handle())
                            .collect();
                        let offsets: SmallVec<[u64; 4]> =
                            vertex_buffers.iter().map(|view| view.offset()).collect();
                        device.cmd_bind_vertex_buffers(cmd, 0, &handles, &offsets);
                    }
                    if let Some(view) = index_buffer {
                        device.cmd_bind_index_buffer(
                            cmd,
                            view.buffer().vk_handle(),
                            view.offset(),
                            vk::IndexType::UINT32,
                        );
                        device.cmd_draw_indexed(cmd, *vertex_count, *instance_count, 0, 0, 0);
                    } else {
                        device.cmd_draw(cmd, *vertex_count, *instance_count, 0, 0);
                    }
                }
                Ok(())
            }
            Work::Composite { children } => children
                .iter()
                .try_for_each(|child| child.record_draws(device, cmd)),
            _ => unreachable!("pass children are graphics-only"),
        }
    }
}

/// The access and layout a descriptor slot's resource must be in when the
/// pipeline runs. `stage` narrows shader accesses to the task's stages.
fn slot_access(
    ty: ResourceType,
    stage: vk::PipelineStageFlags2,
) -> (Access, Option<vk::ImageLayout>) {
    match ty {
        ResourceType::UniformBuffer => (
            Access {
                stage,
                access: vk::AccessFlags2::UNIFORM_READ,
            },
            None,
        ),
        ResourceType::StorageBuffer => (
            Access {
                stage,
                access: vk::AccessFlags2::SHADER_STORAGE_READ
                    | vk::AccessFlags2::SHADER_STORAGE_WRITE,
            },
            None,
        ),
        ResourceType::SampledImage => (
            Access {
                stage,
                access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            },
            Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
        ),
        ResourceType::StorageImage => (
            Access {
                stage,
                access: vk::AccessFlags2::SHADER_STORAGE_READ
                    | vk::AccessFlags2::SHADER_STORAGE_WRITE,
            },
            Some(vk::ImageLayout::GENERAL),
        ),
    }
}

fn emit_pool_barriers(
    device: &Device,
    cmd: vk::CommandBuffer,
    pool: &ResourcePool,
    stage: vk::PipelineStageFlags2,
) {
    let mut global = MemoryBarrier::default();
    for (ty, view) in pool.bound_views() {
        let (access, layout) = slot_access(ty, stage);
        match (&view, layout) {
            (ResourceView::Buffer(view), _) => {
                global |= view.buffer().state().transition(access, false);
            }
            (ResourceView::Image(view), Some(layout)) => {
                let mut state = view.image().state();
                emit_image_barrier_locked(
                    device,
                    cmd,
                    view.image().vk_handle(),
                    vk::ImageAspectFlags::COLOR,
                    &mut state,
                    access,
                    layout,
                );
            }
            (ResourceView::DepthImage(view), Some(layout)) => {
                let mut state = view.image().state();
                emit_image_barrier_locked(
                    device,
                    cmd,
                    view.image().vk_handle(),
                    vk::ImageAspectFlags::DEPTH,
                    &mut state,
                    access,
                    layout,
                );
            }
            _ => unreachable!("binding validation rejects this combination"),
        }
    }
    emit_global_barrier(device, cmd, global);
}

fn emit_global_barrier(device: &Device, cmd: vk::CommandBuffer, barrier: MemoryBarrier) {
    if barrier == MemoryBarrier::default() {
        return;
    }
    let memory_barrier = vk::MemoryBarrier2 {
        src_stage_mask: barrier.src.stage,
        src_access_mask: barrier.src.access,
        dst_stage_mask: barrier.dst.stage,
        dst_access_mask: barrier.dst.access,
        ..Default::default()
    };
    unsafe {
        device.cmd_pipeline_barrier2(
            cmd,
            &vk::DependencyInfo::default().memory_barriers(std::slice::from_ref(&memory_barrier)),
        );
    }
}

fn emit_image_barrier_locked(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect_mask: vk::ImageAspectFlags,
    state: &mut ResourceState,
    next: Access,
    new_layout: vk::ImageLayout,
) {
    let old_layout = state.layout;
    let layout_change = old_layout != new_layout;
    let barrier = state.transition(next, layout_change);
    state.layout = new_layout;
    if barrier == MemoryBarrier::default() && !layout_change {
        return;
    }
    let image_barrier = vk::ImageMemoryBarrier2 {
        src_stage_mask: barrier.src.stage,
        src_access_mask: barrier.src.access,
        dst_stage_mask: barrier.dst.stage,
        dst_access_mask: barrier.dst.access,
        old_layout,
        new_layout,
        src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
        image,
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    unsafe {
        device.cmd_pipeline_barrier2(
            cmd,
            &vk::DependencyInfo::default().image_memory_barriers(std::slice::from_ref(
                &image_barrier,
            )),
        );
    }
}

fn transition_color_image(
    device: &Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    state: &mut ResourceState,
    next: Access,
    new_layout: vk::ImageLayout,
) {
    emit_image_barrier_locked(
        device,
        cmd,
        image,
        vk::ImageAspectFlags::COLOR,
        state,
        next,
        new_layout,
    );
}

fn transition_depth_image(device: &Device, cmd: vk::CommandBuffer, view: &DepthImageView) {
    let mut state = view.image().state();
    emit_image_barrier_locked(
        device,
        cmd,
        view.image().vk_handle(),
        vk::ImageAspectFlags::DEPTH,
        &mut state,
        Access::DEPTH_ATTACHMENT,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );
}

/// Row length and image height mirror the copied rectangle.
fn buffer_image_copy(buffer_offset: u64, view: &ImageView) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset,
        buffer_row_length: view.width(),
        buffer_image_height: view.height().max(1),
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D {
            x: view.x() as i32,
            y: view.y() as i32,
            z: 0,
        },
        image_extent: copy_extent(view.width(), view.height()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_roles() {
        assert_eq!(
            merge_roles(QueueRole::Transfer, QueueRole::Compute),
            QueueRole::Compute
        );
        assert_eq!(
            merge_roles(QueueRole::Graphics, QueueRole::Compute),
            QueueRole::Graphics
        );
        assert_eq!(
            merge_roles(QueueRole::Transfer, QueueRole::Transfer),
            QueueRole::Transfer
        );
    }

    #[test]
    fn test_copy_extent_clamp() {
        let extent = copy_extent(64, 0);
        assert_eq!(extent.height, 1);
        assert_eq!(extent.depth, 1);
        assert_eq!(copy_extent(64, 32).height, 32);
    }

    #[test]
    fn test_slot_access_layouts() {
        let (access, layout) = slot_access(
            ResourceType::SampledImage,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
        );
        assert_eq!(access.stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(layout, Some(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));

        let (_, layout) = slot_access(
            ResourceType::StorageImage,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
        );
        assert_eq!(layout, Some(vk::ImageLayout::GENERAL));

        let (access, layout) = slot_access(
            ResourceType::UniformBuffer,
            vk::PipelineStageFlags2::ALL_GRAPHICS,
        );
        assert_eq!(access.access, vk::AccessFlags2::UNIFORM_READ);
        assert_eq!(layout, None);
    }
}
