//! Tasks: compiled compute and graphics pipelines.
//!
//! A [`Task`] wires shader bytecode to a pipeline plus the resource-type
//! signature its descriptor set is built from. Graphics tasks reference the
//! [`RenderPass`] they will draw into; the pass must outlive the task.
//! Shader modules are transient and destroyed once the pipeline is linked.

use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    context::Context,
    device::{Device, HasDevice},
    error::Result,
    image::format_size,
    pass::RenderPass,
    pool::ResourcePool,
    utils::AsVkHandle,
};

/// The kind of resource a pipeline slot accepts.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub enum ResourceType {
    UniformBuffer,
    StorageBuffer,
    SampledImage,
    StorageImage,
}

impl ResourceType {
    pub(crate) fn descriptor_type(self) -> vk::DescriptorType {
        match self {
            ResourceType::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            ResourceType::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            ResourceType::SampledImage => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            ResourceType::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }
}

/// Primitive topology, including the virtual wireframe variant.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Topology {
    Point,
    Line,
    LineStrip,
    Triangle,
    /// Triangles rasterized with polygon mode LINE.
    TriangleWireframe,
}

impl Topology {
    pub(crate) fn to_vk(self) -> (vk::PrimitiveTopology, vk::PolygonMode) {
        match self {
            Topology::Point => (vk::PrimitiveTopology::POINT_LIST, vk::PolygonMode::FILL),
            Topology::Line => (vk::PrimitiveTopology::LINE_LIST, vk::PolygonMode::FILL),
            Topology::LineStrip => (vk::PrimitiveTopology::LINE_STRIP, vk::PolygonMode::FILL),
            Topology::Triangle => (vk::PrimitiveTopology::TRIANGLE_LIST, vk::PolygonMode::FILL),
            Topology::TriangleWireframe => {
                (vk::PrimitiveTopology::TRIANGLE_LIST, vk::PolygonMode::LINE)
            }
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VertexRate {
    Vertex,
    Instance,
}

/// One vertex input stream: its element format and step rate.
#[derive(Clone, Copy, Debug)]
pub struct VertexInput {
    pub format: vk::Format,
    pub rate: VertexRate,
}

/// Derives one binding and one attribute per declared input. The stride is
/// the element size of the input's format; locations follow declaration
/// order.
pub(crate) fn vertex_input_state(
    inputs: &[VertexInput],
) -> (
    SmallVec<[vk::VertexInputBindingDescription; 4]>,
    SmallVec<[vk::VertexInputAttributeDescription; 4]>,
) {
    let bindings = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| vk::VertexInputBindingDescription {
            binding: i as u32,
            stride: format_size(input.format),
            input_rate: match input.rate {
                VertexRate::Vertex => vk::VertexInputRate::VERTEX,
                VertexRate::Instance => vk::VertexInputRate::INSTANCE,
            },
        })
        .collect();
    let attributes = inputs
        .iter()
        .enumerate()
        .map(|(i, input)| vk::VertexInputAttributeDescription {
            location: i as u32,
            binding: i as u32,
            format: input.format,
            offset: 0,
        })
        .collect();
    (bindings, attributes)
}

/// Compute task creation parameters.
#[derive(Clone, Debug)]
pub struct ComputeTaskConfig {
    pub label: String,
    pub entry: CString,
    pub bytecode: Vec<u32>,
    pub workgroup_size: [u32; 3],
    pub resources: Vec<ResourceType>,
}

impl ComputeTaskConfig {
    pub fn new(bytecode: Vec<u32>) -> Self {
        Self {
            label: String::new(),
            entry: c"main".into(),
            bytecode,
            workgroup_size: [1, 1, 1],
            resources: Vec::new(),
        }
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn entry(mut self, entry: &CStr) -> Self {
        self.entry = entry.into();
        self
    }
    pub fn workgroup_size(mut self, size: [u32; 3]) -> Self {
        self.workgroup_size = size;
        self
    }
    pub fn resource(mut self, ty: ResourceType) -> Self {
        self.resources.push(ty);
        self
    }
}

/// Graphics task creation parameters.
#[derive(Clone, Debug)]
pub struct GraphicsTaskConfig {
    pub label: String,
    pub vertex_entry: CString,
    pub vertex_bytecode: Vec<u32>,
    pub fragment_entry: CString,
    pub fragment_bytecode: Vec<u32>,
    pub topology: Topology,
    pub vertex_inputs: Vec<VertexInput>,
    pub resources: Vec<ResourceType>,
}

impl GraphicsTaskConfig {
    pub fn new(vertex_bytecode: Vec<u32>, fragment_bytecode: Vec<u32>) -> Self {
        Self {
            label: String::new(),
            vertex_entry: c"main".into(),
            vertex_bytecode,
            fragment_entry: c"main".into(),
            fragment_bytecode,
            topology: Topology::Triangle,
            vertex_inputs: Vec::new(),
            resources: Vec::new(),
        }
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn vertex_entry(mut self, entry: &CStr) -> Self {
        self.vertex_entry = entry.into();
        self
    }
    pub fn fragment_entry(mut self, entry: &CStr) -> Self {
        self.fragment_entry = entry.into();
        self
    }
    pub fn topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }
    pub fn vertex_input(mut self, format: vk::Format, rate: VertexRate) -> Self {
        self.vertex_inputs.push(VertexInput { format, rate });
        self
    }
    pub fn resource(mut self, ty: ResourceType) -> Self {
        self.resources.push(ty);
        self
    }
}

pub(crate) enum TaskKind {
    // The workgroup size is baked into the pipeline through specialization
    // constants; dispatches take workgroup counts directly.
    Compute,
    Graphics {
        pass: RenderPass,
        topology: Topology,
    },
}

/// A compiled pipeline with its resource-layout metadata.
#[derive(Clone)]
pub struct Task(Arc<TaskInner>);
impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Task {}

struct TaskInner {
    ctx: Context,
    label: String,
    kind: TaskKind,
    signature: Vec<ResourceType>,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
}

impl Drop for TaskInner {
    fn drop(&mut self) {
        tracing::debug!(label = self.label, "drop task");
        // The descriptor set layout is cached by the context and destroyed
        // with it.
        unsafe {
            self.ctx.device().destroy_pipeline(self.pipeline, None);
            self.ctx.device().destroy_pipeline_layout(self.layout, None);
        }
    }
}

impl HasDevice for Task {
    fn device(&self) -> &Device {
        self.0.ctx.device()
    }
}
impl AsVkHandle for Task {
    type Handle = vk::Pipeline;
    fn vk_handle(&self) -> Self::Handle {
        self.0.pipeline
    }
}

fn create_shader_module(device: &Device, bytecode: &[u32]) -> Result<vk::ShaderModule> {
    let module = unsafe {
        device.create_shader_module(&vk::ShaderModuleCreateInfo::default().code(bytecode), None)?
    };
    Ok(module)
}

impl Task {
    /// Links a compute pipeline. The workgroup size is baked in through
    /// specialization constants 0, 1, and 2.
    pub fn new_compute(ctx: &Context, config: ComputeTaskConfig) -> Result<Self> {
        let set_layout = ctx.descriptor_set_layout(&config.resources)?;
        let layout = unsafe {
            ctx.device().create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default().set_layouts(&[set_layout]),
                None,
            )?
        };

        let module = create_shader_module(ctx.device(), &config.bytecode)?;
        let spec_entries = [
            vk::SpecializationMapEntry {
                constant_id: 0,
                offset: 0,
                size: 4,
            },
            vk::SpecializationMapEntry {
                constant_id: 1,
                offset: 4,
                size: 4,
            },
            vk::SpecializationMapEntry {
                constant_id: 2,
                offset: 8,
                size: 4,
            },
        ];
        let mut spec_data = [0u8; 12];
        for (i, size) in config.workgroup_size.iter().enumerate() {
            spec_data[i * 4..i * 4 + 4].copy_from_slice(&size.to_ne_bytes());
        }
        let spec_info = vk::SpecializationInfo::default()
            .map_entries(&spec_entries)
            .data(&spec_data);
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(module)
            .name(&config.entry)
            .specialization_info(&spec_info);

        let result = unsafe {
            ctx.device().create_compute_pipelines(
                vk::PipelineCache::null(),
                &[vk::ComputePipelineCreateInfo::default()
                    .stage(stage)
                    .layout(layout)],
                None,
            )
        };
        unsafe {
            ctx.device().destroy_shader_module(module, None);
        }
        let pipeline = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe {
                    ctx.device().destroy_pipeline_layout(layout, None);
                }
                return Err(err.into());
            }
        };

        tracing::debug!(label = config.label, "link compute task");
        Ok(Self(Arc::new(TaskInner {
            ctx: ctx.clone(),
            label: config.label,
            kind: TaskKind::Compute,
            signature: config.resources,
            layout,
            pipeline,
        })))
    }

    /// Links a graphics pipeline drawing into `pass`.
    ///
    /// Fixed state: cull NONE, front face CLOCKWISE, line width 1.0, no
    /// blending, full-pass viewport and scissor. Depth test and write are
    /// enabled when the pass carries a depth attachment.
    pub fn new_graphics(ctx: &Context, pass: &RenderPass, config: GraphicsTaskConfig) -> Result<Self> {
        let set_layout = ctx.descriptor_set_layout(&config.resources)?;
        let layout = unsafe {
            ctx.device().create_pipeline_layout(
                &vk::PipelineLayoutCreateInfo::default().set_layouts(&[set_layout]),
                None,
            )?
        };

        let vertex_module = create_shader_module(ctx.device(), &config.vertex_bytecode)?;
        let fragment_module = create_shader_module(ctx.device(), &config.fragment_bytecode)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(&config.vertex_entry),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(&config.fragment_entry),
        ];

        let (bindings, attributes) = vertex_input_state(&config.vertex_inputs);
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let (topology, polygon_mode) = config.topology.to_vk();
        let input_assembly =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(topology);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: pass.width() as f32,
            height: pass.height() as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: vk::Extent2D {
                width: pass.width(),
                height: pass.height(),
            },
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(std::slice::from_ref(&viewport))
            .scissors(std::slice::from_ref(&scissor));

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(polygon_mode)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let has_depth = pass
            .attachments()
            .iter()
            .any(|a| a.kind == crate::pass::AttachmentKind::Depth);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth)
            .depth_compare_op(vk::CompareOp::LESS);

        let color_count = pass.attachments().len() - has_depth as usize;
        let blend_attachments: SmallVec<[vk::PipelineColorBlendAttachmentState; 4]> = (0
            ..color_count)
            .map(|_| vk::PipelineColorBlendAttachmentState {
                blend_enable: vk::FALSE,
                color_write_mask: vk::ColorComponentFlags::RGBA,
                ..Default::default()
            })
            .collect();
        let color_blend =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let result = unsafe {
            ctx.device().create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[vk::GraphicsPipelineCreateInfo::default()
                    .stages(&stages)
                    .vertex_input_state(&vertex_input)
                    .input_assembly_state(&input_assembly)
                    .viewport_state(&viewport_state)
                    .rasterization_state(&rasterization)
                    .multisample_state(&multisample)
                    .depth_stencil_state(&depth_stencil)
                    .color_blend_state(&color_blend)
                    .layout(layout)
                    .render_pass(pass.vk_handle())
                    .subpass(0)],
                None,
            )
        };
        unsafe {
            ctx.device().destroy_shader_module(vertex_module, None);
            ctx.device().destroy_shader_module(fragment_module, None);
        }
        let pipeline = match result {
            Ok(pipelines) => pipelines[0],
            Err((_, err)) => {
                unsafe {
                    ctx.device().destroy_pipeline_layout(layout, None);
                }
                return Err(err.into());
            }
        };

        tracing::debug!(label = config.label, "link graphics task");
        Ok(Self(Arc::new(TaskInner {
            ctx: ctx.clone(),
            label: config.label,
            kind: TaskKind::Graphics {
                pass: pass.clone(),
                topology: config.topology,
            },
            signature: config.resources,
            layout,
            pipeline,
        })))
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn label(&self) -> &str {
        &self.0.label
    }

    /// The ordered resource types the task's descriptor set is built from.
    pub fn signature(&self) -> &[ResourceType] {
        &self.0.signature
    }

    /// The render pass a graphics task draws into.
    pub fn render_pass(&self) -> Option<&RenderPass> {
        match &self.0.kind {
            TaskKind::Graphics { pass, .. } => Some(pass),
            TaskKind::Compute => None,
        }
    }

    pub fn topology(&self) -> Option<Topology> {
        match &self.0.kind {
            TaskKind::Graphics { topology, .. } => Some(*topology),
            TaskKind::Compute => None,
        }
    }

    pub(crate) fn bind_point(&self) -> vk::PipelineBindPoint {
        match &self.0.kind {
            TaskKind::Compute => vk::PipelineBindPoint::COMPUTE,
            TaskKind::Graphics { .. } => vk::PipelineBindPoint::GRAPHICS,
        }
    }

    pub(crate) fn vk_layout(&self) -> vk::PipelineLayout {
        self.0.layout
    }

    /// Allocates a resource pool (descriptor set) for this task.
    pub fn create_pool(&self) -> Result<ResourcePool> {
        ResourcePool::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_mapping() {
        assert_eq!(
            Topology::Triangle.to_vk(),
            (vk::PrimitiveTopology::TRIANGLE_LIST, vk::PolygonMode::FILL)
        );
        // Wireframe is a virtual topology: triangles with line fill.
        assert_eq!(
            Topology::TriangleWireframe.to_vk(),
            (vk::PrimitiveTopology::TRIANGLE_LIST, vk::PolygonMode::LINE)
        );
        assert_eq!(
            Topology::LineStrip.to_vk(),
            (vk::PrimitiveTopology::LINE_STRIP, vk::PolygonMode::FILL)
        );
    }

    #[test]
    fn test_vertex_stride_derivation() {
        let (bindings, attributes) = vertex_input_state(&[
            VertexInput {
                format: vk::Format::R32G32B32_SFLOAT,
                rate: VertexRate::Vertex,
            },
            VertexInput {
                format: vk::Format::R32G32_SFLOAT,
                rate: VertexRate::Instance,
            },
        ]);
        assert_eq!(bindings[0].stride, 12);
        assert_eq!(bindings[0].input_rate, vk::VertexInputRate::VERTEX);
        assert_eq!(bindings[1].stride, 8);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[1].binding, 1);
        assert_eq!(attributes[1].offset, 0);
    }

    #[test]
    fn test_descriptor_type_mapping() {
        assert_eq!(
            ResourceType::UniformBuffer.descriptor_type(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(
            ResourceType::SampledImage.descriptor_type(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(
            ResourceType::StorageImage.descriptor_type(),
            vk::DescriptorType::STORAGE_IMAGE
        );
    }
}
