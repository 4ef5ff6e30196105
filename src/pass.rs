//! Render passes and the framebuffer pool.
//!
//! A [`RenderPass`] is a compiled attachment schedule with pre-baked clear
//! values. Framebuffers binding the pass to concrete attachment views are
//! expensive to create, so the pass owns a pool keyed by the ordered view
//! handles; [`RenderPass::acquire_framebuffer`] reuses a pooled handle when
//! the same attachments come around again.

use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    context::Context,
    device::{Device, HasDevice},
    error::Result,
    image::ResourceView,
    utils::AsVkHandle,
};

bitflags::bitflags! {
    /// How an attachment is touched over the pass.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct AttachmentAccess: u8 {
        const CLEAR = 0b001;
        const LOAD = 0b010;
        const STORE = 0b100;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttachmentKind {
    Color,
    Depth,
}

/// One attachment slot of a render pass.
#[derive(Clone, Debug)]
pub struct AttachmentConfig {
    pub kind: AttachmentKind,
    pub format: vk::Format,
    pub access: AttachmentAccess,
}

/// Render pass creation parameters.
#[derive(Clone, Debug)]
pub struct RenderPassConfig {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub attachments: Vec<AttachmentConfig>,
}

impl RenderPassConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            label: String::new(),
            width,
            height,
            attachments: Vec::new(),
        }
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn color_attachment(mut self, format: vk::Format, access: AttachmentAccess) -> Self {
        self.attachments.push(AttachmentConfig {
            kind: AttachmentKind::Color,
            format,
            access,
        });
        self
    }
    pub fn depth_attachment(mut self, format: vk::Format, access: AttachmentAccess) -> Self {
        self.attachments.push(AttachmentConfig {
            kind: AttachmentKind::Depth,
            format,
            access,
        });
        self
    }
}

/// Clearing wins over loading; anything else starts undefined.
pub(crate) fn load_op(access: AttachmentAccess) -> vk::AttachmentLoadOp {
    if access.contains(AttachmentAccess::CLEAR) {
        vk::AttachmentLoadOp::CLEAR
    } else if access.contains(AttachmentAccess::LOAD) {
        vk::AttachmentLoadOp::LOAD
    } else {
        vk::AttachmentLoadOp::DONT_CARE
    }
}

pub(crate) fn store_op(access: AttachmentAccess) -> vk::AttachmentStoreOp {
    if access.contains(AttachmentAccess::STORE) {
        vk::AttachmentStoreOp::STORE
    } else {
        vk::AttachmentStoreOp::DONT_CARE
    }
}

/// Orders attachments so colors take the lower indices, depth last.
/// At most one depth attachment is permitted.
pub(crate) fn ordered_attachments(attachments: &[AttachmentConfig]) -> Vec<AttachmentConfig> {
    let depth_count = attachments
        .iter()
        .filter(|a| a.kind == AttachmentKind::Depth)
        .count();
    assert!(depth_count <= 1, "at most one depth attachment");
    let mut out: Vec<AttachmentConfig> = attachments
        .iter()
        .filter(|a| a.kind == AttachmentKind::Color)
        .cloned()
        .collect();
    out.extend(
        attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::Depth)
            .cloned(),
    );
    out
}

/// Ordered full-view handles of the bound attachments; the pool lookup key.
pub(crate) type FramebufferKey = SmallVec<[vk::ImageView; 4]>;

pub(crate) fn framebuffer_key(attachments: &[ResourceView]) -> FramebufferKey {
    attachments
        .iter()
        .map(|view| match view {
            ResourceView::Image(view) => view.image().vk_view(),
            ResourceView::DepthImage(view) => view.image().vk_view(),
            ResourceView::Buffer(_) => panic!("attachment must be an image view"),
        })
        .collect()
}

/// A compiled attachment schedule plus the framebuffer pool bound to it.
#[derive(Clone)]
pub struct RenderPass(Arc<RenderPassInner>);
impl PartialEq for RenderPass {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for RenderPass {}

struct RenderPassInner {
    ctx: Context,
    handle: vk::RenderPass,
    config: RenderPassConfig,
    attachments: Vec<AttachmentConfig>,
    clear_values: Vec<vk::ClearValue>,
    pool: Mutex<BTreeMap<FramebufferKey, Vec<vk::Framebuffer>>>,
    created: AtomicUsize,
}

impl Drop for RenderPassInner {
    fn drop(&mut self) {
        tracing::debug!(label = self.config.label, "drop render pass");
        let pool = self.pool.get_mut().unwrap();
        unsafe {
            for (_, list) in pool.iter() {
                for &framebuffer in list {
                    self.ctx.device().destroy_framebuffer(framebuffer, None);
                }
            }
            self.ctx.device().destroy_render_pass(self.handle, None);
        }
    }
}

impl HasDevice for RenderPass {
    fn device(&self) -> &Device {
        self.0.ctx.device()
    }
}
impl AsVkHandle for RenderPass {
    type Handle = vk::RenderPass;
    fn vk_handle(&self) -> Self::Handle {
        self.0.handle
    }
}

impl RenderPass {
    /// Compiles the attachment schedule into a single-subpass render pass.
    ///
    /// Color attachments stay in `COLOR_ATTACHMENT_OPTIMAL` and depth in
    /// `DEPTH_STENCIL_ATTACHMENT_OPTIMAL` across initial, subpass, and final
    /// stages. Clear values are baked at build time: transparent black for
    /// colors, depth 1.0.
    pub fn new(ctx: &Context, config: RenderPassConfig) -> Result<Self> {
        let attachments = ordered_attachments(&config.attachments);

        let descriptions: SmallVec<[vk::AttachmentDescription; 4]> = attachments
            .iter()
            .map(|a| {
                let layout = match a.kind {
                    AttachmentKind::Color => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    AttachmentKind::Depth => vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                };
                vk::AttachmentDescription {
                    format: a.format,
                    samples: vk::SampleCountFlags::TYPE_1,
                    load_op: load_op(a.access),
                    store_op: store_op(a.access),
                    stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
                    stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
                    initial_layout: layout,
                    final_layout: layout,
                    ..Default::default()
                }
            })
            .collect();

        let color_refs: SmallVec<[vk::AttachmentReference; 4]> = attachments
            .iter()
            .enumerate()
            .filter(|(_, a)| a.kind == AttachmentKind::Color)
            .map(|(i, _)| vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            })
            .collect();
        let depth_ref = attachments
            .iter()
            .position(|a| a.kind == AttachmentKind::Depth)
            .map(|i| vk::AttachmentReference {
                attachment: i as u32,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            });

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if let Some(depth_ref) = &depth_ref {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let handle = unsafe {
            ctx.device().create_render_pass(
                &vk::RenderPassCreateInfo::default()
                    .attachments(&descriptions)
                    .subpasses(std::slice::from_ref(&subpass)),
                None,
            )?
        };

        let clear_values = attachments
            .iter()
            .map(|a| match a.kind {
                AttachmentKind::Color => vk::ClearValue {
                    color: vk::ClearColorValue {
                        float32: [0.0; 4],
                    },
                },
                AttachmentKind::Depth => vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: 1.0,
                        stencil: 0,
                    },
                },
            })
            .collect();

        tracing::debug!(label = config.label, "create render pass");
        Ok(Self(Arc::new(RenderPassInner {
            ctx: ctx.clone(),
            handle,
            config,
            attachments,
            clear_values,
            pool: Mutex::new(BTreeMap::new()),
            created: AtomicUsize::new(0),
        })))
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }
    pub fn width(&self) -> u32 {
        self.0.config.width
    }
    pub fn height(&self) -> u32 {
        self.0.config.height
    }
    pub fn label(&self) -> &str {
        &self.0.config.label
    }

    /// Attachments in their compiled index order.
    pub fn attachments(&self) -> &[AttachmentConfig] {
        &self.0.attachments
    }

    pub(crate) fn clear_values(&self) -> &[vk::ClearValue] {
        &self.0.clear_values
    }

    /// Number of framebuffers this pass has ever created. Pool hits do not
    /// increase it.
    pub fn framebuffer_count(&self) -> usize {
        self.0.created.load(Ordering::Relaxed)
    }

    /// Borrows a framebuffer binding this pass to `attachments`, building one
    /// when the pool has no free entry for that view combination.
    pub(crate) fn acquire_framebuffer(&self, attachments: &[ResourceView]) -> Result<Framebuffer> {
        let key = framebuffer_key(attachments);
        let reused = self
            .0
            .pool
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(|list| list.pop());
        let handle = match reused {
            Some(handle) => handle,
            None => {
                tracing::debug!(label = self.0.config.label, "framebuffer pool miss");
                let handle = unsafe {
                    self.0.ctx.device().create_framebuffer(
                        &vk::FramebufferCreateInfo {
                            render_pass: self.0.handle,
                            width: self.0.config.width,
                            height: self.0.config.height,
                            layers: 1,
                            ..Default::default()
                        }
                        .attachments(&key),
                        None,
                    )?
                };
                self.0.created.fetch_add(1, Ordering::Relaxed);
                handle
            }
        };
        Ok(Framebuffer {
            pass: self.clone(),
            key,
            handle,
        })
    }
}

/// A framebuffer borrowed from the pool, returned on drop.
pub(crate) struct Framebuffer {
    pass: RenderPass,
    key: FramebufferKey,
    handle: vk::Framebuffer,
}
impl AsVkHandle for Framebuffer {
    type Handle = vk::Framebuffer;
    fn vk_handle(&self) -> Self::Handle {
        self.handle
    }
}
impl Drop for Framebuffer {
    fn drop(&mut self) {
        self.pass
            .0
            .pool
            .lock()
            .unwrap()
            .entry(std::mem::take(&mut self.key))
            .or_default()
            .push(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_store_derivation() {
        // Clear wins over load.
        assert_eq!(
            load_op(AttachmentAccess::CLEAR | AttachmentAccess::LOAD),
            vk::AttachmentLoadOp::CLEAR
        );
        assert_eq!(load_op(AttachmentAccess::LOAD), vk::AttachmentLoadOp::LOAD);
        assert_eq!(
            load_op(AttachmentAccess::STORE),
            vk::AttachmentLoadOp::DONT_CARE
        );
        assert_eq!(
            store_op(AttachmentAccess::CLEAR | AttachmentAccess::STORE),
            vk::AttachmentStoreOp::STORE
        );
        assert_eq!(
            store_op(AttachmentAccess::CLEAR),
            vk::AttachmentStoreOp::DONT_CARE
        );
    }

    #[test]
    fn test_attachment_ordering() {
        let ordered = ordered_attachments(&[
            AttachmentConfig {
                kind: AttachmentKind::Depth,
                format: vk::Format::D32_SFLOAT,
                access: AttachmentAccess::CLEAR,
            },
            AttachmentConfig {
                kind: AttachmentKind::Color,
                format: vk::Format::R8G8B8A8_UNORM,
                access: AttachmentAccess::CLEAR | AttachmentAccess::STORE,
            },
            AttachmentConfig {
                kind: AttachmentKind::Color,
                format: vk::Format::R16G16B16A16_SFLOAT,
                access: AttachmentAccess::STORE,
            },
        ]);
        assert_eq!(ordered[0].kind, AttachmentKind::Color);
        assert_eq!(ordered[0].format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(ordered[1].kind, AttachmentKind::Color);
        assert_eq!(ordered[2].kind, AttachmentKind::Depth);
    }

    #[test]
    #[should_panic(expected = "at most one depth attachment")]
    fn test_double_depth_rejected() {
        let depth = AttachmentConfig {
            kind: AttachmentKind::Depth,
            format: vk::Format::D32_SFLOAT,
            access: AttachmentAccess::CLEAR,
        };
        ordered_attachments(&[depth.clone(), depth]);
    }
}
