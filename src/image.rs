//! Color and depth images, views, and tiling-aware mapped access.
//!
//! An [`Image`] owns one `VkImage`, its allocation, and a full-extent
//! `VkImageView` used for descriptor and attachment binding. Host access is
//! available only to `STAGING` images, which are linearly tiled and
//! persistently mapped; [`Image::map`] hides the driver row pitch behind a
//! tight-pitch staging copy when the two differ.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use vk_mem::Alloc;

use crate::{
    buffer::{self, BufferView, HostAccess},
    context::Context,
    device::{Device, HasDevice},
    error::{Error, Result},
    tracking::{Access, ResourceState},
    utils::AsVkHandle,
};

bitflags::bitflags! {
    /// Abstract color image usage set.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct ImageUsage: u8 {
        const STAGING = 0b0001;
        const SAMPLED = 0b0010;
        const STORAGE = 0b0100;
        const ATTACHMENT = 0b1000;
    }
}

bitflags::bitflags! {
    /// Abstract depth image usage set.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct DepthImageUsage: u8 {
        const SAMPLED = 0b0001;
        const ATTACHMENT = 0b0010;
        const SUBPASS_DATA = 0b0100;
        const TILE_MEMORY = 0b1000;
    }
}

impl ImageUsage {
    pub(crate) fn to_vk(self) -> vk::ImageUsageFlags {
        let mut out = vk::ImageUsageFlags::empty();
        if self.contains(Self::STAGING) {
            out |= vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::SAMPLED) {
            out |= vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::STORAGE) {
            out |= vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::ATTACHMENT) {
            out |= vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC;
        }
        out
    }

    /// Staging images are the only host-accessible kind.
    pub(crate) fn host_access(self) -> HostAccess {
        if self.contains(Self::STAGING) {
            HostAccess::READ | HostAccess::WRITE
        } else {
            HostAccess::empty()
        }
    }
}

impl DepthImageUsage {
    pub(crate) fn to_vk(self) -> vk::ImageUsageFlags {
        let mut out = vk::ImageUsageFlags::empty();
        if self.contains(Self::SAMPLED) {
            out |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(Self::ATTACHMENT) {
            out |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.contains(Self::SUBPASS_DATA) {
            out |= vk::ImageUsageFlags::INPUT_ATTACHMENT;
        }
        if self.contains(Self::TILE_MEMORY) {
            out |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
                | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        out
    }
}

// Overflow-safe form of `x + width <= img_width && y + height <= img_height`.
fn rect_in_bounds(x: u32, y: u32, width: u32, height: u32, img_width: u32, img_height: u32) -> bool {
    width <= img_width && x <= img_width - width && height <= img_height && y <= img_height - height
}

/// Size in bytes of one texel of `format`.
pub(crate) fn format_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R8_UNORM | vk::Format::R8_SNORM | vk::Format::R8_UINT | vk::Format::R8_SINT => {
            1
        }
        vk::Format::R8G8_UNORM | vk::Format::R8G8_UINT | vk::Format::R8G8_SINT => 2,
        vk::Format::R16_SFLOAT | vk::Format::R16_UINT | vk::Format::R16_SINT => 2,
        vk::Format::D16_UNORM => 2,
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SINT
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB => 4,
        vk::Format::R16G16_SFLOAT | vk::Format::R16G16_UINT => 4,
        vk::Format::R32_SFLOAT | vk::Format::R32_UINT | vk::Format::R32_SINT => 4,
        vk::Format::D32_SFLOAT | vk::Format::D24_UNORM_S8_UINT => 4,
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R16G16B16A16_UINT => 8,
        vk::Format::R32G32_SFLOAT | vk::Format::R32G32_UINT => 8,
        vk::Format::R32G32B32_SFLOAT => 12,
        vk::Format::R32G32B32A32_SFLOAT | vk::Format::R32G32B32A32_UINT => 16,
        _ => panic!("unsupported format {format:?}"),
    }
}

/// Whether mapped access to a rectangle needs a tight-pitch staging copy.
///
/// Direct access works only when the rectangle covers the whole image and the
/// driver row pitch equals the tight pitch.
pub(crate) fn needs_pitch_staging(covers_image: bool, row_pitch: u64, tight_pitch: u64) -> bool {
    !covers_image || row_pitch != tight_pitch
}

/// Color image creation parameters.
#[derive(Clone, Debug)]
pub struct ImageConfig {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: ImageUsage,
}

impl ImageConfig {
    pub fn new(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            label: String::new(),
            width,
            height,
            format,
            usage: ImageUsage::empty(),
        }
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn usage(mut self, usage: ImageUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Depth image creation parameters.
#[derive(Clone, Debug)]
pub struct DepthImageConfig {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: DepthImageUsage,
}

impl DepthImageConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            label: String::new(),
            width,
            height,
            format: vk::Format::D32_SFLOAT,
            usage: DepthImageUsage::empty(),
        }
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }
    pub fn usage(mut self, usage: DepthImageUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// A color image fully backed by memory, with a full-extent view.
#[derive(Clone)]
pub struct Image(Arc<ImageInner>);
impl PartialEq for Image {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Image {}

struct ImageInner {
    ctx: Context,
    handle: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,
    mapped: *mut u8,
    config: ImageConfig,
    state: Mutex<ResourceState>,
}
// The mapped pointer is owned by the allocation and valid for its lifetime.
unsafe impl Send for ImageInner {}
unsafe impl Sync for ImageInner {}

impl Drop for ImageInner {
    fn drop(&mut self) {
        tracing::debug!(label = self.config.label, "drop image");
        unsafe {
            self.ctx.device().destroy_image_view(self.view, None);
            self.ctx
                .allocator()
                .destroy_image(self.handle, &mut self.allocation);
        }
    }
}

impl HasDevice for Image {
    fn device(&self) -> &Device {
        self.0.ctx.device()
    }
}
impl AsVkHandle for Image {
    type Handle = vk::Image;
    fn vk_handle(&self) -> Self::Handle {
        self.0.handle
    }
}

fn create_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> ash::prelude::VkResult<vk::ImageView> {
    unsafe {
        device.create_image_view(
            &vk::ImageViewCreateInfo {
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format,
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            },
            None,
        )
    }
}

impl Image {
    /// Creates a color image. Staging images are linearly tiled and
    /// persistently mapped; every other kind is device-local and optimally
    /// tiled. Initial layout is undefined.
    pub fn new(ctx: &Context, config: ImageConfig) -> Result<Self> {
        let host_access = config.usage.host_access();
        let tiling = if host_access.is_empty() {
            vk::ImageTiling::OPTIMAL
        } else {
            vk::ImageTiling::LINEAR
        };
        let image_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: config.format,
            extent: vk::Extent3D {
                width: config.width,
                height: config.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling,
            usage: config.usage.to_vk(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let alloc_info = buffer::allocation_info_for(host_access);
        let (handle, allocation) =
            unsafe { ctx.allocator().create_image(&image_info, &alloc_info)? };
        let mapped = ctx.allocator().get_allocation_info(&allocation).mapped_data as *mut u8;
        let view = create_view(
            ctx.device(),
            handle,
            config.format,
            vk::ImageAspectFlags::COLOR,
        )?;
        tracing::debug!(
            label = config.label,
            width = config.width,
            height = config.height,
            "create image"
        );
        Ok(Self(Arc::new(ImageInner {
            ctx: ctx.clone(),
            handle,
            view,
            allocation,
            mapped,
            config,
            state: Mutex::new(ResourceState::default()),
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
    pub fn format(&self) -> vk::Format {
        self.0.config.format
    }
    pub fn usage(&self) -> ImageUsage {
        self.0.config.usage
    }
    pub fn label(&self) -> &str {
        &self.0.config.label
    }

    pub(crate) fn vk_view(&self) -> vk::ImageView {
        self.0.view
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ResourceState> {
        self.0.state.lock().unwrap()
    }

    /// A view covering the whole image.
    pub fn view_full(&self) -> ImageView {
        ImageView {
            image: self.clone(),
            x: 0,
            y: 0,
            width: self.0.config.width,
            height: self.0.config.height,
        }
    }

    /// A rectangular view.
    pub fn view(&self, x: u32, y: u32, width: u32, height: u32) -> ImageView {
        assert!(
            rect_in_bounds(x, y, width, height, self.0.config.width, self.0.config.height),
            "view out of bounds"
        );
        ImageView {
            image: self.clone(),
            x,
            y,
            width,
            height,
        }
    }

    /// Maps the whole image for host access.
    pub fn map(&self, access: HostAccess) -> Result<ImageMapGuard<'_>> {
        self.map_region(0, 0, self.0.config.width, self.0.config.height, access)
    }

    /// Maps a rectangle of the image for host access.
    ///
    /// The returned guard exposes tight-pitch bytes. When the rectangle does
    /// not cover the whole image, or the driver row pitch differs from the
    /// tight pitch, the guard copies through a host staging allocation so the
    /// caller never sees the pitch difference.
    pub fn map_region(
        &self,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        access: HostAccess,
    ) -> Result<ImageMapGuard<'_>> {
        let allowed = self.0.config.usage.host_access();
        if !allowed.contains(access) {
            tracing::error!(
                label = self.0.config.label,
                ?access,
                "host access denied"
            );
            return Err(Error::HostAccessDenied {
                requested: access,
                allowed,
            });
        }
        assert!(
            rect_in_bounds(x, y, width, height, self.0.config.width, self.0.config.height),
            "mapped region out of bounds"
        );
        let layout = unsafe {
            self.0.ctx.device().get_image_subresource_layout(
                self.0.handle,
                vk::ImageSubresource {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    array_layer: 0,
                },
            )
        };
        if access.contains(HostAccess::READ) {
            self.0
                .ctx
                .allocator()
                .invalidate_allocation(&self.0.allocation, 0, vk::WHOLE_SIZE)?;
        }
        {
            // Host access replaces the tracked access but not the layout.
            let mut state = self.state();
            let layout = state.layout;
            *state = ResourceState::new(if access.contains(HostAccess::WRITE) {
                Access::HOST_WRITE
            } else {
                Access::HOST_READ
            });
            state.layout = layout;
        }

        let texel = format_size(self.0.config.format) as u64;
        let tight_pitch = texel * width as u64;
        let covers_image = x == 0
            && y == 0
            && width == self.0.config.width
            && height == self.0.config.height;
        let staging = if needs_pitch_staging(covers_image, layout.row_pitch, tight_pitch) {
            let mut bytes = vec![0u8; (tight_pitch * height as u64) as usize];
            if access.contains(HostAccess::READ) {
                for row in 0..height as usize {
                    let src_offset = layout.offset as usize
                        + (y as usize + row) * layout.row_pitch as usize
                        + x as usize * texel as usize;
                    let dst_offset = row * tight_pitch as usize;
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            self.0.mapped.add(src_offset),
                            bytes.as_mut_ptr().add(dst_offset),
                            tight_pitch as usize,
                        );
                    }
                }
            }
            Some(bytes)
        } else {
            None
        };
        Ok(ImageMapGuard {
            image: self,
            access,
            x,
            y,
            height,
            texel,
            row_pitch: layout.row_pitch,
            tight_pitch,
            base_offset: layout.offset,
            staging,
        })
    }
}

/// A mapped rectangle of a staging image, always tight-pitch from the
/// caller's point of view. Write mappings are copied back and flushed when
/// the guard drops.
pub struct ImageMapGuard<'a> {
    image: &'a Image,
    access: HostAccess,
    x: u32,
    y: u32,
    height: u32,
    texel: u64,
    row_pitch: u64,
    tight_pitch: u64,
    base_offset: u64,
    staging: Option<Vec<u8>>,
}

impl std::ops::Deref for ImageMapGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        match &self.staging {
            Some(bytes) => bytes,
            None => unsafe {
                std::slice::from_raw_parts(
                    self.image.0.mapped.add(self.base_offset as usize),
                    (self.tight_pitch * self.height as u64) as usize,
                )
            },
        }
    }
}
impl std::ops::DerefMut for ImageMapGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        assert!(self.access.contains(HostAccess::WRITE));
        match &mut self.staging {
            Some(bytes) => bytes,
            None => unsafe {
                std::slice::from_raw_parts_mut(
                    self.image.0.mapped.add(self.base_offset as usize),
                    (self.tight_pitch * self.height as u64) as usize,
                )
            },
        }
    }
}
impl Drop for ImageMapGuard<'_> {
    fn drop(&mut self) {
        if !self.access.contains(HostAccess::WRITE) {
            return;
        }
        if let Some(bytes) = &self.staging {
            for row in 0..self.height as usize {
                let dst_offset = self.base_offset as usize
                    + (self.y as usize + row) * self.row_pitch as usize
                    + self.x as usize * self.texel as usize;
                let src_offset = row * self.tight_pitch as usize;
                unsafe {
                    std::ptr::copy_nonoverlapping(
                        bytes.as_ptr().add(src_offset),
                        self.image.0.mapped.add(dst_offset),
                        self.tight_pitch as usize,
                    );
                }
            }
        }
        let _ = self.image.0.ctx.allocator().flush_allocation(
            &self.image.0.allocation,
            0,
            vk::WHOLE_SIZE,
        );
    }
}

/// A depth image with a full-extent view.
#[derive(Clone)]
pub struct DepthImage(Arc<DepthImageInner>);
impl PartialEq for DepthImage {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for DepthImage {}

struct DepthImageInner {
    ctx: Context,
    handle: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,
    config: DepthImageConfig,
    state: Mutex<ResourceState>,
}

impl Drop for DepthImageInner {
    fn drop(&mut self) {
        tracing::debug!(label = self.config.label, "drop depth image");
        unsafe {
            self.ctx.device().destroy_image_view(self.view, None);
            self.ctx
                .allocator()
                .destroy_image(self.handle, &mut self.allocation);
        }
    }
}

impl HasDevice for DepthImage {
    fn device(&self) -> &Device {
        self.0.ctx.device()
    }
}
impl AsVkHandle for DepthImage {
    type Handle = vk::Image;
    fn vk_handle(&self) -> Self::Handle {
        self.0.handle
    }
}

impl DepthImage {
    /// Creates a depth image. `TILE_MEMORY` usage prefers lazily allocated
    /// tile-local memory; the allocator silently falls back to device-local
    /// when no such heap exists.
    pub fn new(ctx: &Context, config: DepthImageConfig) -> Result<Self> {
        let image_info = vk::ImageCreateInfo {
            image_type: vk::ImageType::TYPE_2D,
            format: config.format,
            extent: vk::Extent3D {
                width: config.width,
                height: config.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: config.usage.to_vk(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        let mut alloc_info = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        if config.usage.contains(DepthImageUsage::TILE_MEMORY) {
            alloc_info.preferred_flags = vk::MemoryPropertyFlags::LAZILY_ALLOCATED;
        }
        let (handle, allocation) =
            unsafe { ctx.allocator().create_image(&image_info, &alloc_info)? };
        let view = create_view(
            ctx.device(),
            handle,
            config.format,
            vk::ImageAspectFlags::DEPTH,
        )?;
        tracing::debug!(
            label = config.label,
            width = config.width,
            height = config.height,
            "create depth image"
        );
        Ok(Self(Arc::new(DepthImageInner {
            ctx: ctx.clone(),
            handle,
            view,
            allocation,
            config,
            state: Mutex::new(ResourceState::default()),
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
    pub fn format(&self) -> vk::Format {
        self.0.config.format
    }
    pub fn usage(&self) -> DepthImageUsage {
        self.0.config.usage
    }
    pub fn label(&self) -> &str {
        &self.0.config.label
    }

    pub(crate) fn vk_view(&self) -> vk::ImageView {
        self.0.view
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ResourceState> {
        self.0.state.lock().unwrap()
    }

    pub fn view_full(&self) -> DepthImageView {
        DepthImageView {
            image: self.clone(),
            x: 0,
            y: 0,
            width: self.0.config.width,
            height: self.0.config.height,
        }
    }
}

/// A non-owning rectangle of a color image.
#[derive(Clone)]
pub struct ImageView {
    image: Image,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl ImageView {
    pub fn image(&self) -> &Image {
        &self.image
    }
    pub fn x(&self) -> u32 {
        self.x
    }
    pub fn y(&self) -> u32 {
        self.y
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// A non-owning rectangle of a depth image.
#[derive(Clone)]
pub struct DepthImageView {
    image: DepthImage,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
}

impl DepthImageView {
    pub fn image(&self) -> &DepthImage {
        &self.image
    }
    pub fn x(&self) -> u32 {
        self.x
    }
    pub fn y(&self) -> u32 {
        self.y
    }
    pub fn width(&self) -> u32 {
        self.width
    }
    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Any view bindable to a pipeline slot or an attachment.
#[derive(Clone)]
pub enum ResourceView {
    Buffer(BufferView),
    Image(ImageView),
    DepthImage(DepthImageView),
}

/// Discriminant of a [`ResourceView`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ViewKind {
    Buffer,
    Image,
    DepthImage,
}

impl ResourceView {
    pub fn view_kind(&self) -> ViewKind {
        match self {
            ResourceView::Buffer(_) => ViewKind::Buffer,
            ResourceView::Image(_) => ViewKind::Image,
            ResourceView::DepthImage(_) => ViewKind::DepthImage,
        }
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self.view_kind() {
            ViewKind::Buffer => "buffer view",
            ViewKind::Image => "image view",
            ViewKind::DepthImage => "depth image view",
        }
    }
}

impl From<BufferView> for ResourceView {
    fn from(view: BufferView) -> Self {
        ResourceView::Buffer(view)
    }
}
impl From<ImageView> for ResourceView {
    fn from(view: ImageView) -> Self {
        ResourceView::Image(view)
    }
}
impl From<DepthImageView> for ResourceView {
    fn from(view: DepthImageView) -> Self {
        ResourceView::DepthImage(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_implication() {
        assert_eq!(
            ImageUsage::SAMPLED.to_vk(),
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            ImageUsage::STORAGE.to_vk(),
            vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            ImageUsage::ATTACHMENT.to_vk(),
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_SRC
        );
        assert_eq!(
            ImageUsage::STAGING.host_access(),
            HostAccess::READ | HostAccess::WRITE
        );
        assert_eq!(ImageUsage::SAMPLED.host_access(), HostAccess::empty());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(vk::Format::R8_UNORM), 1);
        assert_eq!(format_size(vk::Format::R8G8B8A8_UNORM), 4);
        assert_eq!(format_size(vk::Format::R32G32B32A32_SFLOAT), 16);
        assert_eq!(format_size(vk::Format::D32_SFLOAT), 4);
    }

    #[test]
    fn test_rect_bounds_check() {
        assert!(rect_in_bounds(0, 0, 64, 64, 64, 64));
        assert!(rect_in_bounds(32, 16, 32, 48, 64, 64));
        assert!(!rect_in_bounds(33, 0, 32, 32, 64, 64));
        // Wrapping x + width must not pass the check.
        assert!(!rect_in_bounds(u32::MAX, 0, 2, 2, 64, 64));
        assert!(!rect_in_bounds(0, u32::MAX, 2, 2, 64, 64));
    }

    #[test]
    fn test_pitch_staging_decision() {
        // Full image at the tight pitch maps directly.
        assert!(!needs_pitch_staging(true, 1024, 1024));
        // Padded pitch or a subregion goes through staging.
        assert!(needs_pitch_staging(true, 1280, 1024));
        assert!(needs_pitch_staging(false, 1024, 1024));
    }
}
