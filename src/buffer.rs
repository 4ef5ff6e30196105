//! Buffers and buffer views.
//!
//! A [`Buffer`] owns one `VkBuffer` and its allocation. The abstract
//! [`BufferUsage`] set is translated to backend flags with the transfer bits
//! implied: uniform, storage, vertex, and index buffers are transfer
//! destinations, and storage buffers are additionally transfer sources.
//!
//! Host-visible buffers are persistently mapped at creation. [`Buffer::read`]
//! and [`Buffer::write`] fall back to an ephemeral staging buffer and a
//! blocking transfer when the buffer itself is not host-accessible.

use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use vk_mem::Alloc;

use crate::{
    context::Context,
    device::{Device, HasDevice},
    error::{Error, Result},
    invocation::InvocationConfig,
    tracking::{Access, ResourceState},
    transaction::Transaction,
    utils::AsVkHandle,
};

bitflags::bitflags! {
    /// Host access mode requested for a resource.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct HostAccess: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}

bitflags::bitflags! {
    /// Abstract buffer usage set.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct BufferUsage: u8 {
        const TRANSFER_SRC = 0b000001;
        const TRANSFER_DST = 0b000010;
        const UNIFORM = 0b000100;
        const STORAGE = 0b001000;
        const VERTEX = 0b010000;
        const INDEX = 0b100000;
    }
}

impl BufferUsage {
    /// Expands the abstract set into backend flags, adding the implied
    /// transfer usages.
    pub(crate) fn to_vk(self) -> vk::BufferUsageFlags {
        let mut out = vk::BufferUsageFlags::empty();
        if self.contains(Self::TRANSFER_SRC) {
            out |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if self.contains(Self::TRANSFER_DST) {
            out |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::UNIFORM) {
            out |= vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::STORAGE) {
            out |= vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::VERTEX) {
            out |= vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        }
        if self.contains(Self::INDEX) {
            out |= vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST;
        }
        out
    }
}

/// Maps a host access mode to its allocation memory class.
pub(crate) fn allocation_info_for(host_access: HostAccess) -> vk_mem::AllocationCreateInfo {
    let (usage, flags) = match (
        host_access.contains(HostAccess::READ),
        host_access.contains(HostAccess::WRITE),
    ) {
        // Device-local only.
        (false, false) => (
            vk_mem::MemoryUsage::AutoPreferDevice,
            vk_mem::AllocationCreateFlags::empty(),
        ),
        // Device-to-host readback.
        (true, false) => (
            vk_mem::MemoryUsage::Auto,
            vk_mem::AllocationCreateFlags::MAPPED
                | vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
        ),
        // Host-to-device upload.
        (false, true) => (
            vk_mem::MemoryUsage::Auto,
            vk_mem::AllocationCreateFlags::MAPPED
                | vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
        ),
        // Host-only round-trip memory.
        (true, true) => (
            vk_mem::MemoryUsage::AutoPreferHost,
            vk_mem::AllocationCreateFlags::MAPPED
                | vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM,
        ),
    };
    vk_mem::AllocationCreateInfo {
        usage,
        flags,
        ..Default::default()
    }
}

// Overflow-safe form of `offset + size <= len`.
fn range_in_bounds(offset: u64, size: u64, len: u64) -> bool {
    size <= len && offset <= len - size
}

/// Buffer creation parameters. The canonical form of a buffer; builder
/// methods mutate by return.
#[derive(Clone, Debug)]
pub struct BufferConfig {
    pub label: String,
    pub size: u64,
    pub align: u64,
    pub host_access: HostAccess,
    pub usage: BufferUsage,
}

impl BufferConfig {
    pub fn new(size: u64) -> Self {
        Self {
            label: String::new(),
            size,
            align: 1,
            host_access: HostAccess::empty(),
            usage: BufferUsage::empty(),
        }
    }
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
    pub fn align(mut self, align: u64) -> Self {
        self.align = align;
        self
    }
    pub fn host_access(mut self, host_access: HostAccess) -> Self {
        self.host_access = host_access;
        self
    }
    pub fn usage(mut self, usage: BufferUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// A buffer fully backed by memory. Reference-counted; views and recorded
/// invocations retain clones.
#[derive(Clone)]
pub struct Buffer(Arc<BufferInner>);
impl PartialEq for Buffer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Buffer {}

struct BufferInner {
    ctx: Context,
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,
    mapped: *mut u8,
    config: BufferConfig,
    state: Mutex<ResourceState>,
}
// The mapped pointer is owned by the allocation and valid for its lifetime.
unsafe impl Send for BufferInner {}
unsafe impl Sync for BufferInner {}

impl Drop for BufferInner {
    fn drop(&mut self) {
        tracing::debug!(label = self.config.label, "drop buffer");
        unsafe {
            self.ctx
                .allocator()
                .destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

impl HasDevice for Buffer {
    fn device(&self) -> &Device {
        self.0.ctx.device()
    }
}
impl AsVkHandle for Buffer {
    type Handle = vk::Buffer;
    fn vk_handle(&self) -> Self::Handle {
        self.0.handle
    }
}

impl Buffer {
    /// Creates a buffer from its config. Initial dynamic state is
    /// {access: none, stage: host}.
    pub fn new(ctx: &Context, config: BufferConfig) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo {
            size: config.size,
            usage: config.usage.to_vk(),
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let alloc_info = allocation_info_for(config.host_access);
        let (handle, allocation) = unsafe {
            if config.align > 1 {
                ctx.allocator()
                    .create_buffer_with_alignment(&buffer_info, &alloc_info, config.align)?
            } else {
                ctx.allocator().create_buffer(&buffer_info, &alloc_info)?
            }
        };
        let mapped = ctx.allocator().get_allocation_info(&allocation).mapped_data as *mut u8;
        tracing::debug!(label = config.label, size = config.size, "create buffer");
        Ok(Self(Arc::new(BufferInner {
            ctx: ctx.clone(),
            handle,
            allocation,
            mapped,
            config,
            state: Mutex::new(ResourceState::new(Access {
                stage: vk::PipelineStageFlags2::HOST,
                access: vk::AccessFlags2::NONE,
            })),
        })))
    }

    pub fn context(&self) -> &Context {
        &self.0.ctx
    }

    pub fn size(&self) -> u64 {
        self.0.config.size
    }

    pub fn usage(&self) -> BufferUsage {
        self.0.config.usage
    }

    pub fn host_access(&self) -> HostAccess {
        self.0.config.host_access
    }

    pub fn label(&self) -> &str {
        &self.0.config.label
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, ResourceState> {
        self.0.state.lock().unwrap()
    }

    /// A view covering the whole buffer.
    pub fn view_full(&self) -> BufferView {
        BufferView {
            buffer: self.clone(),
            offset: 0,
            size: self.0.config.size,
        }
    }

    /// A view of `size` bytes starting at `offset`.
    pub fn view(&self, offset: u64, size: u64) -> BufferView {
        assert!(
            range_in_bounds(offset, size, self.0.config.size),
            "view out of bounds"
        );
        BufferView {
            buffer: self.clone(),
            offset,
            size,
        }
    }

    /// Maps the buffer for host access. Fails unless the buffer was created
    /// with a host access mode containing `access`.
    pub fn map(&self, access: HostAccess) -> Result<BufferMapGuard<'_>> {
        if !self.0.config.host_access.contains(access) {
            tracing::error!(
                label = self.0.config.label,
                ?access,
                "host access denied"
            );
            return Err(Error::HostAccessDenied {
                requested: access,
                allowed: self.0.config.host_access,
            });
        }
        if access.contains(HostAccess::READ) {
            self.0
                .ctx
                .allocator()
                .invalidate_allocation(&self.0.allocation, 0, vk::WHOLE_SIZE)?;
        }
        *self.state() = ResourceState::new(if access.contains(HostAccess::WRITE) {
            Access::HOST_WRITE
        } else {
            Access::HOST_READ
        });
        Ok(BufferMapGuard {
            buffer: self,
            access,
        })
    }

    /// Reads `dst.len()` bytes starting at `offset` into `dst`.
    ///
    /// Host-readable buffers are read through the persistent mapping.
    /// Otherwise an ephemeral staging buffer is filled by a blocking
    /// transfer; the staging buffer is destroyed on return.
    pub fn read(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if self.0.config.host_access.contains(HostAccess::READ) {
            let guard = self.map(HostAccess::READ)?;
            dst.copy_from_slice(&guard[offset as usize..offset as usize + dst.len()]);
            return Ok(());
        }
        let staging = Buffer::new(
            &self.0.ctx,
            BufferConfig::new(dst.len() as u64)
                .label("staging-read")
                .host_access(HostAccess::READ | HostAccess::WRITE)
                .usage(BufferUsage::TRANSFER_DST),
        )?;
        let transfer = InvocationConfig::transfer(
            self.view(offset, dst.len() as u64).into(),
            staging.view_full().into(),
        )
        .label("staged-read")
        .build(&self.0.ctx)?;
        Transaction::submit(&transfer)?.wait()?;
        let guard = staging.map(HostAccess::READ)?;
        dst.copy_from_slice(&guard[..dst.len()]);
        Ok(())
    }

    /// Writes `src` starting at `offset`, symmetric with [`read`](Self::read).
    pub fn write(&self, offset: u64, src: &[u8]) -> Result<()> {
        if self.0.config.host_access.contains(HostAccess::WRITE) {
            let mut guard = self.map(HostAccess::WRITE)?;
            guard[offset as usize..offset as usize + src.len()].copy_from_slice(src);
            return Ok(());
        }
        let staging = Buffer::new(
            &self.0.ctx,
            BufferConfig::new(src.len() as u64)
                .label("staging-write")
                .host_access(HostAccess::WRITE)
                .usage(BufferUsage::TRANSFER_SRC),
        )?;
        {
            let mut guard = staging.map(HostAccess::WRITE)?;
            guard[..src.len()].copy_from_slice(src);
        }
        let transfer = InvocationConfig::transfer(
            staging.view_full().into(),
            self.view(offset, src.len() as u64).into(),
        )
        .label("staged-write")
        .build(&self.0.ctx)?;
        Transaction::submit(&transfer)?.wait()?;
        Ok(())
    }
}

/// A mapped window into a host-visible buffer. Write mappings are flushed
/// when the guard drops.
pub struct BufferMapGuard<'a> {
    buffer: &'a Buffer,
    access: HostAccess,
}
impl std::ops::Deref for BufferMapGuard<'_> {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        unsafe {
            std::slice::from_raw_parts(self.buffer.0.mapped, self.buffer.0.config.size as usize)
        }
    }
}
impl std::ops::DerefMut for BufferMapGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        assert!(self.access.contains(HostAccess::WRITE));
        unsafe {
            std::slice::from_raw_parts_mut(self.buffer.0.mapped, self.buffer.0.config.size as usize)
        }
    }
}
impl Drop for BufferMapGuard<'_> {
    fn drop(&mut self) {
        if self.access.contains(HostAccess::WRITE) {
            let _ = self.buffer.0.ctx.allocator().flush_allocation(
                &self.buffer.0.allocation,
                0,
                vk::WHOLE_SIZE,
            );
        }
    }
}

/// A non-owning window into a buffer. Cheap and copyable; the parent buffer
/// is kept alive through the reference count.
#[derive(Clone)]
pub struct BufferView {
    buffer: Buffer,
    offset: u64,
    size: u64,
}

impl BufferView {
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }
    pub fn offset(&self) -> u64 {
        self.offset
    }
    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usage_implication() {
        assert_eq!(
            BufferUsage::UNIFORM.to_vk(),
            vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            BufferUsage::VERTEX.to_vk(),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            BufferUsage::INDEX.to_vk(),
            vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
        );
        // Storage buffers are readable and writable over transfers.
        assert_eq!(
            BufferUsage::STORAGE.to_vk(),
            vk::BufferUsageFlags::STORAGE_BUFFER
                | vk::BufferUsageFlags::TRANSFER_SRC
                | vk::BufferUsageFlags::TRANSFER_DST
        );
        assert_eq!(
            BufferUsage::TRANSFER_SRC.to_vk(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_view_bounds_check() {
        assert!(range_in_bounds(0, 16, 16));
        assert!(range_in_bounds(8, 8, 16));
        assert!(!range_in_bounds(8, 9, 16));
        // A wrapping offset + size must not pass the check.
        assert!(!range_in_bounds(u64::MAX, 2, 16));
        assert!(!range_in_bounds(2, u64::MAX, 16));
    }

    #[test]
    fn test_memory_class_mapping() {
        let info = allocation_info_for(HostAccess::empty());
        assert_eq!(info.usage, vk_mem::MemoryUsage::AutoPreferDevice);
        assert!(info.flags.is_empty());

        let info = allocation_info_for(HostAccess::READ);
        assert!(info
            .flags
            .contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM));

        let info = allocation_info_for(HostAccess::WRITE);
        assert!(info
            .flags
            .contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE));

        let info = allocation_info_for(HostAccess::READ | HostAccess::WRITE);
        assert_eq!(info.usage, vk_mem::MemoryUsage::AutoPreferHost);
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::MAPPED));
    }
}
