//! A thin graphics HAL over Vulkan.
//!
//! The crate exposes a small set of objects layered on raw handles: a
//! [`Context`] rooting a device, queues, and allocator; [`Buffer`]s and
//! [`Image`]s with tracked dynamic state; [`RenderPass`]es with pooled
//! framebuffers; [`Task`]s (compiled pipelines) and their [`ResourcePool`]s;
//! declarative [`Invocation`]s lowered into command buffers at submission;
//! and [`Transaction`]s to poll or wait on submitted work.
//!
//! ## Quick start
//!
//! ```no_run
//! use scoria::prelude::*;
//! use scoria::{BufferUsage, HostAccess};
//!
//! # fn main() -> scoria::Result<()> {
//! let ctx = Context::new(0, "demo")?;
//! let buffer = Buffer::new(
//!     &ctx,
//!     BufferConfig::new(1024)
//!         .usage(BufferUsage::STORAGE)
//!         .host_access(HostAccess::READ | HostAccess::WRITE),
//! )?;
//! buffer.write(0, &[7u8; 1024])?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Lifetimes
//!
//! Two lifetime regimes compose through [`Scoped`]: RAII wrappers that
//! release on drop, and named frames ([`push_frame`]/[`pop_frame`]) that bulk
//! release their objects in reverse registration order.
//!
//! Raw Vulkan stays reachable throughout: the device and instance wrappers
//! dereference to their [`ash`] counterparts, and `vk::*` types appear
//! directly in the configuration structs.

pub mod alloc;
pub mod buffer;
pub mod context;
pub mod device;
pub mod error;
pub mod image;
pub mod instance;
pub mod invocation;
pub mod pass;
pub mod physical_device;
pub mod pool;
pub mod sampler;
pub mod scope;
pub mod task;
pub mod tracking;
pub mod transaction;
mod utils;

pub use alloc::Allocator;
pub use buffer::{Buffer, BufferConfig, BufferUsage, BufferView, HostAccess};
pub use context::Context;
pub use device::{Device, HasDevice, Queue};
pub use error::{Error, Result};
pub use image::{
    DepthImage, DepthImageConfig, DepthImageUsage, DepthImageView, Image, ImageConfig, ImageUsage,
    ImageView, ResourceView,
};
pub use instance::{Instance, InstanceConfig};
pub use invocation::{Invocation, InvocationConfig};
pub use pass::{AttachmentAccess, AttachmentConfig, AttachmentKind, RenderPass, RenderPassConfig};
pub use physical_device::{PhysicalDevice, QueueRole};
pub use pool::ResourcePool;
pub use scope::{pop_frame, push_frame, Scoped};
pub use task::{
    ComputeTaskConfig, GraphicsTaskConfig, ResourceType, Task, Topology, VertexInput, VertexRate,
};
pub use tracking::{Access, ResourceState};
pub use transaction::Transaction;
pub use utils::AsVkHandle;

pub use ash;
pub use ash::vk;
pub use vk_mem;

pub mod prelude {
    pub use crate::device::HasDevice;
    pub use crate::tracking::Access;
    pub use crate::utils::AsVkHandle;
    pub use crate::{
        Buffer, BufferConfig, Context, Image, ImageConfig, Invocation, InvocationConfig,
        RenderPass, RenderPassConfig, ResourcePool, Task, Transaction,
    };
    pub use ash::vk;
}
