//! Resource state tracking and pipeline barrier derivation.
//!
//! Every buffer and image carries a [`ResourceState`] describing how it was
//! last touched: the most recent write, the stages that have read it since,
//! and (for images) the current layout. When an invocation is lowered into a
//! command buffer, each use of a resource declares the [`Access`] it needs and
//! the state computes the minimal barrier to get there, updating itself in
//! place.
//!
//! The state is owned by the resource and mutated only through the lowering
//! path; the single-threaded submission model means no further synchronization
//! is required.

use std::{
    fmt::Debug,
    ops::{BitOr, BitOrAssign},
};

use ash::vk;

/// A pipeline stage and access mask pair describing one use of a resource.
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Access {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}
impl BitOr for Access {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            stage: self.stage | rhs.stage,
            access: self.access | rhs.access,
        }
    }
}
impl BitOrAssign for Access {
    fn bitor_assign(&mut self, rhs: Self) {
        self.stage |= rhs.stage;
        self.access |= rhs.access;
    }
}

impl Access {
    pub const NONE: Access = Access {
        stage: vk::PipelineStageFlags2::NONE,
        access: vk::AccessFlags2::NONE,
    };
    pub const HOST_READ: Access = Access {
        stage: vk::PipelineStageFlags2::HOST,
        access: vk::AccessFlags2::HOST_READ,
    };
    pub const HOST_WRITE: Access = Access {
        stage: vk::PipelineStageFlags2::HOST,
        access: vk::AccessFlags2::HOST_WRITE,
    };
    pub const COPY_READ: Access = Access {
        stage: vk::PipelineStageFlags2::COPY,
        access: vk::AccessFlags2::TRANSFER_READ,
    };
    pub const COPY_WRITE: Access = Access {
        stage: vk::PipelineStageFlags2::COPY,
        access: vk::AccessFlags2::TRANSFER_WRITE,
    };
    pub const VERTEX_READ: Access = Access {
        stage: vk::PipelineStageFlags2::VERTEX_INPUT,
        access: vk::AccessFlags2::VERTEX_ATTRIBUTE_READ,
    };
    pub const INDEX_READ: Access = Access {
        stage: vk::PipelineStageFlags2::INDEX_INPUT,
        access: vk::AccessFlags2::INDEX_READ,
    };
    pub const UNIFORM_READ: Access = Access {
        stage: vk::PipelineStageFlags2::ALL_GRAPHICS,
        access: vk::AccessFlags2::UNIFORM_READ,
    };
    pub const COMPUTE_READ: Access = Access {
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_READ,
    };
    pub const COMPUTE_WRITE: Access = Access {
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_WRITE,
    };
    pub const FRAGMENT_SAMPLED_READ: Access = Access {
        stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
    };
    pub const COLOR_ATTACHMENT: Access = Access {
        stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
    };
    pub const DEPTH_ATTACHMENT: Access = Access {
        stage: vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
        ),
        access: vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
    };

    pub fn is_writeonly(&self) -> bool {
        if self.access == vk::AccessFlags2::empty() {
            return false;
        }
        // Clear all the write bits. If nothing is left, there were no read bits.
        self.access & !utils::ALL_WRITE_BITS == vk::AccessFlags2::NONE
    }

    pub fn is_readonly(&self) -> bool {
        if self.access == vk::AccessFlags2::empty() {
            return false;
        }
        self.access & !utils::ALL_READ_BITS == vk::AccessFlags2::NONE
    }
}

/// The dynamic state of a resource: last write, pending reads, and current
/// image layout.
///
/// Buffers ignore the layout field. A fresh resource starts at the default
/// state, which means "never accessed"; the first transition emits no barrier
/// unless a layout change is requested.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct ResourceState {
    /// The stage and access flags of the most recent write.
    pub write: Access,

    /// Stages that have read from the resource since the last write. Tracks
    /// the earliest such stage so that later reads need no extra barrier.
    pub reads: vk::PipelineStageFlags2,

    /// Current image layout. Unused for buffers.
    pub layout: vk::ImageLayout,
}
impl Debug for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut debug = f.debug_struct("ResourceState");
        debug.field("write_stage", &self.write.stage);
        debug.field("write_access", &self.write.access);
        debug.field("pending_read_stages", &self.reads);
        if self.layout != vk::ImageLayout::default() {
            debug.field("image_layout", &self.layout);
        }
        debug.finish()
    }
}

/// A source/destination scope pair accumulated into one pipeline barrier.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct MemoryBarrier {
    pub src: Access,
    pub dst: Access,
}
impl BitOr for MemoryBarrier {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self {
            src: self.src | rhs.src,
            dst: self.dst | rhs.dst,
        }
    }
}
impl BitOrAssign for MemoryBarrier {
    fn bitor_assign(&mut self, rhs: Self) {
        self.src |= rhs.src;
        self.dst |= rhs.dst;
    }
}

impl ResourceState {
    /// Create a new state with a presumed initial access.
    pub fn new(access: Access) -> Self {
        Self {
            write: access,
            reads: vk::PipelineStageFlags2::empty(),
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    /// Computes the minimal barrier needed to move from the current state to
    /// `next`, then updates the state in place.
    ///
    /// The cases, in order:
    ///
    /// 1. First use: no barrier, unless a layout transition is requested in
    ///    which case an image barrier with an empty source scope is emitted.
    /// 2. Read after read: if the new read is at a stage no earlier than the
    ///    pending reads, the data is already visible and no barrier is needed.
    ///    An earlier-stage read needs an execution-only barrier.
    /// 3. Write after read (WAR): execution dependency against the pending
    ///    read stages, with empty access masks. A layout transition keeps the
    ///    destination access mask, since the transition itself writes.
    /// 4. Write after write: full memory barrier from the previous write.
    pub(crate) fn transition(&mut self, next: Access, with_layout_transition: bool) -> MemoryBarrier {
        let mut barrier = MemoryBarrier {
            src: self.write,
            dst: next,
        };
        if self.write == Default::default() {
            if with_layout_transition {
                barrier.src = Access::default();
            } else {
                barrier = MemoryBarrier::default();
            }
        } else if next.is_readonly() && !with_layout_transition {
            if let Some(ordering) = utils::compare_pipeline_stages(self.reads, next.stage) {
                if ordering.is_gt() {
                    barrier.src.stage = self.reads;
                    barrier.src.access = vk::AccessFlags2::empty();
                    barrier.dst.access = vk::AccessFlags2::empty();
                } else {
                    // Already made visible at the desired stage.
                    barrier = MemoryBarrier::default();
                }
            }
        } else {
            if self.reads != vk::PipelineStageFlags2::empty() {
                // WAR hazard: an execution dependency suffices, no access
                // masks needed. A layout transition still counts as a write,
                // so the destination access mask must stay.
                barrier.src.stage = self.reads;
                barrier.src.access = vk::AccessFlags2::empty();
                if !with_layout_transition {
                    barrier.dst.access = vk::AccessFlags2::empty();
                }
            }
        }
        if next.is_readonly() {
            self.reads = utils::earlier_stage(self.reads, next.stage);
        } else {
            self.write = next;
            self.reads = vk::PipelineStageFlags2::empty();
        }
        barrier
    }
}

mod utils {
    use ash::vk;
    use std::cmp::Ordering;

    pub const ALL_WRITE_BITS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::HOST_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
    );
    pub const ALL_READ_BITS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::INDIRECT_COMMAND_READ.as_raw()
            | vk::AccessFlags2::INDEX_READ.as_raw()
            | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ.as_raw()
            | vk::AccessFlags2::UNIFORM_READ.as_raw()
            | vk::AccessFlags2::INPUT_ATTACHMENT_READ.as_raw()
            | vk::AccessFlags2::SHADER_READ.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
            | vk::AccessFlags2::TRANSFER_READ.as_raw()
            | vk::AccessFlags2::HOST_READ.as_raw()
            | vk::AccessFlags2::MEMORY_READ.as_raw()
            | vk::AccessFlags2::SHADER_SAMPLED_READ.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_READ.as_raw(),
    );

    const GRAPHICS_PIPELINE_ORDER: [vk::PipelineStageFlags2; 10] = [
        vk::PipelineStageFlags2::DRAW_INDIRECT,
        vk::PipelineStageFlags2::INDEX_INPUT,
        vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT,
        vk::PipelineStageFlags2::VERTEX_SHADER,
        vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER,
        vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER,
        vk::PipelineStageFlags2::GEOMETRY_SHADER,
        vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
    ];
    const COMPUTE_PIPELINE_ORDER: [vk::PipelineStageFlags2; 2] = [
        vk::PipelineStageFlags2::DRAW_INDIRECT,
        vk::PipelineStageFlags2::COMPUTE_SHADER,
    ];
    const ALL_ORDERS: [&[vk::PipelineStageFlags2]; 2] =
        [&GRAPHICS_PIPELINE_ORDER, &COMPUTE_PIPELINE_ORDER];

    /// Compare two pipeline stages. Returns [`Ordering::Less`] if `a` is
    /// earlier than `b`, [`None`] if the two stages are mutually unordered.
    pub fn compare_pipeline_stages(
        a: vk::PipelineStageFlags2,
        b: vk::PipelineStageFlags2,
    ) -> Option<Ordering> {
        if a == b {
            return Some(Ordering::Equal);
        }
        for order in ALL_ORDERS.iter() {
            let first_index: Option<usize> = order.iter().position(|&x| a.contains(x));
            let second_index: Option<usize> = order.iter().position(|&x| b.contains(x));
            if let (Some(first_index), Some(second_index)) = (first_index, second_index) {
                return first_index.partial_cmp(&second_index);
            }
        }
        None
    }

    pub fn earlier_stage(
        a: vk::PipelineStageFlags2,
        b: vk::PipelineStageFlags2,
    ) -> vk::PipelineStageFlags2 {
        if let Some(ordering) = compare_pipeline_stages(a, b) {
            if ordering.is_le() {
                a
            } else {
                b
            }
        } else {
            a | b
        }
    }
}

#[cfg(test)]
mod tests {
    use super::utils::{compare_pipeline_stages, earlier_stage};
    use super::*;

    #[test]
    fn test_earlier_stage() {
        assert_eq!(
            earlier_stage(
                vk::PipelineStageFlags2::INDEX_INPUT,
                vk::PipelineStageFlags2::INDEX_INPUT
            ),
            vk::PipelineStageFlags2::INDEX_INPUT
        );
        assert_eq!(
            earlier_stage(
                vk::PipelineStageFlags2::VERTEX_SHADER,
                vk::PipelineStageFlags2::FRAGMENT_SHADER
            ),
            vk::PipelineStageFlags2::VERTEX_SHADER
        );
        assert_eq!(
            earlier_stage(
                vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags2::FRAGMENT_SHADER
            ),
            vk::PipelineStageFlags2::FRAGMENT_SHADER
        );
        assert_eq!(
            earlier_stage(
                vk::PipelineStageFlags2::VERTEX_SHADER,
                vk::PipelineStageFlags2::TRANSFER
            ),
            vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::TRANSFER
        );
    }

    #[test]
    fn test_compare_pipeline_stages() {
        assert!(
            compare_pipeline_stages(
                vk::PipelineStageFlags2::INDEX_INPUT,
                vk::PipelineStageFlags2::INDEX_INPUT
            )
            .unwrap()
            .is_eq()
        );
        assert!(
            compare_pipeline_stages(
                vk::PipelineStageFlags2::INDEX_INPUT,
                vk::PipelineStageFlags2::FRAGMENT_SHADER
            )
            .unwrap()
            .is_lt()
        );
        assert!(
            compare_pipeline_stages(
                vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS,
                vk::PipelineStageFlags2::FRAGMENT_SHADER
            )
            .unwrap()
            .is_lt()
        );
        assert!(
            compare_pipeline_stages(
                vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
                vk::PipelineStageFlags2::FRAGMENT_SHADER
            )
            .unwrap()
            .is_gt()
        );
        assert!(
            compare_pipeline_stages(
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::PipelineStageFlags2::FRAGMENT_SHADER
            )
            .is_none()
        );
    }

    /// Write then two ordered-later reads: one barrier, then nothing.
    #[test]
    fn test_write_read_read() {
        let mut state = ResourceState::default();
        let barrier = state.transition(Access::COMPUTE_WRITE, false);
        assert_eq!(barrier, MemoryBarrier::default());
        let barrier = state.transition(
            Access {
                stage: vk::PipelineStageFlags2::VERTEX_SHADER,
                access: vk::AccessFlags2::SHADER_READ,
            },
            false,
        );
        assert_eq!(
            barrier,
            MemoryBarrier {
                src: Access::COMPUTE_WRITE,
                dst: Access {
                    stage: vk::PipelineStageFlags2::VERTEX_SHADER,
                    access: vk::AccessFlags2::SHADER_READ,
                },
            }
        );
        // Fragment shader is later than vertex shader, data already visible.
        let barrier = state.transition(Access::FRAGMENT_SAMPLED_READ, false);
        assert_eq!(barrier, MemoryBarrier::default());
        assert_eq!(state.reads, vk::PipelineStageFlags2::VERTEX_SHADER);
    }

    /// Read at an earlier stage than the pending reads needs an
    /// execution-only barrier.
    #[test]
    fn test_read_at_earlier_stage() {
        let mut state = ResourceState::default();
        state.transition(Access::COPY_WRITE, false);
        state.transition(Access::FRAGMENT_SAMPLED_READ, false);
        let barrier = state.transition(
            Access {
                stage: vk::PipelineStageFlags2::VERTEX_SHADER,
                access: vk::AccessFlags2::SHADER_READ,
            },
            false,
        );
        assert_eq!(
            barrier,
            MemoryBarrier {
                src: Access {
                    stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    access: vk::AccessFlags2::empty(),
                },
                dst: Access {
                    stage: vk::PipelineStageFlags2::VERTEX_SHADER,
                    access: vk::AccessFlags2::empty(),
                },
            }
        );
        assert_eq!(state.reads, vk::PipelineStageFlags2::VERTEX_SHADER);
    }

    /// Write after read is an execution dependency with empty access masks.
    #[test]
    fn test_write_after_read() {
        let mut state = ResourceState::default();
        state.transition(Access::COPY_WRITE, false);
        state.transition(Access::COMPUTE_READ, false);
        let barrier = state.transition(Access::COMPUTE_WRITE, false);
        assert_eq!(
            barrier,
            MemoryBarrier {
                src: Access {
                    stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    access: vk::AccessFlags2::empty(),
                },
                dst: Access {
                    stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
                    access: vk::AccessFlags2::empty(),
                },
            }
        );
        assert_eq!(state.write, Access::COMPUTE_WRITE);
        assert_eq!(state.reads, vk::PipelineStageFlags2::empty());
    }

    /// Write after write is a full memory barrier.
    #[test]
    fn test_write_after_write() {
        let mut state = ResourceState::default();
        state.transition(Access::COPY_WRITE, false);
        let barrier = state.transition(Access::COMPUTE_WRITE, false);
        assert_eq!(
            barrier,
            MemoryBarrier {
                src: Access::COPY_WRITE,
                dst: Access::COMPUTE_WRITE,
            }
        );
    }

    /// A layout transition after reads keeps the destination access mask,
    /// since the transition itself is a write.
    #[test]
    fn test_write_after_read_with_layout_transition() {
        let mut state = ResourceState::default();
        state.transition(Access::COPY_WRITE, false);
        state.transition(Access::FRAGMENT_SAMPLED_READ, false);
        let barrier = state.transition(Access::COLOR_ATTACHMENT, true);
        assert_eq!(
            barrier,
            MemoryBarrier {
                src: Access {
                    stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    access: vk::AccessFlags2::empty(),
                },
                dst: Access::COLOR_ATTACHMENT,
            }
        );
    }

    /// First use with a layout transition has an empty source scope.
    #[test]
    fn test_first_use_layout_transition() {
        let mut state = ResourceState::default();
        let barrier = state.transition(Access::COPY_WRITE, true);
        assert_eq!(
            barrier,
            MemoryBarrier {
                src: Access::default(),
                dst: Access::COPY_WRITE,
            }
        );
    }
}
