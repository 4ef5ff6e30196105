//! Transactions: submitted, synchronizable batches of work.
//!
//! [`Transaction::submit`] lowers an invocation into one command buffer per
//! queue segment, chains the segments with binary semaphores when they span
//! queues, and fences each submission. The transaction retains the invocation
//! (and through it every resource the work touches) until it is dropped, and
//! waits out any in-flight segment before releasing its handles.

use std::{sync::Arc, time::Instant};

use ash::vk;
use smallvec::SmallVec;

use crate::{
    context::{CommandPoolLease, Context},
    device::HasDevice,
    error::Result,
    invocation::Invocation,
    utils::AsVkHandle,
};

/// Poll interval of the wait loop, in nanoseconds.
const SPIN_INTERVAL_NS: u64 = 3_000;

struct Segment {
    // Held so the command pool is not recycled while the buffer is pending.
    _pool: CommandPoolLease,
    fence: vk::Fence,
    semaphore: Option<vk::Semaphore>,
}

/// A submitted batch of GPU work.
#[derive(Clone)]
pub struct Transaction(Arc<TransactionInner>);

struct TransactionInner {
    ctx: Context,
    invocation: Invocation,
    segments: Vec<Segment>,
}

impl Transaction {
    /// Records and submits `invocation`.
    ///
    /// A composite whose children span several queue roles is split into one
    /// command buffer per run of same-role children; each segment waits on a
    /// semaphore signaled by the previous one. Everything else records into a
    /// single command buffer on its inferred queue.
    pub fn submit(invocation: &Invocation) -> Result<Transaction> {
        let ctx = invocation.context().clone();
        let device = ctx.device().clone();
        // Segments are chained with semaphores only; no queue-family
        // ownership transfer is recorded. Resources are EXCLUSIVE, so the
        // chain is well-defined when the segment roles resolve to one family,
        // as they do with the deduplicated queue setup of Device::new.
        // TODO: record a release/acquire barrier pair between segments whose
        // families differ.
        let plan = invocation.segments();
        let flattened = invocation.flattens();
        let count = plan.len();

        let mut segments: Vec<Segment> = Vec::with_capacity(count);
        let mut wait_semaphore: Option<vk::Semaphore> = None;
        for (i, (role, children)) in plan.iter().enumerate() {
            let pool = ctx.acquire_command_pool(device.queue_family(*role))?;
            let cmd = pool.allocate_buffer()?;
            unsafe {
                device.begin_command_buffer(
                    cmd,
                    &vk::CommandBufferBeginInfo {
                        flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
                        ..Default::default()
                    },
                )?;
            }
            if flattened {
                // The root's own timestamps bracket the whole segment chain.
                if i == 0 {
                    if let Some(query) = invocation.query() {
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
                }
                for child in children {
                    child.record(cmd)?;
                }
                if i == count - 1 {
                    if let Some(query) = invocation.query() {
                        unsafe {
                            device.cmd_write_timestamp2(
                                cmd,
                                vk::PipelineStageFlags2::ALL_COMMANDS,
                                query.vk_handle(),
                                1,
                            );
                        }
                    }
                }
            } else {
                invocation.record(cmd)?;
            }
            unsafe {
                device.end_command_buffer(cmd)?;
            }

            let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default(), None)? };
            let signal_semaphore = if i + 1 < count {
                Some(unsafe {
                    device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
                })
            } else {
                None
            };

            let cmd_info = vk::CommandBufferSubmitInfo {
                command_buffer: cmd,
                ..Default::default()
            };
            let wait_infos: SmallVec<[vk::SemaphoreSubmitInfo; 1]> = wait_semaphore
                .iter()
                .map(|&semaphore| vk::SemaphoreSubmitInfo {
                    semaphore,
                    stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
                    ..Default::default()
                })
                .collect();
            let signal_infos: SmallVec<[vk::SemaphoreSubmitInfo; 1]> = signal_semaphore
                .iter()
                .map(|&semaphore| vk::SemaphoreSubmitInfo {
                    semaphore,
                    stage_mask: vk::PipelineStageFlags2::ALL_COMMANDS,
                    ..Default::default()
                })
                .collect();
            let submit = vk::SubmitInfo2::default()
                .wait_semaphore_infos(&wait_infos)
                .command_buffer_infos(std::slice::from_ref(&cmd_info))
                .signal_semaphore_infos(&signal_infos);
            unsafe {
                device.queue_submit2(ctx.queue(*role).vk_handle(), &[submit], fence)?;
            }

            segments.push(Segment {
                _pool: pool,
                fence,
                semaphore: signal_semaphore,
            });
            wait_semaphore = segments.last().and_then(|s| s.semaphore);
        }

        tracing::debug!(
            label = invocation.label(),
            segments = count,
            "submit transaction"
        );
        Ok(Transaction(Arc::new(TransactionInner {
            ctx,
            invocation: invocation.clone(),
            segments,
        })))
    }

    pub fn invocation(&self) -> &Invocation {
        &self.0.invocation
    }

    /// Polls the fences without blocking. True when every segment finished.
    pub fn is_done(&self) -> Result<bool> {
        let device = self.0.ctx.device();
        for segment in &self.0.segments {
            if !unsafe { device.get_fence_status(segment.fence)? } {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Blocks until every segment finished, spinning on the fences with a
    /// short interval. Logs the elapsed wall time.
    pub fn wait(&self) -> Result<()> {
        let start = Instant::now();
        let device = self.0.ctx.device();
        let fences: SmallVec<[vk::Fence; 2]> =
            self.0.segments.iter().map(|s| s.fence).collect();
        loop {
            match unsafe { device.wait_for_fences(&fences, true, SPIN_INTERVAL_NS) } {
                Ok(()) => break,
                // The interval elapsing is the spin, not a failure.
                Err(vk::Result::TIMEOUT) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        tracing::info!(
            label = self.0.invocation.label(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "transaction done"
        );
        Ok(())
    }
}

impl Drop for TransactionInner {
    fn drop(&mut self) {
        let device = self.ctx.device();
        let fences: SmallVec<[vk::Fence; 2]> = self.segments.iter().map(|s| s.fence).collect();
        unsafe {
            if !fences.is_empty() {
                // Handles must not be released while the GPU still uses them.
                let _ = device.wait_for_fences(&fences, true, u64::MAX);
            }
            for segment in &self.segments {
                device.destroy_fence(segment.fence, None);
                if let Some(semaphore) = segment.semaphore {
                    device.destroy_semaphore(semaphore, None);
                }
            }
        }
    }
}
