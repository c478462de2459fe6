//! Frame orchestration.
//!
//! This module provides the [`FrameManager`], which owns everything the
//! per-frame loop touches:
//!
//! - Per-swapchain-image resources: a framebuffer, a command recorder
//!   whose contents are recorded once and resubmitted, and a completion
//!   fence
//! - Two device-wide semaphores: image-acquired and render-complete
//! - A monotonically increasing frame counter
//! - The [`FrameTimeline`] enforcing the wait-before-update discipline
//!
//! # The Frame Loop
//!
//! ```text
//! 1. acquire       - get the next swapchain image index
//! 2. wait_for_image - block on that image's fence from its previous use,
//!                     then reset it. This is the only thing stopping the
//!                     CPU from overwriting uniform regions the GPU is
//!                     still reading.
//! 3. begin_update  - write this backbuffer's uniform regions
//! 4. submit        - resubmit the image's prebuilt command buffer
//!                    (waits image-acquired at color-attachment-output,
//!                    signals render-complete and the image's fence)
//! 5. present       - present, waiting on render-complete
//! ```
//!
//! Acquire/present failures such as an out-of-date swapchain are logged
//! and propagated; the engine does not recreate the swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use smalt_rhi::command::{CommandBuffer, CommandPool};
use smalt_rhi::device::Device;
use smalt_rhi::render_pass::{Framebuffer, RenderPass};
use smalt_rhi::swapchain::Swapchain;
use smalt_rhi::sync::{Fence, Semaphore};
use smalt_rhi::{RhiError, RhiResult};

use crate::draw_list::DrawList;
use crate::frame::{FrameOrderViolation, FrameTimeline};

/// Per-swapchain-image resources.
struct FrameResources {
    /// Framebuffer over this image's color view plus the shared depth view.
    framebuffer: Framebuffer,
    /// Command buffer recorded once at startup and resubmitted each frame.
    recorder: CommandBuffer,
    /// Signaled when this image's last submission finishes on the GPU.
    fence: Fence,
}

/// Owns the swapchain-facing frame loop state and drives each frame
/// through acquire, wait, update, submit, and present.
///
/// # Thread Safety
///
/// Not thread-safe; the frame loop runs on the single host submission
/// thread.
pub struct FrameManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Per-swapchain-image resources.
    frames: Vec<FrameResources>,
    /// Signaled by acquisition when the image is ready to render into.
    image_acquired: Semaphore,
    /// Signaled by submission when rendering is complete.
    render_complete: Semaphore,
    /// Ordering bookkeeping per image.
    timeline: FrameTimeline,
    /// Backbuffer index set by the most recent acquisition.
    image_index: u32,
    /// Monotonically increasing frame counter.
    frame_count: u64,
}

impl FrameManager {
    /// Creates frame resources for every swapchain image.
    ///
    /// Fences start signaled so each image's first wait passes without a
    /// prior submission.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - Command pool the per-image recorders allocate from
    /// * `render_pass` - The render pass the framebuffers attach to
    /// * `swapchain` - The swapchain supplying color views
    /// * `depth_view` - The shared depth attachment view
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails.
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        render_pass: &RenderPass,
        swapchain: &Swapchain,
        depth_view: vk::ImageView,
    ) -> RhiResult<Self> {
        let image_count = swapchain.image_count() as usize;
        let mut frames = Vec::with_capacity(image_count);

        for i in 0..image_count {
            let attachments = [swapchain.image_view(i), depth_view];
            let framebuffer = Framebuffer::new(
                device.clone(),
                render_pass,
                &attachments,
                swapchain.extent(),
            )?;

            let recorder = CommandBuffer::new(device.clone(), pool)?;
            // Signaled so the image's first wait does not block forever
            let fence = Fence::new(device.clone(), true)?;

            debug!("Created frame resources for swapchain image {}", i);

            frames.push(FrameResources {
                framebuffer,
                recorder,
                fence,
            });
        }

        let image_acquired = Semaphore::new(device.clone())?;
        let render_complete = Semaphore::new(device.clone())?;

        info!("Frame manager created for {} swapchain images", image_count);

        Ok(Self {
            device,
            frames,
            image_acquired,
            render_complete,
            timeline: FrameTimeline::new(image_count),
            image_index: 0,
            frame_count: 0,
        })
    }

    /// Records each image's command buffer from its draw list.
    ///
    /// Called once at startup. Each buffer scopes a render pass over its
    /// image's framebuffer, replays the list, and is then merely
    /// resubmitted every frame.
    ///
    /// # Arguments
    ///
    /// * `render_pass` - The render pass to scope
    /// * `draw_lists` - One list per swapchain image
    /// * `clear_color` - RGBA clear value for the color attachment
    ///
    /// # Errors
    ///
    /// Returns an error if the list count mismatches the image count or
    /// recording fails.
    pub fn record_draw_lists(
        &self,
        render_pass: &RenderPass,
        draw_lists: &[DrawList],
        clear_color: [f32; 4],
    ) -> RhiResult<()> {
        if draw_lists.len() != self.frames.len() {
            return Err(RhiError::InvalidHandle(format!(
                "Expected {} draw lists, got {}",
                self.frames.len(),
                draw_lists.len()
            )));
        }

        for (frame, list) in self.frames.iter().zip(draw_lists) {
            frame.recorder.begin()?;
            frame.recorder.begin_render_pass(
                render_pass.handle(),
                frame.framebuffer.handle(),
                frame.framebuffer.extent(),
                clear_color,
            );
            list.replay(&frame.recorder);
            frame.recorder.end_render_pass();
            frame.recorder.end()?;
        }

        info!(
            "Recorded {} command buffers from draw lists",
            self.frames.len()
        );

        Ok(())
    }

    /// Acquires the next swapchain image, signaling the image-acquired
    /// semaphore.
    ///
    /// # Errors
    ///
    /// An out-of-date swapchain (or any other acquisition failure) is
    /// logged and propagated; there is no recovery path.
    pub fn acquire(&mut self, swapchain: &Swapchain) -> RhiResult<u32> {
        let (index, suboptimal) = swapchain
            .acquire_next_image(self.image_acquired.handle())
            .map_err(|e| {
                error!("Swapchain acquisition failed: {:?}", e);
                RhiError::VulkanError(e)
            })?;

        if suboptimal {
            debug!("Swapchain reported suboptimal during acquire");
        }

        self.timeline.acquire(index).map_err(order_violation)?;
        self.image_index = index;
        self.frame_count += 1;

        Ok(index)
    }

    /// Blocks until the acquired image's previous submission completes,
    /// then resets its fence.
    ///
    /// Must be called after [`acquire`](Self::acquire) and before any
    /// CPU write into the image's uniform regions.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait or reset fails.
    pub fn wait_for_image(&mut self) -> RhiResult<()> {
        let frame = &self.frames[self.image_index as usize];
        frame.fence.wait(u64::MAX)?;
        frame.fence.reset()?;

        self.timeline
            .wait_complete(self.image_index)
            .map_err(order_violation)?;

        Ok(())
    }

    /// Marks the start of uniform writes for the acquired image and
    /// returns its backbuffer index.
    ///
    /// Rejected if the image's fence has not been waited on this frame.
    ///
    /// # Errors
    ///
    /// Returns an error on an out-of-order frame step.
    pub fn begin_update(&mut self) -> RhiResult<u32> {
        self.timeline
            .begin_update(self.image_index)
            .map_err(order_violation)?;
        Ok(self.image_index)
    }

    /// Submits the acquired image's prebuilt command buffer.
    ///
    /// Waits on the image-acquired semaphore at the color-attachment
    /// stage, signals the render-complete semaphore, and signals the
    /// image's fence on completion.
    ///
    /// # Errors
    ///
    /// Returns an error if submission fails.
    pub fn submit(&mut self) -> RhiResult<()> {
        self.timeline
            .submit(self.image_index)
            .map_err(order_violation)?;

        let frame = &self.frames[self.image_index as usize];

        let wait_semaphores = [self.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [self.render_complete.handle()];
        let command_buffers = [frame.recorder.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.fence.handle())?;
        }

        Ok(())
    }

    /// Presents the acquired image, waiting on the render-complete
    /// semaphore.
    ///
    /// # Errors
    ///
    /// Presentation failures (out-of-date swapchain included) are logged
    /// and propagated; there is no recovery path.
    pub fn present(&mut self, swapchain: &Swapchain) -> RhiResult<()> {
        self.timeline
            .present(self.image_index)
            .map_err(order_violation)?;

        let suboptimal = swapchain
            .present(
                self.device.present_queue(),
                self.image_index,
                self.render_complete.handle(),
            )
            .map_err(|e| {
                error!("Presentation failed: {:?}", e);
                RhiError::VulkanError(e)
            })?;

        if suboptimal {
            debug!("Swapchain reported suboptimal during present");
        }

        Ok(())
    }

    /// Backbuffer index set by the most recent acquisition.
    #[inline]
    pub fn image_index(&self) -> u32 {
        self.image_index
    }

    /// Total frames started so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Number of swapchain images managed.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.frames.len()
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

/// Maps a frame-ordering violation onto the RHI error type.
fn order_violation(violation: FrameOrderViolation) -> RhiError {
    RhiError::InvalidHandle(violation.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_manager_is_send() {
        // Compile-time check that FrameManager is Send
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }
}
