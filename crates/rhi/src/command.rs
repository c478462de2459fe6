//! Command pool and command buffer management.
//!
//! [`CommandPool`] allocates command buffers for one queue family.
//! [`CommandBuffer`] is a thin typed recorder: every method translates
//! 1:1 to the native recording call, with no batching or reordering, and
//! call order is enforced by convention only:
//!
//! ```text
//! begin -> [begin_render_pass -> binds/draws -> end_render_pass]* -> end
//! ```
//!
//! [`submit_one_shot`] records, submits, and fences out a short-lived
//! command buffer for load-time transfers.

use std::sync::Arc;

use ash::vk;
use tracing::info;

use crate::device::Device;
use crate::error::RhiResult;
use crate::sync::Fence;

/// Vulkan command pool wrapper.
///
/// Created with the RESET_COMMAND_BUFFER flag so individual buffers can
/// be reset without resetting the pool. Not thread-safe; recording
/// happens on the single host submission thread.
pub struct CommandPool {
    device: Arc<Device>,
    pool: vk::CommandPool,
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a command pool for `queue_family_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        info!("Command pool created (queue family {})", queue_family_index);

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    /// Returns the queue family this pool serves.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates one primary command buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate_command_buffer(&self) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.handle().allocate_command_buffers(&alloc_info)? };
        Ok(buffers[0])
    }

    /// Returns a command buffer to the pool.
    pub fn free_command_buffer(&self, buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.pool, &[buffer]);
        }
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed (queue family {})",
            self.queue_family_index
        );
    }
}

/// Typed command recorder over one VkCommandBuffer.
///
/// Stateless between begin/end pairs; every bind is explicit. The wrapper
/// does not own the handle: the owning pool frees it.
pub struct CommandBuffer {
    device: Arc<Device>,
    buffer: vk::CommandBuffer,
}

impl CommandBuffer {
    /// Allocates a recorder from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let buffer = pool.allocate_command_buffer()?;
        Ok(Self { device, buffer })
    }

    /// Wraps an existing command buffer handle.
    #[inline]
    pub fn from_handle(device: Arc<Device>, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    /// Returns the raw command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording commands that will be resubmitted every frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is already recording.
    pub fn begin(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default();
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Begins recording for a single submission (one-shot transfers).
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is already recording.
    pub fn begin_one_time(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)?;
        }
        Ok(())
    }

    /// Ends recording; the buffer is then ready for submission.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not recording.
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device.handle().end_command_buffer(self.buffer)?;
        }
        Ok(())
    }

    /// Resets the buffer so it can be re-recorded without reallocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?;
        }
        Ok(())
    }

    // =========================================================================
    // Render Pass Scope
    // =========================================================================

    /// Begins a render pass over `framebuffer`, clearing color to
    /// `clear_color` and depth to 1.0.
    ///
    /// Vertex buffers cannot be bound until a render pass has begun.
    pub fn begin_render_pass(
        &self,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ];

        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                &begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    /// Ends the current render pass.
    pub fn end_render_pass(&self) {
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Binds a graphics pipeline.
    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe {
            self.device.handle().cmd_bind_pipeline(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                pipeline,
            );
        }
    }

    /// Sets the viewport.
    pub fn set_viewport(&self, viewport: &vk::Viewport) {
        unsafe {
            self.device
                .handle()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport));
        }
    }

    /// Sets the scissor rectangle.
    pub fn set_scissor(&self, scissor: &vk::Rect2D) {
        unsafe {
            self.device
                .handle()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor));
        }
    }

    /// Binds a vertex buffer to `binding` at `offset`.
    pub fn bind_vertex_buffer(&self, binding: u32, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.device.handle().cmd_bind_vertex_buffers(
                self.buffer,
                binding,
                &[buffer],
                &[offset],
            );
        }
    }

    /// Binds an index buffer of 32-bit indices at `offset`.
    pub fn bind_index_buffer(&self, buffer: vk::Buffer, offset: vk::DeviceSize) {
        unsafe {
            self.device.handle().cmd_bind_index_buffer(
                self.buffer,
                buffer,
                offset,
                vk::IndexType::UINT32,
            );
        }
    }

    /// Binds a descriptor set into `set_index`, with one dynamic offset
    /// per dynamic descriptor in the set.
    pub fn bind_descriptor_set(
        &self,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.handle().cmd_bind_descriptor_sets(
                self.buffer,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                dynamic_offsets,
            );
        }
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    /// Draws `vertex_count` vertices of a single instance.
    pub fn draw(&self, vertex_count: u32, first_vertex: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw(self.buffer, vertex_count, 1, first_vertex, 0);
        }
    }

    /// Draws `index_count` indices of a single instance.
    pub fn draw_indexed(&self, index_count: u32, first_index: u32) {
        unsafe {
            self.device
                .handle()
                .cmd_draw_indexed(self.buffer, index_count, 1, first_index, 0, 0);
        }
    }

    // =========================================================================
    // Copies and Barriers
    // =========================================================================

    /// Copies `size` bytes between buffers, offset 0 to offset 0.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy::default().size(size);
        unsafe {
            self.device
                .handle()
                .cmd_copy_buffer(self.buffer, src, dst, &[region]);
        }
    }

    /// Copies a tightly-packed buffer into the color aspect of an image
    /// that is in TRANSFER_DST_OPTIMAL layout.
    pub fn copy_buffer_to_image(&self, src: vk::Buffer, dst: vk::Image, width: u32, height: u32) {
        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .image_subresource(
                vk::ImageSubresourceLayers::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .mip_level(0)
                    .base_array_layer(0)
                    .layer_count(1),
            )
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        unsafe {
            self.device.handle().cmd_copy_buffer_to_image(
                self.buffer,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    /// Inserts a pipeline barrier carrying image memory barriers.
    pub fn pipeline_barrier(
        &self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        image_barriers: &[vk::ImageMemoryBarrier],
    ) {
        unsafe {
            self.device.handle().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                image_barriers,
            );
        }
    }
}

/// Records and submits a one-shot command buffer, blocking on a fence
/// until the GPU has executed it.
///
/// Stalls the whole pipeline; for load-time transfers only, never the
/// steady-state frame loop.
///
/// # Errors
///
/// Returns an error if allocation, recording, submission, or the fence
/// wait fails.
pub fn submit_one_shot<F>(device: &Arc<Device>, pool: &CommandPool, record: F) -> RhiResult<()>
where
    F: FnOnce(&CommandBuffer) -> RhiResult<()>,
{
    let cmd = CommandBuffer::new(device.clone(), pool)?;
    cmd.begin_one_time()?;
    record(&cmd)?;
    cmd.end()?;

    let fence = Fence::new(device.clone(), false)?;

    let command_buffers = [cmd.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    unsafe {
        device.submit_graphics(&[submit_info], fence.handle())?;
    }
    fence.wait(u64::MAX)?;

    pool.free_command_buffer(cmd.handle());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_types_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
