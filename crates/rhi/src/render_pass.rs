//! Render pass and framebuffer management.
//!
//! The engine uses a single fixed render pass: one color attachment
//! (cleared, stored, presented) and one depth attachment (cleared,
//! discarded). Each swapchain image gets a framebuffer combining its view
//! with the shared depth view.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan render pass wrapper.
pub struct RenderPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan render pass handle.
    render_pass: vk::RenderPass,
}

impl RenderPass {
    /// Creates the engine's color + depth render pass.
    ///
    /// The color attachment is cleared on load, stored, and ends in
    /// PRESENT_SRC layout. The depth attachment is cleared on load and
    /// its contents discarded after the pass.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `color_format` - Format of the swapchain images
    /// * `depth_format` - Format of the depth attachment
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn new(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let attachments = [
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
            vk::AttachmentDescription::default()
                .format(depth_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ];

        let color_reference = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let depth_reference = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_reference))
            .depth_stencil_attachment(&depth_reference);

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass));

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        info!(
            "Render pass created (color {:?}, depth {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_render_pass(self.render_pass, None);
        }
        debug!("Destroyed render pass");
    }
}

/// Vulkan framebuffer wrapper.
///
/// Combines attachment views (swapchain color view + depth view) for one
/// swapchain image.
pub struct Framebuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan framebuffer handle.
    framebuffer: vk::Framebuffer,
    /// Framebuffer extent.
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer over the given attachment views.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `render_pass` - The compatible render pass
    /// * `attachments` - Attachment views, in render pass order
    /// * `extent` - Framebuffer dimensions
    ///
    /// # Errors
    ///
    /// Returns an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        debug!(
            "Created framebuffer {}x{} with {} attachment(s)",
            extent.width,
            extent.height,
            attachments.len()
        );

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the framebuffer extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_framebuffer(self.framebuffer, None);
        }
        debug!("Destroyed framebuffer");
    }
}
