//! 2D texture and image layout management.
//!
//! A [`Texture2D`] owns a Vulkan image, its view, an optional sampler, and
//! a pool allocation. Pixel data arrives through a staging upload with
//! explicit layout transitions.
//!
//! # Layout State Machine
//!
//! Image layouts are modeled as an explicit state machine. The typical
//! upload path is:
//!
//! ```text
//! Undefined -> TransferDst -> ShaderReadOnly
//! ```
//!
//! The barrier access masks for each hop come from a lookup over the
//! {current layout, target layout} pair. A pair outside the table is a
//! reported error, never a silently-permissive zero mask.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::allocator::Allocation;
use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandPool, submit_one_shot};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Depth attachment format used by the engine.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;

/// Tracked image layout states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureLayout {
    /// Initial layout; contents are undefined.
    Undefined,
    /// Initial layout for linear images with host-written contents.
    Preinitialized,
    /// Source of a transfer (copy, blit).
    TransferSrc,
    /// Destination of a transfer.
    TransferDst,
    /// Sampled by shaders.
    ShaderReadOnly,
}

impl TextureLayout {
    /// Converts to the Vulkan image layout.
    pub fn to_vk_layout(self) -> vk::ImageLayout {
        match self {
            TextureLayout::Undefined => vk::ImageLayout::UNDEFINED,
            TextureLayout::Preinitialized => vk::ImageLayout::PREINITIALIZED,
            TextureLayout::TransferSrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            TextureLayout::TransferDst => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TextureLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// Looks up the barrier access masks for a layout transition.
///
/// Returns `(src_access_mask, dst_access_mask)` for the given hop.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] for any pair outside
/// the supported table.
pub fn barrier_access_masks(
    from: TextureLayout,
    to: TextureLayout,
) -> RhiResult<(vk::AccessFlags, vk::AccessFlags)> {
    let src = match from {
        // Only valid as initial layout, memory contents are not preserved
        TextureLayout::Undefined => vk::AccessFlags::empty(),
        // Host writes to the image must have finished
        TextureLayout::Preinitialized => vk::AccessFlags::HOST_WRITE,
        // Writes to the image must have finished
        TextureLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
        _ => return Err(RhiError::UnsupportedLayoutTransition { from, to }),
    };

    let dst = match to {
        // Reads from the image must have finished
        TextureLayout::TransferSrc => vk::AccessFlags::TRANSFER_READ,
        // Writes to the image must have finished
        TextureLayout::TransferDst => vk::AccessFlags::TRANSFER_WRITE,
        // Shader reads (sampler, input attachment)
        TextureLayout::ShaderReadOnly => vk::AccessFlags::SHADER_READ,
        _ => return Err(RhiError::UnsupportedLayoutTransition { from, to }),
    };

    Ok((src, dst))
}

/// 2D texture with pool-allocated device memory.
///
/// Used for sampled textures and the depth attachment. The image's current
/// layout is tracked so transitions always pair the right access masks.
pub struct Texture2D {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan image handle.
    image: vk::Image,
    /// Image view over the whole image.
    view: vk::ImageView,
    /// Sampler, present for sampled textures only.
    sampler: Option<vk::Sampler>,
    /// Pool allocation backing the image.
    allocation: Option<Allocation>,
    /// Image width in texels.
    width: u32,
    /// Image height in texels.
    height: u32,
    /// Image format.
    format: vk::Format,
    /// Current tracked layout.
    layout: TextureLayout,
}

impl Texture2D {
    /// Creates a device-local image with a full-image view.
    ///
    /// The aspect is derived from `usage`: depth-stencil attachments get a
    /// depth aspect, everything else a color aspect.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `width` - Image width in texels
    /// * `height` - Image height in texels
    /// * `format` - Image format
    /// * `usage` - Image usage flags
    ///
    /// # Errors
    ///
    /// Returns an error if image, allocation, or view creation fails.
    pub fn new(
        device: Arc<Device>,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate_image(image, false)?
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view = create_view(&device, image, format, aspect_for_usage(usage))?;

        debug!("Created {}x{} texture ({:?})", width, height, format);

        Ok(Self {
            device,
            image,
            view,
            sampler: None,
            allocation: Some(allocation),
            width,
            height,
            format,
            layout: TextureLayout::Undefined,
        })
    }

    /// Uploads RGBA8 pixel data through a staging buffer.
    ///
    /// Transitions the image `Undefined -> TransferDst`, copies the
    /// staging buffer in, then transitions `TransferDst -> ShaderReadOnly`.
    /// Blocks on a fence until the copy lands, then frees the staging
    /// allocation.
    ///
    /// # Arguments
    ///
    /// * `pool` - Command pool for the one-shot copy
    /// * `pixels` - Tightly packed RGBA8 pixel data (`width * height * 4`
    ///   bytes)
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel size mismatches, a layout transition
    /// is unsupported, or the upload fails.
    pub fn upload(&mut self, pool: &CommandPool, pixels: &[u8]) -> RhiResult<()> {
        let expected = self.width as usize * self.height as usize * 4;
        if pixels.len() != expected {
            return Err(RhiError::InvalidHandle(format!(
                "Texture upload size mismatch: got {} bytes, expected {}",
                pixels.len(),
                expected
            )));
        }

        let staging = Buffer::new(
            self.device.clone(),
            BufferUsage::Staging,
            pixels.len() as vk::DeviceSize,
            true,
        )?;
        staging.write(0, pixels)?;

        let to_transfer = self.barrier_to(TextureLayout::TransferDst)?;
        let to_shader =
            barrier_for(self.image, TextureLayout::TransferDst, TextureLayout::ShaderReadOnly)?;

        let (image, width, height) = (self.image, self.width, self.height);
        submit_one_shot(&self.device, pool, |cmd| {
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                &[to_transfer],
            );
            cmd.copy_buffer_to_image(staging.handle(), image, width, height);
            cmd.pipeline_barrier(
                vk::PipelineStageFlags::ALL_COMMANDS,
                vk::PipelineStageFlags::ALL_COMMANDS,
                &[to_shader],
            );
            Ok(())
        })?;

        self.layout = TextureLayout::ShaderReadOnly;

        debug!("Uploaded {} bytes to texture", pixels.len());

        // Staging drops here, freeing the most recent host-visible
        // allocation.
        Ok(())
    }

    /// Creates (or replaces) the texture's sampler.
    ///
    /// Linear filtering, repeat addressing, single mip level.
    ///
    /// # Errors
    ///
    /// Returns an error if sampler creation fails.
    pub fn create_sampler(&mut self) -> RhiResult<()> {
        if let Some(sampler) = self.sampler.take() {
            unsafe {
                self.device.handle().destroy_sampler(sampler, None);
            }
        }

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .min_lod(0.0)
            .max_lod(1.0)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .compare_op(vk::CompareOp::NEVER);

        let sampler = unsafe { self.device.handle().create_sampler(&create_info, None)? };
        self.sampler = Some(sampler);

        Ok(())
    }

    /// Builds an image barrier transitioning from the tracked layout to
    /// `target`, updating the tracked layout.
    fn barrier_to(&mut self, target: TextureLayout) -> RhiResult<vk::ImageMemoryBarrier<'static>> {
        let barrier = barrier_for(self.image, self.layout, target)?;
        self.layout = target;
        Ok(barrier)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the sampler, if one has been created.
    #[inline]
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }

    /// Returns the image width in texels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the image height in texels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the current tracked layout.
    #[inline]
    pub fn layout(&self) -> TextureLayout {
        self.layout
    }
}

impl Drop for Texture2D {
    fn drop(&mut self) {
        unsafe {
            if let Some(sampler) = self.sampler.take() {
                self.device.handle().destroy_sampler(sampler, None);
            }
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                tracing::warn!("Leaked texture allocation: {}", e);
            }
        }

        debug!("Destroyed texture");
    }
}

/// Builds a full-subresource image barrier for a layout transition.
fn barrier_for(
    image: vk::Image,
    from: TextureLayout,
    to: TextureLayout,
) -> RhiResult<vk::ImageMemoryBarrier<'static>> {
    let (src_access, dst_access) = barrier_access_masks(from, to)?;

    Ok(vk::ImageMemoryBarrier::default()
        .old_layout(from.to_vk_layout())
        .new_layout(to.to_vk_layout())
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(src_access)
        .dst_access_mask(dst_access))
}

/// Derives the view aspect from the image usage.
fn aspect_for_usage(usage: vk::ImageUsageFlags) -> vk::ImageAspectFlags {
    if usage.contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Creates a 2D image view over the whole image.
fn create_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RhiResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::R,
            g: vk::ComponentSwizzle::G,
            b: vk::ComponentSwizzle::B,
            a: vk::ComponentSwizzle::A,
        })
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(aspect)
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        );

    let view = unsafe { device.handle().create_image_view(&create_info, None)? };
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_path_access_masks() {
        // Undefined -> TransferDst: no source dependency, transfer writes
        let (src, dst) =
            barrier_access_masks(TextureLayout::Undefined, TextureLayout::TransferDst).unwrap();
        assert_eq!(src, vk::AccessFlags::empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);

        // TransferDst -> ShaderReadOnly: writes finished, shader reads
        let (src, dst) =
            barrier_access_masks(TextureLayout::TransferDst, TextureLayout::ShaderReadOnly)
                .unwrap();
        assert_eq!(src, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
    }

    #[test]
    fn test_preinitialized_source_masks() {
        let (src, dst) =
            barrier_access_masks(TextureLayout::Preinitialized, TextureLayout::TransferDst)
                .unwrap();
        assert_eq!(src, vk::AccessFlags::HOST_WRITE);
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
    }

    #[test]
    fn test_unrecognized_transition_is_an_error() {
        // ShaderReadOnly is not a supported source layout
        let err =
            barrier_access_masks(TextureLayout::ShaderReadOnly, TextureLayout::TransferDst)
                .unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition { .. }
        ));

        // Undefined is not a supported target layout
        let err = barrier_access_masks(TextureLayout::TransferDst, TextureLayout::Undefined)
            .unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition { .. }
        ));
    }

    #[test]
    fn test_layout_to_vk() {
        assert_eq!(
            TextureLayout::Undefined.to_vk_layout(),
            vk::ImageLayout::UNDEFINED
        );
        assert_eq!(
            TextureLayout::TransferDst.to_vk_layout(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        );
        assert_eq!(
            TextureLayout::ShaderReadOnly.to_vk_layout(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn test_aspect_for_usage() {
        assert_eq!(
            aspect_for_usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_usage(
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST
            ),
            vk::ImageAspectFlags::COLOR
        );
    }
}
