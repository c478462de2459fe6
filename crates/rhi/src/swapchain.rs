//! Swapchain management.
//!
//! Owns the VkSwapchainKHR, its images, and their views, and exposes the
//! two calls the frame loop needs: acquire and present.
//!
//! The engine renders at a fixed resolution, so there is no recreation
//! path: an out-of-date swapchain during acquire or present surfaces as an
//! error to the caller.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::RhiError;
use crate::instance::Instance;

/// What a surface supports for swapchain creation, along with the
/// selection logic that picks the engine's settings from it.
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    /// Surface capabilities (image counts, extents, transforms).
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space combinations.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    /// Queries surface support for a physical device.
    ///
    /// # Errors
    ///
    /// Returns an error if any surface query fails.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self, RhiError> {
        let support = unsafe {
            Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            }
        };

        debug!(
            "Surface support: {} formats, {} present modes",
            support.formats.len(),
            support.present_modes.len()
        );

        Ok(support)
    }

    /// True when at least one format and one present mode exist.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// Picks the surface format: B8G8R8A8 sRGB when available, the first
    /// reported format otherwise.
    pub fn pick_format(&self) -> vk::SurfaceFormatKHR {
        self.formats
            .iter()
            .copied()
            .find(|f| {
                f.format == vk::Format::B8G8R8A8_SRGB
                    && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
            })
            .unwrap_or_else(|| {
                warn!(
                    "Preferred surface format unavailable, using {:?}",
                    self.formats[0].format
                );
                self.formats[0]
            })
    }

    /// Picks the present mode: MAILBOX when available, otherwise FIFO
    /// (which the spec guarantees).
    pub fn pick_present_mode(&self) -> vk::PresentModeKHR {
        if self.present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
            vk::PresentModeKHR::MAILBOX
        } else {
            vk::PresentModeKHR::FIFO
        }
    }

    /// Picks the swapchain extent, clamping the requested size to the
    /// surface limits when the surface leaves the extent open.
    pub fn pick_extent(&self, width: u32, height: u32) -> vk::Extent2D {
        let caps = &self.capabilities;

        if caps.current_extent.width != u32::MAX {
            return caps.current_extent;
        }

        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }

    /// Picks the image count: one above the minimum for triple buffering,
    /// capped by the surface maximum when one exists.
    pub fn pick_image_count(&self) -> u32 {
        let caps = &self.capabilities;
        let wanted = caps.min_image_count + 1;

        if caps.max_image_count > 0 {
            wanted.min(caps.max_image_count)
        } else {
            wanted
        }
    }
}

/// Vulkan swapchain wrapper.
///
/// Not thread-safe; acquisition and presentation happen on the single
/// host submission thread.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a swapchain for the given surface.
    ///
    /// Settings come from [`SurfaceSupport`]: sRGB color when available,
    /// MAILBOX falling back to FIFO, triple buffering where the surface
    /// allows it. Images are created with COLOR_ATTACHMENT usage and a
    /// full-image view each.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface reports no usable formats or
    /// present modes, or if swapchain or view creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> Result<Self, RhiError> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support = SurfaceSupport::query(device.physical_device(), surface, &surface_loader)?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let surface_format = support.pick_format();
        let present_mode = support.pick_present_mode();
        let extent = support.pick_extent(width, height);
        let image_count = support.pick_image_count();

        // Graphics and present queues may live in different families; the
        // images must then be shared between them.
        let families = device.queue_families();
        let graphics = families.graphics_family.unwrap();
        let present = families.present_family.unwrap();
        let family_indices = [graphics, present];

        let (sharing_mode, shared_indices): (_, &[u32]) = if graphics == present {
            (vk::SharingMode::EXCLUSIVE, &[])
        } else {
            (vk::SharingMode::CONCURRENT, &family_indices)
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

        info!(
            "Swapchain created: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            images.len()
        );

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(surface_format.format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );

            let view = unsafe { device.handle().create_image_view(&view_info, None)? };
            image_views.push(view);
        }

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Acquires the next swapchain image, signaling `semaphore` when the
    /// image is ready.
    ///
    /// Returns `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// Propagates acquisition failures, including
    /// `vk::Result::ERROR_OUT_OF_DATE_KHR`; the engine does not recover
    /// from them.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Presents `image_index` on `queue` after `wait_semaphore` signals.
    ///
    /// Returns true when the swapchain reports itself suboptimal.
    ///
    /// # Errors
    ///
    /// Propagates presentation failures; out-of-date swapchains are not
    /// recovered.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let wait = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    /// Returns the swapchain handle.
    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Returns the swapchain image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the swapchain width.
    #[inline]
    pub fn width(&self) -> u32 {
        self.extent.width
    }

    /// Returns the swapchain height.
    #[inline]
    pub fn height(&self) -> u32 {
        self.extent.height
    }

    /// Returns the present mode in use.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of swapchain images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image(&self, index: usize) -> vk::Image {
        self.images[index]
    }

    /// Returns the image view at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[inline]
    pub fn image_view(&self, index: usize) -> vk::ImageView {
        self.image_views[index]
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.handle().destroy_image_view(view, None);
            }
            // Images belong to the swapchain and go with it
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        info!("Swapchain destroyed ({} images)", self.images.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn support_with(
        formats: Vec<vk::SurfaceFormatKHR>,
        present_modes: Vec<vk::PresentModeKHR>,
    ) -> SurfaceSupport {
        SurfaceSupport {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats,
            present_modes,
        }
    }

    #[test]
    fn test_pick_format_prefers_bgra_srgb() {
        let support = support_with(
            vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::R8G8B8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            vec![vk::PresentModeKHR::FIFO],
        );

        assert_eq!(support.pick_format().format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_pick_format_falls_back_to_first() {
        let support = support_with(
            vec![vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            vec![vk::PresentModeKHR::FIFO],
        );

        assert_eq!(support.pick_format().format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_pick_present_mode() {
        let mailbox = support_with(
            vec![],
            vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        );
        assert_eq!(mailbox.pick_present_mode(), vk::PresentModeKHR::MAILBOX);

        let fifo_only = support_with(vec![], vec![vk::PresentModeKHR::FIFO]);
        assert_eq!(fifo_only.pick_present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_pick_extent_uses_surface_extent_when_fixed() {
        let mut support = support_with(vec![], vec![]);
        support.capabilities.current_extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };

        let extent = support.pick_extent(640, 480);
        assert_eq!(extent.width, 1280);
        assert_eq!(extent.height, 720);
    }

    #[test]
    fn test_pick_extent_clamps_when_open() {
        let mut support = support_with(vec![], vec![]);
        support.capabilities.current_extent = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        support.capabilities.min_image_extent = vk::Extent2D {
            width: 200,
            height: 200,
        };
        support.capabilities.max_image_extent = vk::Extent2D {
            width: 1000,
            height: 1000,
        };

        assert_eq!(support.pick_extent(50, 50).width, 200);
        assert_eq!(support.pick_extent(5000, 5000).height, 1000);
        assert_eq!(support.pick_extent(640, 480).width, 640);
    }

    #[test]
    fn test_pick_image_count_respects_maximum() {
        let mut support = support_with(vec![], vec![]);
        support.capabilities.min_image_count = 2;

        support.capabilities.max_image_count = 0; // unbounded
        assert_eq!(support.pick_image_count(), 3);

        support.capabilities.max_image_count = 2;
        assert_eq!(support.pick_image_count(), 2);
    }

    #[test]
    fn test_is_adequate() {
        let good = support_with(
            vec![vk::SurfaceFormatKHR::default()],
            vec![vk::PresentModeKHR::FIFO],
        );
        assert!(good.is_adequate());

        let no_formats = support_with(vec![], vec![vk::PresentModeKHR::FIFO]);
        assert!(!no_formats.is_adequate());
    }
}
