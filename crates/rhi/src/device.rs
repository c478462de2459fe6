//! Vulkan logical device and queue management.
//!
//! [`Device`] owns the VkDevice, the graphics and present queues, and the
//! pool-based memory allocator. Every resource wrapper receives it as an
//! `Arc<Device>`; there is no ambient global device state.

use std::sync::{Arc, Mutex};

use ash::vk;
use tracing::{debug, info};

use crate::allocator::DeviceAllocator;
use crate::error::RhiError;
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// Shared across the engine via `Arc`. The allocator sits behind a
/// `Mutex`; queue submission itself happens on the single host submission
/// thread.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    /// Device properties; the limits size uniform strides.
    properties: vk::PhysicalDeviceProperties,
    allocator: Mutex<DeviceAllocator>,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device with the swapchain extension, retrieves
    /// the graphics and present queues, and initializes the memory
    /// allocator.
    ///
    /// # Errors
    ///
    /// Returns an error if device creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> Result<Arc<Self>, RhiError> {
        let queue_families = physical_device_info.queue_families;

        let unique_families = queue_families.unique_families();
        let priorities = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
            })
            .collect();

        debug!("Creating queues for families {:?}", unique_families);

        let extension_names: Vec<*const i8> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        let graphics_queue =
            unsafe { device.get_device_queue(queue_families.graphics_family.unwrap(), 0) };
        let present_queue =
            unsafe { device.get_device_queue(queue_families.present_family.unwrap(), 0) };

        let allocator = DeviceAllocator::new(
            instance.handle(),
            physical_device_info.device,
            device.clone(),
        );

        info!("Logical device created, memory allocator initialized");

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            properties: physical_device_info.properties,
            allocator: Mutex::new(allocator),
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the memory allocator.
    #[inline]
    pub fn allocator(&self) -> &Mutex<DeviceAllocator> {
        &self.allocator
    }

    /// Minimum alignment for dynamic uniform-buffer offsets.
    #[inline]
    pub fn min_uniform_buffer_offset_alignment(&self) -> vk::DeviceSize {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    /// Blocks until all queues are idle.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait fails.
    pub fn wait_idle(&self) -> Result<(), RhiError> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure the command buffers are recorded, the
    /// submission is synchronized, and the fence is not already in use.
    ///
    /// # Errors
    ///
    /// Returns an error if the submission fails.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> Result<(), RhiError> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // Pool memory must go before the device handle does
            if let Ok(mut allocator) = self.allocator.lock() {
                allocator.destroy_pools();
            }

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: ash::Device is Send+Sync, the queue and physical device handles
// are Copy, and the allocator is behind a Mutex.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
