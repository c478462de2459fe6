//! Synchronization primitives.
//!
//! - [`Semaphore`]: GPU-to-GPU ordering between queue operations. The
//!   engine uses two, device-wide: image-acquired and render-complete.
//! - [`Fence`]: GPU-to-CPU completion signaling. The frame loop waits on
//!   a swapchain image's fence before touching anything that image's
//!   previous submission may still read; staging uploads wait on their
//!   own fence.
//!
//! All waits use an effectively infinite timeout; a hung GPU manifests as
//! a permanent hang rather than a reported error.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Immutable after creation; safe to share between threads.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence.
    ///
    /// Pass `signaled = true` for fences that are waited on before the
    /// first submission that would signal them, like the per-image frame
    /// fences.
    ///
    /// # Errors
    ///
    /// Returns an error if creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created {} fence",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence signals or `timeout` nanoseconds pass.
    ///
    /// Use `u64::MAX` for an unbounded wait.
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or wait failure.
    pub fn wait(&self, timeout: u64) -> Result<(), RhiError> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?;
        }
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> Result<(), RhiError> {
        unsafe {
            self.device.handle().reset_fences(&[self.fence])?;
        }
        Ok(())
    }

    /// Non-blocking signal check.
    pub fn is_signaled(&self) -> bool {
        matches!(
            unsafe { self.device.handle().get_fence_status(self.fence) },
            Ok(true)
        )
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
