//! Physical device (GPU) selection.
//!
//! Enumerates the available GPUs, keeps those with graphics and present
//! queue families, and picks the highest-scoring one (discrete GPUs first,
//! then capability and memory size).

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::RhiError;

/// Queue family indices the engine needs.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueueFamilyIndices {
    /// Family supporting graphics operations.
    pub graphics_family: Option<u32>,
    /// Family supporting presentation to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// True when both required families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// The distinct family indices, for logical device creation.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families: Vec<u32> = [self.graphics_family, self.present_family]
            .into_iter()
            .flatten()
            .collect();
        families.dedup();
        families
    }
}

/// Everything the engine needs to know about a selected GPU.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties; the limits size uniform strides.
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory heaps and types, consumed by the allocator.
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Queue family indices.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// The device name.
    pub fn device_name(&self) -> &str {
        unsafe {
            CStr::from_ptr(self.properties.device_name.as_ptr())
                .to_str()
                .unwrap_or("Unknown Device")
        }
    }

    /// A readable name for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Total DEVICE_LOCAL heap memory in bytes.
    pub fn device_local_memory(&self) -> u64 {
        self.memory_properties
            .memory_heaps
            .iter()
            .take(self.memory_properties.memory_heap_count as usize)
            .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
            .map(|heap| heap.size)
            .sum()
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Picks the most suitable GPU for rendering to `surface`.
///
/// A device qualifies when it exposes a graphics queue family and a
/// family able to present to the surface; among the qualified devices the
/// highest-scoring one wins.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableGpu`] when no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> Result<PhysicalDeviceInfo, RhiError> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    let best = devices
        .into_iter()
        .filter_map(|device| {
            let info = describe_device(instance, device, surface, surface_loader);

            if !info.queue_families.is_complete() {
                debug!(
                    "GPU '{}' skipped: missing graphics or present queue family",
                    info.device_name()
                );
                return None;
            }

            let score = score_device(&info);
            debug!(
                "GPU '{}' ({}): score {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            Some((info, score))
        })
        .max_by_key(|(_, score)| *score);

    match best {
        Some((info, score)) => {
            info!(
                "Selected GPU '{}' ({}), score {}",
                info.device_name(),
                info.device_type_name(),
                score
            );
            Ok(info)
        }
        None => {
            warn!("No GPU with the required queue families found");
            Err(RhiError::NoSuitableGpu)
        }
    }
}

/// Gathers a device's properties and queue family indices.
fn describe_device(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> PhysicalDeviceInfo {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let mut queue_families = QueueFamilyIndices::default();

    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count == 0 {
            continue;
        }

        if queue_families.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            queue_families.graphics_family = Some(index);
        }

        if queue_families.present_family.is_none() {
            let supports_present = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            };
            if supports_present {
                queue_families.present_family = Some(index);
            }
        }
    }

    PhysicalDeviceInfo {
        device,
        properties,
        memory_properties,
        queue_families,
    }
}

/// Scores a device; higher is better.
fn score_device(info: &PhysicalDeviceInfo) -> u32 {
    let type_score = match info.properties.device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 10000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1000,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 100,
        vk::PhysicalDeviceType::CPU => 10,
        _ => 1,
    };

    // Capability proxy plus VRAM in MB, capped so one huge heap does not
    // dominate the device type preference
    let vram_mb = (info.device_local_memory() / (1024 * 1024)) as u32;

    type_score + info.properties.limits.max_image_dimension2_d + vram_mb.min(16000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_complete() {
        assert!(!QueueFamilyIndices::default().is_complete());

        let graphics_only = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!graphics_only.is_complete());

        let both = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        assert!(both.is_complete());
    }

    #[test]
    fn test_unique_families_dedups_shared_family() {
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(shared.unique_families(), vec![0]);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(split.unique_families(), vec![0, 2]);
    }
}
