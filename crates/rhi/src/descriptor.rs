//! Descriptor set management for shader resource binding.
//!
//! The engine binds a closed set of resource kinds, modeled by
//! [`BindingType`]: uniform buffers (plain or dynamic-offset) and combined
//! image samplers. [`DescriptorSetLayout`] and [`DescriptorPool`] wrap the
//! corresponding Vulkan objects; [`write_buffer`]/[`write_image`] build
//! descriptor updates.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// The descriptor kinds the engine uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingType {
    /// A uniform buffer bound at a fixed offset.
    Uniform,
    /// A uniform buffer whose offset is supplied at bind time, letting one
    /// descriptor set address many logical sub-buffers.
    UniformDynamic,
    /// A sampled 2D texture with its sampler.
    CombinedImageSampler,
}

impl BindingType {
    /// Converts to the Vulkan descriptor type.
    pub fn to_vk(self) -> vk::DescriptorType {
        match self {
            BindingType::Uniform => vk::DescriptorType::UNIFORM_BUFFER,
            BindingType::UniformDynamic => vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            BindingType::CombinedImageSampler => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// Builds one descriptor set layout binding.
#[inline]
pub fn layout_binding(
    binding: u32,
    ty: BindingType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(ty.to_vk())
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Descriptor set layout wrapper.
///
/// Defines the binding points, descriptor types, and stages a pipeline's
/// descriptor sets carry.
pub struct DescriptorSetLayout {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from the given bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!("Created descriptor set layout ({} bindings)", bindings.len());

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool wrapper.
///
/// Sized up front for every set and descriptor the engine allocates; sets
/// live as long as the pool.
pub struct DescriptorPool {
    device: Arc<Device>,
    pool: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a pool able to hold `max_sets` sets drawn from `pool_sizes`.
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!("Created descriptor pool (max {} sets)", max_sets);

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set per layout handle.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails, e.g. when the pool is
    /// exhausted.
    pub fn allocate(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        Ok(sets)
    }

    /// Returns the Vulkan pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns the pool's set capacity.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Pushes the given descriptor writes to the device.
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }
}

/// Builds a buffer info for a descriptor write.
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Builds an image info for a descriptor write.
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_type_to_vk() {
        assert_eq!(
            BindingType::Uniform.to_vk(),
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(
            BindingType::UniformDynamic.to_vk(),
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert_eq!(
            BindingType::CombinedImageSampler.to_vk(),
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_layout_binding() {
        let binding = layout_binding(
            0,
            BindingType::UniformDynamic,
            vk::ShaderStageFlags::VERTEX,
        );
        assert_eq!(binding.binding, 0);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);

        let sampler = layout_binding(
            1,
            BindingType::CombinedImageSampler,
            vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(sampler.binding, 1);
        assert_eq!(
            sampler.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_buffer_info() {
        let info = buffer_info(vk::Buffer::null(), 256, 128);
        assert_eq!(info.offset, 256);
        assert_eq!(info.range, 128);
    }

    #[test]
    fn test_image_info() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
