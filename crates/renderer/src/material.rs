//! GPU material assembly.
//!
//! Turns a parsed material description into live GPU state: shader
//! modules, a descriptor set layout matching the binding list, a pipeline
//! layout, a graphics pipeline with the described vertex layout, the
//! material's texture, and an allocated, fully-written descriptor set.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use smalt_resources::{AttributeType, BindingKind, ImageData, MaterialDesc, ShaderStageDesc};
use smalt_rhi::buffer::UniformRing;
use smalt_rhi::command::CommandPool;
use smalt_rhi::descriptor::{
    BindingType, DescriptorPool, DescriptorSetLayout, buffer_info, image_info, layout_binding,
    update_descriptor_sets,
};
use smalt_rhi::device::Device;
use smalt_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use smalt_rhi::render_pass::RenderPass;
use smalt_rhi::shader::{Shader, ShaderStage};
use smalt_rhi::texture::Texture2D;
use smalt_rhi::{RhiError, RhiResult};

/// Maps a description stage token onto the RHI shader stage.
fn to_shader_stage(stage: ShaderStageDesc) -> ShaderStage {
    match stage {
        ShaderStageDesc::Vertex => ShaderStage::Vertex,
        ShaderStageDesc::Fragment => ShaderStage::Fragment,
    }
}

/// Maps a description stage token onto Vulkan stage flags.
fn to_stage_flags(stage: ShaderStageDesc) -> vk::ShaderStageFlags {
    match stage {
        ShaderStageDesc::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderStageDesc::Fragment => vk::ShaderStageFlags::FRAGMENT,
    }
}

/// Maps a description binding entry onto the RHI descriptor kind.
fn binding_type(kind: BindingKind, dynamic: bool) -> BindingType {
    match (kind, dynamic) {
        (BindingKind::UniformBuffer, true) => BindingType::UniformDynamic,
        (BindingKind::UniformBuffer, false) => BindingType::Uniform,
        (BindingKind::Texture2d, _) => BindingType::CombinedImageSampler,
    }
}

/// Builds the vertex input binding and attribute descriptions from an
/// ordered token layout.
///
/// Offsets accumulate in declaration order; `mat44` expands into four
/// vec4 columns occupying consecutive locations.
pub fn vertex_input_from_layout(
    layout: &[AttributeType],
) -> (
    vk::VertexInputBindingDescription,
    Vec<vk::VertexInputAttributeDescription>,
) {
    let mut attributes = Vec::new();
    let mut offset = 0u32;
    let mut location = 0u32;

    for &token in layout {
        match token {
            AttributeType::Mat44 => {
                // Four vec4 columns, one location each
                for column in 0..4 {
                    attributes.push(vk::VertexInputAttributeDescription {
                        binding: 0,
                        location: location + column,
                        format: vk::Format::R32G32B32A32_SFLOAT,
                        offset: offset + column * 16,
                    });
                }
            }
            _ => {
                let format = match token {
                    AttributeType::Float2 => vk::Format::R32G32_SFLOAT,
                    AttributeType::Float3 => vk::Format::R32G32B32_SFLOAT,
                    AttributeType::Float4 => vk::Format::R32G32B32A32_SFLOAT,
                    AttributeType::Mat44 => unreachable!(),
                };
                attributes.push(vk::VertexInputAttributeDescription {
                    binding: 0,
                    location,
                    format,
                    offset,
                });
            }
        }

        offset += token.size_bytes();
        location += token.location_count();
    }

    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: offset,
        input_rate: vk::VertexInputRate::VERTEX,
    };

    (binding, attributes)
}

/// Live GPU state for one material.
pub struct Material {
    // The texture holds the material's only pool allocation; it is
    // declared first so it drops before older allocations in the pool.
    texture: Option<Texture2D>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    #[allow(dead_code)]
    descriptor_set_layout: DescriptorSetLayout,
    descriptor_set: vk::DescriptorSet,
    name: String,
}

impl Material {
    /// Builds a material from its description.
    ///
    /// Loads the shaders and texture named by the description, creates
    /// the descriptor and pipeline layouts, builds the pipeline against
    /// `render_pass`, and writes the descriptor set to point at the
    /// uniform ring and the texture.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `upload_pool` - Command pool for texture staging uploads
    /// * `descriptor_pool` - Pool the material's descriptor set comes from
    /// * `render_pass` - Render pass the pipeline renders within
    /// * `desc` - The parsed material description
    /// * `ring` - Uniform ring backing the material's uniform binding
    ///
    /// # Errors
    ///
    /// Returns an error if a shader or texture fails to load or any
    /// Vulkan object creation fails.
    pub fn from_desc(
        device: Arc<Device>,
        upload_pool: &CommandPool,
        descriptor_pool: &DescriptorPool,
        render_pass: &RenderPass,
        desc: &MaterialDesc,
        ring: &UniformRing,
    ) -> RhiResult<Self> {
        // Load shader modules
        let mut vertex_shader = None;
        let mut fragment_shader = None;
        for shader_desc in &desc.shaders {
            let shader = Shader::from_spirv_file(
                device.clone(),
                &shader_desc.path,
                to_shader_stage(shader_desc.stage),
                "main",
            )?;
            match shader_desc.stage {
                ShaderStageDesc::Vertex => vertex_shader = Some(shader),
                ShaderStageDesc::Fragment => fragment_shader = Some(shader),
            }
        }
        let vertex_shader = vertex_shader.ok_or_else(|| {
            RhiError::PipelineError(format!("Material '{}' has no vertex shader", desc.name))
        })?;
        let fragment_shader = fragment_shader.ok_or_else(|| {
            RhiError::PipelineError(format!("Material '{}' has no fragment shader", desc.name))
        })?;

        // Descriptor set layout from the binding list
        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|b| {
                layout_binding(
                    b.binding,
                    binding_type(b.kind, b.dynamic),
                    to_stage_flags(b.shader_stage),
                )
            })
            .collect();
        let descriptor_set_layout = DescriptorSetLayout::new(device.clone(), &layout_bindings)?;

        // Pipeline layout and pipeline
        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()])?;

        let (vertex_binding, vertex_attributes) = vertex_input_from_layout(&desc.vertex_layout);

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(vertex_binding)
            .vertex_attributes(vertex_attributes)
            .build(device.clone(), &pipeline_layout, render_pass)?;

        // Load and upload the material's texture, if it names one
        let texture_binding = desc
            .bindings
            .iter()
            .find(|b| b.kind == BindingKind::Texture2d && b.source.is_some());

        let texture = match texture_binding {
            Some(binding) => {
                let path = binding.source.as_ref().unwrap();
                let image = ImageData::load(path)
                    .map_err(|e| RhiError::InvalidHandle(e.to_string()))?;

                let mut texture = Texture2D::new(
                    device.clone(),
                    image.width(),
                    image.height(),
                    vk::Format::R8G8B8A8_UNORM,
                    vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
                )?;
                texture.upload(upload_pool, &image.pixels)?;
                texture.create_sampler()?;

                debug!(
                    "Material '{}' texture: {}x{}",
                    desc.name,
                    texture.width(),
                    texture.height()
                );

                Some(texture)
            }
            None => None,
        };

        // Allocate and write the descriptor set
        let descriptor_set = descriptor_pool.allocate(&[descriptor_set_layout.handle()])?[0];

        let ring_info = [buffer_info(ring.handle(), 0, ring.stride())];

        let texture_info = match &texture {
            Some(texture) => {
                let sampler = texture.sampler().ok_or_else(|| {
                    RhiError::InvalidHandle("Texture has no sampler".to_string())
                })?;
                Some([image_info(
                    sampler,
                    texture.view(),
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )])
            }
            None => None,
        };

        let mut writes = Vec::new();
        for binding in &desc.bindings {
            let write = vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(binding.binding)
                .dst_array_element(0)
                .descriptor_type(binding_type(binding.kind, binding.dynamic).to_vk());

            match binding.kind {
                BindingKind::UniformBuffer => {
                    writes.push(write.buffer_info(&ring_info));
                }
                BindingKind::Texture2d => {
                    let info = texture_info.as_ref().ok_or_else(|| {
                        RhiError::InvalidHandle(format!(
                            "Material '{}' texture binding has no source",
                            desc.name
                        ))
                    })?;
                    writes.push(write.image_info(info));
                }
            }
        }

        update_descriptor_sets(&device, &writes);

        info!(
            "Material '{}' created ({} bindings)",
            desc.name,
            desc.bindings.len()
        );

        // Shader modules may be destroyed once the pipeline exists; they
        // drop here.
        Ok(Self {
            texture,
            pipeline,
            pipeline_layout,
            descriptor_set_layout,
            descriptor_set,
            name: desc.name.clone(),
        })
    }

    /// Returns the graphics pipeline handle.
    #[inline]
    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    /// Returns the pipeline layout handle.
    #[inline]
    pub fn pipeline_layout(&self) -> vk::PipelineLayout {
        self.pipeline_layout.handle()
    }

    /// Returns the material's descriptor set.
    #[inline]
    pub fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Returns the material's texture, if any.
    #[inline]
    pub fn texture(&self) -> Option<&Texture2D> {
        self.texture.as_ref()
    }

    /// Returns the material name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_input_cube_layout() {
        // float3 + float3 + float2: three attributes, 32-byte stride
        let layout = [
            AttributeType::Float3,
            AttributeType::Float3,
            AttributeType::Float2,
        ];
        let (binding, attributes) = vertex_input_from_layout(&layout);

        assert_eq!(binding.stride, 32);
        assert_eq!(attributes.len(), 3);

        assert_eq!(attributes[0].location, 0);
        assert_eq!(attributes[0].offset, 0);
        assert_eq!(attributes[0].format, vk::Format::R32G32B32_SFLOAT);

        assert_eq!(attributes[1].location, 1);
        assert_eq!(attributes[1].offset, 12);

        assert_eq!(attributes[2].location, 2);
        assert_eq!(attributes[2].offset, 24);
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_vertex_input_mat44_spans_four_locations() {
        let layout = [AttributeType::Float4, AttributeType::Mat44];
        let (binding, attributes) = vertex_input_from_layout(&layout);

        // float4 (16) + mat44 (64) = 80 bytes
        assert_eq!(binding.stride, 80);
        // float4 is one attribute, mat44 expands to four columns
        assert_eq!(attributes.len(), 5);

        assert_eq!(attributes[0].location, 0);

        for (i, attribute) in attributes[1..].iter().enumerate() {
            assert_eq!(attribute.location, 1 + i as u32);
            assert_eq!(attribute.format, vk::Format::R32G32B32A32_SFLOAT);
            assert_eq!(attribute.offset, 16 + i as u32 * 16);
        }
    }

    #[test]
    fn test_empty_layout() {
        let (binding, attributes) = vertex_input_from_layout(&[]);
        assert_eq!(binding.stride, 0);
        assert!(attributes.is_empty());
    }
}
