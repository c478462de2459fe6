//! Graphics pipeline management.
//!
//! This module handles VkPipeline and VkPipelineLayout creation.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps VkPipelineLayout for descriptor set
//!   configuration
//! - [`Pipeline`] wraps VkPipeline
//! - [`GraphicsPipelineBuilder`] assembles the fixed-function state for a
//!   render-pass-compatible graphics pipeline
//!
//! The engine uses one fixed pipeline profile: triangle lists, fill mode,
//! depth test + write with LESS_OR_EQUAL, blending disabled, and dynamic
//! viewport/scissor.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use smalt_rhi::device::Device;
//! use smalt_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use smalt_rhi::render_pass::RenderPass;
//! use smalt_rhi::shader::{Shader, ShaderStage};
//! use smalt_rhi::vertex::Vertex;
//!
//! # fn example(device: Arc<Device>, render_pass: &RenderPass) -> Result<(), smalt_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("assets/shaders/mesh.vert.spv"),
//!     ShaderStage::Vertex,
//!     "main",
//! )?;
//! let fragment_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("assets/shaders/mesh.frag.spv"),
//!     ShaderStage::Fragment,
//!     "main",
//! )?;
//!
//! let layout = PipelineLayout::new(device.clone(), &[])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vertex_shader)
//!     .fragment_shader(&fragment_shader)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(Vertex::attribute_descriptions().to_vec())
//!     .build(device, &layout, render_pass)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::Shader;

/// Vulkan pipeline layout wrapper.
///
/// Describes the descriptor set layouts a pipeline reads during execution.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `descriptor_set_layouts` - Descriptor set layout handles
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
    ) -> RhiResult<Self> {
        let create_info =
            vk::PipelineLayoutCreateInfo::default().set_layouts(descriptor_set_layouts);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} set layout(s)",
            descriptor_set_layouts.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Destroyed pipeline layout");
    }
}

/// Vulkan graphics pipeline wrapper.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Destroyed pipeline");
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    /// Do not cull any faces.
    None,
    /// Cull front-facing triangles.
    Front,
    /// Cull back-facing triangles.
    #[default]
    Back,
}

impl CullMode {
    /// Converts to Vulkan cull mode flags.
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    /// Counter-clockwise winding is front-facing.
    CounterClockwise,
    /// Clockwise winding is front-facing.
    #[default]
    Clockwise,
}

impl FrontFace {
    /// Converts to Vulkan front face.
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Builder for graphics pipelines targeting the engine's render pass.
#[derive(Default)]
pub struct GraphicsPipelineBuilder<'a> {
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,
    vertex_binding: Option<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    cull_mode: CullMode,
    front_face: FrontFace,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a builder with the engine defaults: back-face culling,
    /// clockwise front faces.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the vertex shader.
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader.
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Sets the vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_binding = Some(binding);
        self
    }

    /// Sets the vertex attribute descriptions.
    pub fn vertex_attributes(
        mut self,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        self.vertex_attributes = attributes;
        self
    }

    /// Sets the face culling mode.
    pub fn cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    /// Sets the front face winding order.
    pub fn front_face(mut self, front_face: FrontFace) -> Self {
        self.front_face = front_face;
        self
    }

    /// Builds the graphics pipeline.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `layout` - The pipeline layout
    /// * `render_pass` - The render pass this pipeline renders within
    ///
    /// # Errors
    ///
    /// Returns an error if shaders are missing or pipeline creation fails.
    pub fn build(
        self,
        device: Arc<Device>,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::PipelineError("Missing vertex shader".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::PipelineError("Missing fragment shader".to_string()))?;

        let stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        // Vertex input state
        let bindings: Vec<vk::VertexInputBindingDescription> =
            self.vertex_binding.into_iter().collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        // Input assembly: triangle lists only
        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic state
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Rasterization state
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(self.cull_mode.to_vk())
            .front_face(self.front_face.to_vk())
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .depth_bias_enable(false)
            .line_width(1.0);

        // Depth test and write, no stencil
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        // Blending disabled
        let blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .attachments(std::slice::from_ref(&blend_attachment));

        // Single-sampled
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| RhiError::VulkanError(e))?
        };

        info!("Graphics pipeline created");

        Ok(Pipeline {
            device,
            pipeline: pipelines[0],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
        assert_eq!(CullMode::Back.to_vk(), vk::CullModeFlags::BACK);
    }

    #[test]
    fn test_front_face_to_vk() {
        assert_eq!(
            FrontFace::CounterClockwise.to_vk(),
            vk::FrontFace::COUNTER_CLOCKWISE
        );
        assert_eq!(FrontFace::Clockwise.to_vk(), vk::FrontFace::CLOCKWISE);
    }

    #[test]
    fn test_builder_defaults() {
        let builder = GraphicsPipelineBuilder::new();
        assert_eq!(builder.cull_mode, CullMode::Back);
        assert_eq!(builder.front_face, FrontFace::Clockwise);
    }
}
