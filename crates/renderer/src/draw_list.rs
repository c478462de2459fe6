//! Typed draw command sequences.
//!
//! The scene is static: its draw commands are decided once at startup,
//! recorded into a [`DrawList`] per swapchain image, and replayed into
//! that image's command buffer. Per-frame variation comes exclusively
//! through dynamic uniform offsets baked into each image's list, so no
//! command buffer is ever re-recorded in the steady state.
//!
//! Keeping the steps as data also makes the recorded stream inspectable:
//! tests assert on the list instead of needing a device.

use ash::vk;

use smalt_rhi::command::CommandBuffer;

/// One recorded command.
///
/// Steps map 1:1 onto [`CommandBuffer`] recording calls.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawStep {
    /// Bind a graphics pipeline.
    BindPipeline {
        /// Pipeline handle.
        pipeline: vk::Pipeline,
    },
    /// Set the viewport over the full render area.
    SetViewport {
        /// Viewport width in pixels.
        width: u32,
        /// Viewport height in pixels.
        height: u32,
    },
    /// Set the scissor over the full render area.
    SetScissor {
        /// Scissor width in pixels.
        width: u32,
        /// Scissor height in pixels.
        height: u32,
    },
    /// Bind a vertex buffer to binding 0.
    BindVertexBuffer {
        /// Buffer handle.
        buffer: vk::Buffer,
        /// Byte offset into the buffer.
        offset: vk::DeviceSize,
    },
    /// Bind a 32-bit index buffer.
    BindIndexBuffer {
        /// Buffer handle.
        buffer: vk::Buffer,
        /// Byte offset into the buffer.
        offset: vk::DeviceSize,
    },
    /// Bind a descriptor set with dynamic offsets.
    BindDescriptorSet {
        /// Pipeline layout.
        layout: vk::PipelineLayout,
        /// The descriptor set.
        set: vk::DescriptorSet,
        /// One offset per dynamic descriptor in the set.
        dynamic_offsets: Vec<u32>,
    },
    /// Issue an indexed draw of a single instance.
    DrawIndexed {
        /// Number of indices to draw.
        index_count: u32,
        /// Offset to the first index.
        first_index: u32,
    },
}

/// An ordered sequence of draw steps for one swapchain image.
#[derive(Clone, Debug, Default)]
pub struct DrawList {
    steps: Vec<DrawStep>,
}

impl DrawList {
    /// Creates an empty draw list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step.
    pub fn push(&mut self, step: DrawStep) {
        self.steps.push(step);
    }

    /// The recorded steps, in order.
    #[inline]
    pub fn steps(&self) -> &[DrawStep] {
        &self.steps
    }

    /// Number of indexed draw calls in the list.
    pub fn draw_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s, DrawStep::DrawIndexed { .. }))
            .count()
    }

    /// Replays every step onto a command recorder, in order.
    ///
    /// The caller brackets this with begin/end and render pass scoping.
    pub fn replay(&self, cmd: &CommandBuffer) {
        for step in &self.steps {
            match step {
                DrawStep::BindPipeline { pipeline } => cmd.bind_pipeline(*pipeline),
                DrawStep::SetViewport { width, height } => {
                    let viewport = vk::Viewport {
                        x: 0.0,
                        y: 0.0,
                        width: *width as f32,
                        height: *height as f32,
                        min_depth: 0.0,
                        max_depth: 1.0,
                    };
                    cmd.set_viewport(&viewport);
                }
                DrawStep::SetScissor { width, height } => {
                    let scissor = vk::Rect2D {
                        offset: vk::Offset2D { x: 0, y: 0 },
                        extent: vk::Extent2D {
                            width: *width,
                            height: *height,
                        },
                    };
                    cmd.set_scissor(&scissor);
                }
                DrawStep::BindVertexBuffer { buffer, offset } => {
                    cmd.bind_vertex_buffer(0, *buffer, *offset)
                }
                DrawStep::BindIndexBuffer { buffer, offset } => {
                    cmd.bind_index_buffer(*buffer, *offset)
                }
                DrawStep::BindDescriptorSet {
                    layout,
                    set,
                    dynamic_offsets,
                } => cmd.bind_descriptor_set(*layout, 0, *set, dynamic_offsets),
                DrawStep::DrawIndexed {
                    index_count,
                    first_index,
                } => cmd.draw_indexed(*index_count, *first_index),
            }
        }
    }
}

/// Builds the draw list for one swapchain image of the fixed scene:
/// viewport setup, one pipeline and mesh, and one indexed draw per object
/// addressed via its dynamic uniform offset.
#[allow(clippy::too_many_arguments)]
pub fn build_scene_draw_list(
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    descriptor_set: vk::DescriptorSet,
    extent: vk::Extent2D,
    vertex_buffer: vk::Buffer,
    index_buffer: vk::Buffer,
    index_count: u32,
    object_dynamic_offsets: &[u32],
) -> DrawList {
    let mut list = DrawList::new();

    list.push(DrawStep::SetViewport {
        width: extent.width,
        height: extent.height,
    });
    list.push(DrawStep::SetScissor {
        width: extent.width,
        height: extent.height,
    });
    list.push(DrawStep::BindPipeline { pipeline });
    list.push(DrawStep::BindVertexBuffer {
        buffer: vertex_buffer,
        offset: 0,
    });
    list.push(DrawStep::BindIndexBuffer {
        buffer: index_buffer,
        offset: 0,
    });

    for &offset in object_dynamic_offsets {
        list.push(DrawStep::BindDescriptorSet {
            layout: pipeline_layout,
            set: descriptor_set,
            dynamic_offsets: vec![offset],
        });
        list.push(DrawStep::DrawIndexed {
            index_count,
            first_index: 0,
        });
    }

    list
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_mesh_single_draw() {
        // A 24-vertex cube with 36 indices and one object: both buffers
        // bound at offset 0, exactly one indexed draw of all 36 indices.
        let list = build_scene_draw_list(
            vk::Pipeline::null(),
            vk::PipelineLayout::null(),
            vk::DescriptorSet::null(),
            vk::Extent2D {
                width: 1280,
                height: 720,
            },
            vk::Buffer::null(),
            vk::Buffer::null(),
            36,
            &[0],
        );

        assert!(list.steps().contains(&DrawStep::BindVertexBuffer {
            buffer: vk::Buffer::null(),
            offset: 0,
        }));
        assert!(list.steps().contains(&DrawStep::BindIndexBuffer {
            buffer: vk::Buffer::null(),
            offset: 0,
        }));

        assert_eq!(list.draw_count(), 1);
        assert!(list.steps().contains(&DrawStep::DrawIndexed {
            index_count: 36,
            first_index: 0,
        }));
    }

    #[test]
    fn test_one_draw_per_object() {
        let offsets = [0u32, 256, 512];
        let list = build_scene_draw_list(
            vk::Pipeline::null(),
            vk::PipelineLayout::null(),
            vk::DescriptorSet::null(),
            vk::Extent2D {
                width: 1280,
                height: 720,
            },
            vk::Buffer::null(),
            vk::Buffer::null(),
            36,
            &offsets,
        );

        assert_eq!(list.draw_count(), offsets.len());

        // Each draw is preceded by a descriptor bind carrying that
        // object's dynamic offset
        let binds: Vec<&DrawStep> = list
            .steps()
            .iter()
            .filter(|s| matches!(s, DrawStep::BindDescriptorSet { .. }))
            .collect();
        assert_eq!(binds.len(), offsets.len());

        for (bind, expected) in binds.iter().zip(offsets.iter()) {
            if let DrawStep::BindDescriptorSet {
                dynamic_offsets, ..
            } = bind
            {
                assert_eq!(dynamic_offsets.as_slice(), &[*expected]);
            }
        }
    }

    #[test]
    fn test_binds_precede_draws() {
        let list = build_scene_draw_list(
            vk::Pipeline::null(),
            vk::PipelineLayout::null(),
            vk::DescriptorSet::null(),
            vk::Extent2D {
                width: 640,
                height: 480,
            },
            vk::Buffer::null(),
            vk::Buffer::null(),
            36,
            &[0],
        );

        let first_draw = list
            .steps()
            .iter()
            .position(|s| matches!(s, DrawStep::DrawIndexed { .. }))
            .unwrap();
        let vertex_bind = list
            .steps()
            .iter()
            .position(|s| matches!(s, DrawStep::BindVertexBuffer { .. }))
            .unwrap();
        let index_bind = list
            .steps()
            .iter()
            .position(|s| matches!(s, DrawStep::BindIndexBuffer { .. }))
            .unwrap();
        let pipeline_bind = list
            .steps()
            .iter()
            .position(|s| matches!(s, DrawStep::BindPipeline { .. }))
            .unwrap();

        assert!(pipeline_bind < first_draw);
        assert!(vertex_bind < first_draw);
        assert!(index_bind < first_draw);
    }
}
