//! Vertex data structures and input descriptions.
//!
//! This module defines the vertex format used by the engine's meshes.
//!
//! # Memory Layout
//!
//! [`Vertex`] uses `#[repr(C)]` for a predictable layout:
//! - Offset 0: position (12 bytes)
//! - Offset 12: normal (12 bytes)
//! - Offset 24: tex_coord (8 bytes)
//! - Total size: 32 bytes
//!
//! # Shader Locations
//!
//! - location 0: position (vec3)
//! - location 1: normal (vec3)
//! - location 2: tex_coord (vec2)

use ash::vk;
use bytemuck::{Pod, Zeroable};

/// Standard vertex format with position, normal, and UV.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    /// 3D position in object space.
    pub position: [f32; 3],
    /// Surface normal vector (should be normalized).
    pub normal: [f32; 3],
    /// Texture coordinates (UV).
    pub tex_coord: [f32; 2],
}

impl Vertex {
    /// Creates a new vertex with the specified attributes.
    #[inline]
    pub const fn new(position: [f32; 3], normal: [f32; 3], tex_coord: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Get the vertex input binding description for binding 0 with
    /// per-vertex input rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            // Position at location 0
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            // Normal at location 1
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            // TexCoord at location 2
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        // Vertex: [f32;3] (12) + [f32;3] (12) + [f32;2] (8) = 32 bytes
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::size(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 3);

        // Position attribute (location 0)
        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        // Normal attribute (location 1)
        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[1].offset, 12);

        // TexCoord attribute (location 2)
        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].offset, 24);
    }

    #[test]
    fn test_vertex_offsets() {
        // Field offsets must match the attribute descriptions
        use std::mem::offset_of;

        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, normal), 12);
        assert_eq!(offset_of!(Vertex, tex_coord), 24);
    }

    #[test]
    fn test_vertex_pod_zeroable() {
        let vertex = Vertex::new([1.0, 2.0, 3.0], [0.0, 1.0, 0.0], [0.5, 0.5]);

        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);

        let vertex_back: &Vertex = bytemuck::from_bytes(bytes);
        assert_eq!(vertex_back.position, vertex.position);
        assert_eq!(vertex_back.normal, vertex.normal);
        assert_eq!(vertex_back.tex_coord, vertex.tex_coord);
    }
}
