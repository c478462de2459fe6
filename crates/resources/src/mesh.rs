//! Mesh data generation.
//!
//! The engine's fixed scene draws textured cubes; this module holds the
//! CPU-side mesh data the GPU buffers are built from.

/// CPU-side mesh data: positions, normals, UVs, and 32-bit indices.
#[derive(Debug, Default, Clone)]
pub struct MeshData {
    /// Vertex positions in object space.
    pub positions: Vec<[f32; 3]>,
    /// Per-vertex normals.
    pub normals: Vec<[f32; 3]>,
    /// Per-vertex texture coordinates.
    pub tex_coords: Vec<[f32; 2]>,
    /// Triangle-list indices.
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Builds an axis-aligned cube centered at the origin.
    ///
    /// 24 vertices (4 per face, so each face gets flat normals and its own
    /// UVs) and 36 indices.
    ///
    /// # Arguments
    ///
    /// * `half_extent` - Half the cube's edge length
    pub fn cube(half_extent: f32) -> Self {
        let h = half_extent;

        // One entry per face: (normal, four corner positions)
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            // Front (-Z)
            (
                [0.0, 0.0, -1.0],
                [[-h, h, -h], [h, h, -h], [h, -h, -h], [-h, -h, -h]],
            ),
            // Back (+Z)
            (
                [0.0, 0.0, 1.0],
                [[h, h, h], [-h, h, h], [-h, -h, h], [h, -h, h]],
            ),
            // Top (+Y)
            (
                [0.0, 1.0, 0.0],
                [[-h, h, h], [h, h, h], [h, h, -h], [-h, h, -h]],
            ),
            // Bottom (-Y)
            (
                [0.0, -1.0, 0.0],
                [[-h, -h, -h], [h, -h, -h], [h, -h, h], [-h, -h, h]],
            ),
            // Left (-X)
            (
                [-1.0, 0.0, 0.0],
                [[-h, h, h], [-h, h, -h], [-h, -h, -h], [-h, -h, h]],
            ),
            // Right (+X)
            (
                [1.0, 0.0, 0.0],
                [[h, h, -h], [h, h, h], [h, -h, h], [h, -h, -h]],
            ),
        ];

        let face_uvs: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]];

        let mut mesh = MeshData::default();

        for (normal, corners) in faces {
            let base = mesh.positions.len() as u32;

            for (corner, uv) in corners.iter().zip(face_uvs.iter()) {
                mesh.positions.push(*corner);
                mesh.normals.push(normal);
                mesh.tex_coords.push(*uv);
            }

            mesh.indices
                .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }

        mesh
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles.
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_counts() {
        let cube = MeshData::cube(1.0);
        assert_eq!(cube.vertex_count(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.normals.len(), 24);
        assert_eq!(cube.tex_coords.len(), 24);
    }

    #[test]
    fn test_cube_indices_in_bounds() {
        let cube = MeshData::cube(1.0);
        for &index in &cube.indices {
            assert!((index as usize) < cube.vertex_count());
        }
    }

    #[test]
    fn test_cube_normals_are_unit_axis_aligned() {
        let cube = MeshData::cube(2.5);
        for normal in &cube.normals {
            let len_sq: f32 = normal.iter().map(|c| c * c).sum();
            assert!((len_sq - 1.0).abs() < 1e-6);
            // Exactly one non-zero component per face normal
            let non_zero = normal.iter().filter(|c| **c != 0.0).count();
            assert_eq!(non_zero, 1);
        }
    }

    #[test]
    fn test_cube_respects_half_extent() {
        let cube = MeshData::cube(3.0);
        for position in &cube.positions {
            for component in position {
                assert_eq!(component.abs(), 3.0);
            }
        }
    }
}
