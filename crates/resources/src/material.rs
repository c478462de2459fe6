//! Material description documents.
//!
//! A material description lists the shaders, vertex layout, and resource
//! bindings a drawable needs. Descriptions live in RON files:
//!
//! ```ron
//! MaterialDesc(
//!     name: "cube",
//!     shaders: [
//!         ShaderDesc(stage: vs, path: "assets/shaders/mesh.vert.spv"),
//!         ShaderDesc(stage: ps, path: "assets/shaders/mesh.frag.spv"),
//!     ],
//!     vertex_layout: [float3, float3, float2],
//!     bindings: [
//!         BindingDesc(kind: uniform_buffer, binding: 0, shader_stage: vs, dynamic: true),
//!         BindingDesc(kind: texture_2d, binding: 1, shader_stage: ps, source: Some("assets/textures/spot.png")),
//!     ],
//! )
//! ```
//!
//! The renderer turns one of these into a pipeline, pipeline layout,
//! descriptor set layout, and an allocated descriptor set.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{ResourceError, ResourceResult};

/// Shader stage a material entry refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum ShaderStageDesc {
    /// Vertex shader.
    #[serde(rename = "vs")]
    Vertex,
    /// Fragment (pixel) shader.
    #[serde(rename = "ps")]
    Fragment,
}

/// Vertex attribute type token.
///
/// Ordered tokens describe the vertex layout; offsets are accumulated in
/// declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    /// Two 32-bit floats (8 bytes).
    Float2,
    /// Three 32-bit floats (12 bytes).
    Float3,
    /// Four 32-bit floats (16 bytes).
    Float4,
    /// A 4x4 float matrix (64 bytes, spans four attribute locations).
    Mat44,
}

impl AttributeType {
    /// Size of the attribute in bytes.
    pub fn size_bytes(self) -> u32 {
        match self {
            AttributeType::Float2 => 8,
            AttributeType::Float3 => 12,
            AttributeType::Float4 => 16,
            AttributeType::Mat44 => 64,
        }
    }

    /// Number of shader input locations the attribute occupies.
    ///
    /// Everything is one location except `mat44`, which spans four vec4
    /// columns.
    pub fn location_count(self) -> u32 {
        match self {
            AttributeType::Mat44 => 4,
            _ => 1,
        }
    }
}

/// Resource binding kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum BindingKind {
    /// A uniform buffer, optionally with a dynamic offset.
    #[serde(rename = "uniform_buffer")]
    UniformBuffer,
    /// A sampled 2D texture.
    #[serde(rename = "texture_2d")]
    Texture2d,
}

/// One shader entry in a material description.
#[derive(Clone, Debug, Deserialize)]
pub struct ShaderDesc {
    /// Pipeline stage the shader runs in.
    pub stage: ShaderStageDesc,
    /// Path to the precompiled SPIR-V bytecode.
    pub path: PathBuf,
}

/// One resource binding entry in a material description.
#[derive(Clone, Debug, Deserialize)]
pub struct BindingDesc {
    /// What kind of resource is bound.
    pub kind: BindingKind,
    /// Binding index within the descriptor set.
    pub binding: u32,
    /// Shader stage that reads the binding.
    pub shader_stage: ShaderStageDesc,
    /// Whether the uniform buffer takes a dynamic offset at bind time.
    #[serde(default)]
    pub dynamic: bool,
    /// Image file backing a texture binding.
    #[serde(default)]
    pub source: Option<PathBuf>,
}

/// A parsed material description.
#[derive(Clone, Debug, Deserialize)]
pub struct MaterialDesc {
    /// Material name.
    pub name: String,
    /// Shader list, one entry per stage.
    pub shaders: Vec<ShaderDesc>,
    /// Ordered vertex attribute tokens.
    pub vertex_layout: Vec<AttributeType>,
    /// Resource binding list.
    pub bindings: Vec<BindingDesc>,
}

impl MaterialDesc {
    /// Loads and parses a material description file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> ResourceResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ResourceError::MaterialLoad {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        Self::parse(&text)
    }

    /// Parses a material description from RON text.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed.
    pub fn parse(text: &str) -> ResourceResult<Self> {
        let desc: MaterialDesc = ron::from_str(text)?;
        Ok(desc)
    }

    /// Total vertex stride in bytes, accumulated over the layout tokens.
    pub fn vertex_stride(&self) -> u32 {
        self.vertex_layout.iter().map(|a| a.size_bytes()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CUBE_MATERIAL: &str = r#"
        MaterialDesc(
            name: "cube",
            shaders: [
                ShaderDesc(stage: vs, path: "assets/shaders/mesh.vert.spv"),
                ShaderDesc(stage: ps, path: "assets/shaders/mesh.frag.spv"),
            ],
            vertex_layout: [float3, float3, float2],
            bindings: [
                BindingDesc(kind: uniform_buffer, binding: 0, shader_stage: vs, dynamic: true),
                BindingDesc(kind: texture_2d, binding: 1, shader_stage: ps, source: Some("assets/textures/spot.png")),
            ],
        )
    "#;

    #[test]
    fn test_parse_material() {
        let desc = MaterialDesc::parse(CUBE_MATERIAL).unwrap();
        assert_eq!(desc.name, "cube");
        assert_eq!(desc.shaders.len(), 2);
        assert_eq!(desc.shaders[0].stage, ShaderStageDesc::Vertex);
        assert_eq!(desc.shaders[1].stage, ShaderStageDesc::Fragment);
        assert_eq!(desc.vertex_layout.len(), 3);
        assert_eq!(desc.bindings.len(), 2);
    }

    #[test]
    fn test_binding_entries() {
        let desc = MaterialDesc::parse(CUBE_MATERIAL).unwrap();

        let ubo = &desc.bindings[0];
        assert_eq!(ubo.kind, BindingKind::UniformBuffer);
        assert_eq!(ubo.binding, 0);
        assert!(ubo.dynamic);
        assert!(ubo.source.is_none());

        let texture = &desc.bindings[1];
        assert_eq!(texture.kind, BindingKind::Texture2d);
        assert_eq!(texture.binding, 1);
        assert!(!texture.dynamic);
        assert!(texture.source.is_some());
    }

    #[test]
    fn test_attribute_sizes() {
        assert_eq!(AttributeType::Float2.size_bytes(), 8);
        assert_eq!(AttributeType::Float3.size_bytes(), 12);
        assert_eq!(AttributeType::Float4.size_bytes(), 16);
        assert_eq!(AttributeType::Mat44.size_bytes(), 64);
    }

    #[test]
    fn test_attribute_locations() {
        assert_eq!(AttributeType::Float3.location_count(), 1);
        assert_eq!(AttributeType::Mat44.location_count(), 4);
    }

    #[test]
    fn test_vertex_stride() {
        let desc = MaterialDesc::parse(CUBE_MATERIAL).unwrap();
        // float3 + float3 + float2 = 12 + 12 + 8 = 32 bytes
        assert_eq!(desc.vertex_stride(), 32);
    }

    #[test]
    fn test_dynamic_defaults_to_false() {
        let text = r#"
            MaterialDesc(
                name: "minimal",
                shaders: [],
                vertex_layout: [float4],
                bindings: [
                    BindingDesc(kind: uniform_buffer, binding: 0, shader_stage: vs),
                ],
            )
        "#;
        let desc = MaterialDesc::parse(text).unwrap();
        assert!(!desc.bindings[0].dynamic);
    }

    #[test]
    fn test_malformed_document_is_an_error() {
        assert!(MaterialDesc::parse("MaterialDesc(name:").is_err());
    }
}
