//! Integration tests for material description loading.

use std::path::Path;

use smalt_resources::{BindingKind, MaterialDesc, ShaderStageDesc};

#[test]
fn test_load_cube_material() {
    // Path to the shipped material description
    let material_path = Path::new("../../assets/materials/cube.ron");

    // Skip test if the asset tree is not present
    if !material_path.exists() {
        println!(
            "Skipping test: material file not found at {:?}",
            material_path
        );
        return;
    }

    let desc = MaterialDesc::load(material_path).expect("Failed to load material description");

    // One shader per stage
    assert_eq!(desc.shaders.len(), 2);
    assert!(
        desc.shaders
            .iter()
            .any(|s| s.stage == ShaderStageDesc::Vertex)
    );
    assert!(
        desc.shaders
            .iter()
            .any(|s| s.stage == ShaderStageDesc::Fragment)
    );

    // The cube vertex layout is position + normal + uv, 32 bytes
    assert_eq!(desc.vertex_stride(), 32);

    // A dynamic uniform buffer and a sampled texture
    assert!(
        desc.bindings
            .iter()
            .any(|b| b.kind == BindingKind::UniformBuffer && b.dynamic)
    );
    assert!(
        desc.bindings
            .iter()
            .any(|b| b.kind == BindingKind::Texture2d && b.source.is_some())
    );
}
