//! Resource loading and management.
//!
//! This crate handles the engine's external asset formats:
//! - Material description documents (RON)
//! - Mesh data generation
//! - Image decoding to RGBA8

mod error;

pub mod image;
pub mod material;
pub mod mesh;

pub use error::{ResourceError, ResourceResult};
pub use image::ImageData;
pub use material::{
    AttributeType, BindingDesc, BindingKind, MaterialDesc, ShaderDesc, ShaderStageDesc,
};
pub use mesh::MeshData;
