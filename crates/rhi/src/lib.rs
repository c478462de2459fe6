//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash`
//! crate. It handles:
//! - Instance and device creation
//! - Pool-based device memory sub-allocation
//! - Swapchain management
//! - Render pass and framebuffer setup
//! - Command buffer recording
//! - Buffer, uniform ring, and texture management
//! - Pipeline creation
//! - Synchronization primitives

mod error;

pub mod allocator;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod texture;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
