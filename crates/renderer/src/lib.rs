//! Frame orchestration and scene rendering.
//!
//! This crate drives the per-frame loop:
//! - Per-swapchain-image frame resources and synchronization
//! - Typed draw lists recorded once and replayed each frame
//! - Material and mesh assembly from resource descriptions
//! - Per-backbuffer uniform-ring updates

pub mod draw_list;
pub mod frame;
pub mod frame_manager;
pub mod material;
pub mod mesh;
pub mod renderer;
pub mod ubo;

pub use frame_manager::FrameManager;
pub use renderer::Renderer;
