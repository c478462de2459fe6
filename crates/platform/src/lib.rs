//! Platform glue for the engine:
//! - Window management via winit
//! - Vulkan surface creation
//! - Keyboard input state

mod input;
mod window;

pub use input::{InputState, KeyCode};
pub use window::{Surface, Window};
