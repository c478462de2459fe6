//! Smalt - Main Entry Point
//!
//! A minimal Vulkan engine drawing a fixed scene of rotating textured
//! cubes at a fixed resolution.

use anyhow::Result;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use smalt_core::Timer;
use smalt_platform::{InputState, KeyCode, Window};
use smalt_renderer::Renderer;

const WINDOW_WIDTH: u32 = 1280;
const WINDOW_HEIGHT: u32 = 720;

struct App {
    window: Option<Window>,
    renderer: Option<Renderer>,
    input: InputState,
    timer: Timer,
}

impl App {
    fn new() -> Self {
        Self {
            window: None,
            renderer: None,
            input: InputState::new(),
            timer: Timer::new(),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            match Window::new(event_loop, WINDOW_WIDTH, WINDOW_HEIGHT, "Smalt") {
                Ok(window) => match Renderer::new(&window) {
                    Ok(renderer) => {
                        info!("Initialization complete, entering main loop");
                        self.renderer = Some(renderer);
                        self.window = Some(window);
                    }
                    Err(e) => {
                        error!("Failed to create renderer: {}", e);
                        event_loop.exit();
                    }
                },
                Err(e) => {
                    error!("Failed to create window: {}", e);
                    event_loop.exit();
                }
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                event_loop.exit();
            }
            WindowEvent::RedrawRequested => {
                let delta = self.timer.delta_secs();

                if let Some(ref mut renderer) = self.renderer {
                    renderer.update(delta);
                    if let Err(e) = renderer.render_frame() {
                        // No swapchain/device-loss recovery; render errors
                        // end the run
                        error!("Render error: {}", e);
                        event_loop.exit();
                    }
                }
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::PhysicalKey;
                if let PhysicalKey::Code(key) = event.physical_key {
                    if event.state.is_pressed() {
                        self.input.on_key_pressed(key);
                    } else {
                        self.input.on_key_released(key);
                    }
                }

                if self.input.is_key_just_pressed(KeyCode::Escape) {
                    info!("Escape pressed, shutting down");
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        self.input.begin_frame();
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

fn main() -> Result<()> {
    smalt_core::init_logging();
    info!("Starting Smalt");

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new();
    event_loop.run_app(&mut app)?;

    Ok(())
}
