//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct that owns every GPU
//! resource and drives the fixed scene: a handful of rotating textured
//! cubes drawn through command buffers recorded once at startup.

use std::mem::ManuallyDrop;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use glam::Vec3;
use tracing::{error, info};

use smalt_platform::{Surface, Window};
use smalt_resources::{MaterialDesc, MeshData};
use smalt_rhi::buffer::UniformRing;
use smalt_rhi::command::CommandPool;
use smalt_rhi::descriptor::DescriptorPool;
use smalt_rhi::device::Device;
use smalt_rhi::instance::Instance;
use smalt_rhi::physical_device::select_physical_device;
use smalt_rhi::render_pass::RenderPass;
use smalt_rhi::swapchain::Swapchain;
use smalt_rhi::texture::{DEPTH_FORMAT, Texture2D};
use smalt_rhi::{RhiError, RhiResult};
use smalt_scene::{Camera, Transform};

use crate::draw_list::{DrawList, build_scene_draw_list};
use crate::frame_manager::FrameManager;
use crate::material::Material;
use crate::mesh::Mesh;
use crate::ubo::ObjectUniforms;

/// Fixed clear color for the color attachment.
const CLEAR_COLOR: [f32; 4] = [0.2, 0.2, 0.2, 1.0];

/// Number of rotating cubes in the fixed scene.
const OBJECT_COUNT: u32 = 3;

/// Material description driving the scene's single material.
const MATERIAL_PATH: &str = "assets/materials/cube.ron";

/// One scene object: a transform plus its uniform-ring slot.
struct Drawable {
    transform: Transform,
    slot: u32,
    /// Turntable angular velocity in radians per second.
    spin_rate: f32,
}

/// Owns all GPU resources and drives the per-frame loop.
///
/// # Resource Destruction Order
///
/// Vulkan resources are destroyed in reverse creation order, which also
/// keeps the memory pools' LIFO free discipline intact:
///
/// 1. Wait for all GPU work to complete
/// 2. Frame resources (fences, semaphores, framebuffers)
/// 3. Mesh buffers, then the material (and its texture), then the
///    uniform ring, then the depth texture
/// 4. Descriptor pool, render pass, command pool
/// 5. Swapchain, surface, device, instance
///
/// ManuallyDrop is used to make the ordering explicit.
pub struct Renderer {
    // Dropped in declaration order; see the destruction notes above.
    frame_manager: ManuallyDrop<FrameManager>,
    mesh: ManuallyDrop<Mesh>,
    material: ManuallyDrop<Material>,
    uniform_ring: ManuallyDrop<UniformRing>,
    depth_texture: ManuallyDrop<Texture2D>,
    descriptor_pool: ManuallyDrop<DescriptorPool>,
    render_pass: ManuallyDrop<RenderPass>,
    command_pool: ManuallyDrop<CommandPool>,
    swapchain: ManuallyDrop<Swapchain>,
    surface: ManuallyDrop<Surface>,
    device: ManuallyDrop<Arc<Device>>,
    instance: ManuallyDrop<Instance>,

    // Scene state
    drawables: Vec<Drawable>,
    camera: Camera,
}

impl Renderer {
    /// Creates the renderer and uploads the fixed scene.
    ///
    /// Initializes the Vulkan stack (instance, device, swapchain, render
    /// pass), loads the cube material and mesh, and records one command
    /// buffer per swapchain image from a typed draw list. Per-frame
    /// variation flows entirely through dynamic uniform offsets, so those
    /// buffers are never re-recorded.
    ///
    /// # Arguments
    ///
    /// * `window` - The window to render to
    ///
    /// # Errors
    ///
    /// Initialization failures (no compatible device, missing graphics
    /// queue, swapchain creation failure, missing assets) are fatal and
    /// propagate to the caller.
    pub fn new(window: &Window) -> RhiResult<Self> {
        let width = window.width();
        let height = window.height();

        info!("Initializing renderer ({}x{})", width, height);

        // Validation layers in debug builds only
        let enable_validation = cfg!(debug_assertions);
        let instance = Instance::new(enable_validation)?;

        let surface = window
            .create_surface(instance.entry(), instance.handle())
            .map_err(|e| RhiError::SurfaceError(e.to_string()))?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let graphics_family = device.queue_families().graphics_family.unwrap();
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        // The depth texture takes the first device-local pool allocation
        let depth_texture = Texture2D::new(
            device.clone(),
            swapchain.width(),
            swapchain.height(),
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        let render_pass = RenderPass::new(device.clone(), swapchain.format(), DEPTH_FORMAT)?;

        // One uniform region per backbuffer per object
        let uniform_ring = UniformRing::new(
            device.clone(),
            ObjectUniforms::SIZE as vk::DeviceSize,
            swapchain.image_count(),
            OBJECT_COUNT,
        )?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(1),
        ];
        let descriptor_pool = DescriptorPool::new(device.clone(), 1, &pool_sizes)?;

        let material_desc = MaterialDesc::load(Path::new(MATERIAL_PATH))
            .map_err(|e| RhiError::InvalidHandle(e.to_string()))?;
        let material = Material::from_desc(
            device.clone(),
            &command_pool,
            &descriptor_pool,
            &render_pass,
            &material_desc,
            &uniform_ring,
        )?;

        let mesh = Mesh::new(device.clone(), &command_pool, &MeshData::cube(1.0))?;

        // Three cubes side by side, spinning at different rates
        let drawables: Vec<Drawable> = (0..OBJECT_COUNT)
            .map(|slot| {
                let x = (slot as f32 - (OBJECT_COUNT - 1) as f32 / 2.0) * 3.0;
                Drawable {
                    transform: Transform::new().with_position(Vec3::new(x, 0.0, 0.0)),
                    slot,
                    spin_rate: 0.6 + slot as f32 * 0.4,
                }
            })
            .collect();

        let mut camera = Camera::new();
        camera.position = Vec3::new(-5.0, 3.0, -10.0);
        camera.set_perspective(
            45.0_f32.to_radians(),
            width as f32 / height as f32,
            0.1,
            100.0,
        );
        camera.look_at(Vec3::ZERO);

        let frame_manager = FrameManager::new(
            device.clone(),
            &command_pool,
            &render_pass,
            &swapchain,
            depth_texture.view(),
        )?;

        // Build one draw list per swapchain image; each bakes that
        // image's dynamic uniform offsets
        let draw_lists: Vec<DrawList> = (0..swapchain.image_count())
            .map(|image| {
                let offsets: Vec<u32> = drawables
                    .iter()
                    .map(|d| uniform_ring.dynamic_offset(image, d.slot))
                    .collect();

                build_scene_draw_list(
                    material.pipeline(),
                    material.pipeline_layout(),
                    material.descriptor_set(),
                    swapchain.extent(),
                    mesh.vertex_buffer().handle(),
                    mesh.index_buffer().handle(),
                    mesh.index_count(),
                    &offsets,
                )
            })
            .collect();

        frame_manager.record_draw_lists(&render_pass, &draw_lists, CLEAR_COLOR)?;

        info!(
            "Renderer initialized: {} swapchain images, {} objects, material '{}'",
            swapchain.image_count(),
            OBJECT_COUNT,
            material.name()
        );

        Ok(Self {
            frame_manager: ManuallyDrop::new(frame_manager),
            mesh: ManuallyDrop::new(mesh),
            material: ManuallyDrop::new(material),
            uniform_ring: ManuallyDrop::new(uniform_ring),
            depth_texture: ManuallyDrop::new(depth_texture),
            descriptor_pool: ManuallyDrop::new(descriptor_pool),
            render_pass: ManuallyDrop::new(render_pass),
            command_pool: ManuallyDrop::new(command_pool),
            swapchain: ManuallyDrop::new(swapchain),
            surface: ManuallyDrop::new(surface),
            device: ManuallyDrop::new(device),
            instance: ManuallyDrop::new(instance),
            drawables,
            camera,
        })
    }

    /// Advances the scene's turntable animation.
    ///
    /// # Arguments
    ///
    /// * `delta_secs` - Seconds elapsed since the previous update
    pub fn update(&mut self, delta_secs: f32) {
        for drawable in &mut self.drawables {
            drawable.transform.rotate_y(drawable.spin_rate * delta_secs);
        }
    }

    /// Renders one frame.
    ///
    /// Acquires the next swapchain image, waits out that image's previous
    /// GPU work, writes this backbuffer's uniform regions, resubmits the
    /// image's command buffer, and presents.
    ///
    /// # Errors
    ///
    /// Acquisition or presentation failures (e.g. an out-of-date
    /// swapchain) propagate to the caller; the engine does not recover.
    pub fn render_frame(&mut self) -> RhiResult<()> {
        self.frame_manager.acquire(&self.swapchain)?;
        self.frame_manager.wait_for_image()?;

        // Safe to touch this backbuffer's uniform regions from here on
        let backbuffer = self.frame_manager.begin_update()?;

        let view_projection = self.camera.view_projection_matrix();
        for drawable in &self.drawables {
            let uniforms = ObjectUniforms::new(drawable.transform.matrix(), view_projection);
            self.uniform_ring
                .write(backbuffer, drawable.slot, bytemuck::bytes_of(&uniforms))?;
        }

        self.frame_manager.submit()?;
        self.frame_manager.present(&self.swapchain)?;

        Ok(())
    }

    /// Total frames started so far.
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_manager.frame_count()
    }

    /// Returns the current swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Wait for all GPU work before tearing anything down
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during drop: {:?}", e);
        }

        // Reverse creation order; pool allocations free LIFO
        unsafe {
            ManuallyDrop::drop(&mut self.frame_manager);
            ManuallyDrop::drop(&mut self.mesh);
            ManuallyDrop::drop(&mut self.material);
            ManuallyDrop::drop(&mut self.uniform_ring);
            ManuallyDrop::drop(&mut self.depth_texture);
            ManuallyDrop::drop(&mut self.descriptor_pool);
            ManuallyDrop::drop(&mut self.render_pass);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.surface);
            // The last Arc clone drops here, destroying the device before
            // the instance goes away
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
