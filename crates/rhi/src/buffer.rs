//! GPU buffer management.
//!
//! This module handles vertex, index, uniform, and staging buffers.
//! Memory comes from the device's pool allocator; buffers only hold an
//! opaque [`Allocation`] lease.
//!
//! # Overview
//!
//! - [`BufferUsage`] defines how a buffer will be used (vertex, index, ...)
//! - [`Buffer`] wraps a VkBuffer plus its pool allocation
//! - [`IndexBuffer`] is a 32-bit index buffer with an element count
//! - [`UniformRing`] partitions one uniform buffer into per-backbuffer,
//!   per-object regions addressed by dynamic descriptor offsets
//!
//! Static data takes the staging path: a temporary host-visible buffer is
//! filled through the pool's persistent mapping, a one-shot command buffer
//! copies it into the device-local target, and the CPU blocks on a fence
//! until the copy lands. That full stall is acceptable only at load time.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use smalt_rhi::buffer::{Buffer, BufferUsage};
//! use smalt_rhi::command::CommandPool;
//! use smalt_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>, pool: &CommandPool) -> Result<(), smalt_rhi::RhiError> {
//! let vertices: [f32; 6] = [0.0, 0.5, -0.5, -0.5, 0.5, -0.5];
//! let vertex_buffer = Buffer::new_static(
//!     device,
//!     pool,
//!     BufferUsage::Vertex,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, warn};

use crate::allocator::{Allocation, align_up};
use crate::command::{CommandPool, submit_one_shot};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which determines Vulkan usage
/// flags and which kind of pool the memory comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer - stores vertex data
    Vertex,
    /// Index buffer - stores 32-bit index data
    Index,
    /// Uniform buffer - stores shader uniform data
    Uniform,
    /// Staging buffer - CPU-writable transfer source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer wrapper with pool-allocated memory.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe; all access happens on the single
/// host submission thread.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Pool allocation backing this buffer.
    allocation: Option<Allocation>,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    /// Buffer usage type.
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer of `size` bytes.
    ///
    /// `dynamic` buffers are placed in a host-visible pool and stay
    /// persistently mapped for per-frame writes; everything else is
    /// device-local. Staging buffers are always host-visible.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `usage` - The intended buffer usage
    /// * `size` - Buffer size in bytes
    /// * `dynamic` - Whether the CPU updates this buffer every frame
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or pool allocation fails.
    pub fn new(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        dynamic: bool,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let cpu_visible = dynamic || usage == BufferUsage::Staging;

        let allocation = {
            let mut allocator = device.allocator().lock().unwrap();
            allocator.allocate_buffer(buffer, cpu_visible)?
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a device-local buffer and fills it through a staging upload.
    ///
    /// When this returns, every byte of `data` is visible at the target
    /// buffer; the pipeline has been stalled on a fence to guarantee it.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - Command pool for the one-shot copy
    /// * `usage` - The intended buffer usage
    /// * `data` - The payload
    ///
    /// # Errors
    ///
    /// Returns an error if creation, the staging write, or the copy fails.
    pub fn new_static(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let buffer = Self::new(device.clone(), usage, data.len() as vk::DeviceSize, false)?;

        let staging = Self::new(
            device.clone(),
            BufferUsage::Staging,
            data.len() as vk::DeviceSize,
            true,
        )?;
        staging.write(0, data)?;

        submit_one_shot(&device, pool, |cmd| {
            cmd.copy_buffer(staging.handle(), buffer.handle(), data.len() as vk::DeviceSize);
            Ok(())
        })?;

        // Staging drops here, which frees the most recent host-visible
        // allocation and keeps the pool's LIFO discipline intact.
        Ok(buffer)
    }

    /// Writes data through the pool's persistent mapping.
    ///
    /// # Arguments
    ///
    /// * `offset` - Byte offset into the buffer
    /// * `data` - Data to write
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is not host-visible or the write
    /// would exceed the buffer size.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::NotMapped(format!("{} buffer", self.usage.name())))?;

        // SAFETY: the pointer targets the buffer's region of a persistently
        // mapped pool and the range was bounds-checked above.
        unsafe {
            let dst = mapped_ptr.add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        // Free the allocation first, then destroy the buffer. Resources are
        // torn down in reverse creation order, so the pool sees LIFO frees;
        // anything else is rejected by the allocator and reclaimed when the
        // pool itself is destroyed.
        if let Some(allocation) = self.allocation.take() {
            let mut allocator = self.device.allocator().lock().unwrap();
            if let Err(e) = allocator.free(allocation) {
                warn!("Leaked {} buffer allocation: {}", self.usage.name(), e);
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

/// Index buffer with fixed 32-bit indices.
pub struct IndexBuffer {
    buffer: Buffer,
    count: u32,
}

impl IndexBuffer {
    /// Creates a device-local index buffer from `indices` via a staging
    /// upload.
    ///
    /// # Errors
    ///
    /// Returns an error if the upload fails.
    pub fn new_static(
        device: Arc<Device>,
        pool: &CommandPool,
        indices: &[u32],
    ) -> RhiResult<Self> {
        let buffer = Buffer::new_static(
            device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(indices),
        )?;

        Ok(Self {
            buffer,
            count: indices.len() as u32,
        })
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Returns the number of indices.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }
}

/// Region layout for a per-frame uniform ring.
///
/// Pure arithmetic, kept separate from the buffer so stride rounding and
/// region addressing can be tested without a device.
///
/// The ring holds `backbuffer_count * rename_count` regions of `stride`
/// bytes. Writes for backbuffer index N may only target N's regions; the
/// frame orchestrator's per-image fence wait guarantees the GPU is no
/// longer reading them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingLayout {
    stride: u64,
    backbuffer_count: u32,
    rename_count: u32,
}

impl RingLayout {
    /// Computes the layout for `request` bytes per object.
    ///
    /// The stride is `request` rounded up to the device's minimum uniform
    /// offset alignment.
    pub fn new(request: u64, min_alignment: u64, backbuffer_count: u32, rename_count: u32) -> Self {
        Self {
            stride: align_up(request, min_alignment),
            backbuffer_count,
            rename_count,
        }
    }

    /// The aligned region size in bytes.
    #[inline]
    pub fn stride(&self) -> u64 {
        self.stride
    }

    /// Total buffer size covering every backbuffer and rename slot.
    #[inline]
    pub fn total_size(&self) -> u64 {
        self.stride * self.backbuffer_count as u64 * self.rename_count as u64
    }

    /// Byte offset of the region for `(backbuffer_index, slot)`.
    #[inline]
    pub fn offset(&self, backbuffer_index: u32, slot: u32) -> u64 {
        debug_assert!(backbuffer_index < self.backbuffer_count);
        debug_assert!(slot < self.rename_count);
        (backbuffer_index as u64 * self.rename_count as u64 + slot as u64) * self.stride
    }
}

/// Per-frame uniform ring buffer.
///
/// One persistently-mapped uniform buffer whose regions are partitioned by
/// backbuffer index and object slot. Descriptor sets bind a single
/// `stride`-sized range with a dynamic offset selecting the region.
pub struct UniformRing {
    buffer: Buffer,
    layout: RingLayout,
}

impl UniformRing {
    /// Creates a uniform ring for `request` bytes per object.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `request` - Unaligned per-object payload size in bytes
    /// * `backbuffer_count` - Number of swapchain images
    /// * `rename_count` - Number of object slots per backbuffer
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails.
    pub fn new(
        device: Arc<Device>,
        request: vk::DeviceSize,
        backbuffer_count: u32,
        rename_count: u32,
    ) -> RhiResult<Self> {
        let layout = RingLayout::new(
            request,
            device.min_uniform_buffer_offset_alignment(),
            backbuffer_count,
            rename_count,
        );

        let buffer = Buffer::new(device, BufferUsage::Uniform, layout.total_size(), true)?;

        debug!(
            "Created uniform ring: stride {} x {} backbuffers x {} slots",
            layout.stride(),
            backbuffer_count,
            rename_count
        );

        Ok(Self { buffer, layout })
    }

    /// Writes `data` into the region for `(backbuffer_index, slot)`.
    ///
    /// Safe only when the frame orchestrator has waited on the fence of
    /// the swapchain image with this backbuffer index.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` exceeds the stride.
    pub fn write(&self, backbuffer_index: u32, slot: u32, data: &[u8]) -> RhiResult<()> {
        if data.len() as u64 > self.layout.stride() {
            return Err(RhiError::InvalidHandle(format!(
                "Uniform write of {} bytes exceeds ring stride {}",
                data.len(),
                self.layout.stride()
            )));
        }

        self.buffer
            .write(self.layout.offset(backbuffer_index, slot), data)
    }

    /// Dynamic descriptor offset for `(backbuffer_index, slot)`.
    #[inline]
    pub fn dynamic_offset(&self, backbuffer_index: u32, slot: u32) -> u32 {
        self.layout.offset(backbuffer_index, slot) as u32
    }

    /// The aligned region size; also the descriptor's bound range.
    #[inline]
    pub fn stride(&self) -> vk::DeviceSize {
        self.layout.stride()
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }

    #[test]
    fn test_ring_stride_rounds_up_to_alignment() {
        // Two 128-byte requests on a device with 256-byte minimum alignment
        let layout = RingLayout::new(128, 256, 3, 2);
        assert_eq!(layout.stride(), 256);
    }

    #[test]
    fn test_ring_regions_are_disjoint() {
        let layout = RingLayout::new(128, 256, 3, 2);

        let mut offsets = Vec::new();
        for backbuffer in 0..3 {
            for slot in 0..2 {
                offsets.push(layout.offset(backbuffer, slot));
            }
        }

        offsets.sort_unstable();
        for pair in offsets.windows(2) {
            assert!(
                pair[1] - pair[0] >= layout.stride(),
                "regions {} and {} overlap",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_ring_total_size_covers_all_regions() {
        let layout = RingLayout::new(200, 256, 2, 4);
        assert_eq!(layout.total_size(), 256 * 2 * 4);

        let last = layout.offset(1, 3);
        assert_eq!(last + layout.stride(), layout.total_size());
    }

    #[test]
    fn test_ring_offset_partitioned_by_backbuffer() {
        let layout = RingLayout::new(64, 64, 2, 3);

        // All of backbuffer 0's regions come before backbuffer 1's
        let max_b0 = (0..3).map(|s| layout.offset(0, s)).max().unwrap();
        let min_b1 = (0..3).map(|s| layout.offset(1, s)).min().unwrap();
        assert!(max_b0 + layout.stride() <= min_b1);
    }

    #[test]
    fn test_aligned_request_keeps_size() {
        let layout = RingLayout::new(256, 256, 2, 1);
        assert_eq!(layout.stride(), 256);
    }
}
