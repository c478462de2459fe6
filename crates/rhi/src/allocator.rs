//! Pool-based device memory sub-allocation.
//!
//! This module hides Vulkan memory-type selection and sub-allocation behind
//! a simple allocate/free contract:
//!
//! - One [`MemoryPool`] per memory-type index, created lazily on the first
//!   request for that type and backed by a single large `vkAllocateMemory`
//!   block. Host-visible pools are mapped once at creation and stay mapped.
//! - Allocations are aligned bump allocations into the pool. Allocation is
//!   O(1) and pools are monotonically consumed; there is no mid-pool
//!   fragmentation handling.
//! - [`DeviceAllocator::free`] reclaims space only in strict LIFO order.
//!   Freeing out of order is detected and rejected rather than corrupting
//!   the pool's bookkeeping.
//!
//! All native memory/map/unmap calls happen here and nowhere else; every
//! other component treats memory as an opaque [`Allocation`].
//!
//! # Thread Safety
//!
//! Pools are mutated only from the single host submission thread. The
//! allocator lives behind a `Mutex` inside [`Device`](crate::device::Device)
//! so that resource wrappers can share it through `Arc<Device>`.

use std::collections::HashMap;

use ash::vk;
use tracing::{debug, warn};

use crate::error::{RhiError, RhiResult};

/// Capacity of each lazily-created memory pool.
pub const POOL_SIZE: vk::DeviceSize = 160 * 1024 * 1024;

/// Rounds `value` up to the next multiple of `alignment`.
///
/// `alignment` must be a power of two (Vulkan guarantees this for all
/// reported requirement and limit alignments).
#[inline]
pub const fn align_up(value: u64, alignment: u64) -> u64 {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Pure bump-allocation bookkeeping for a single pool.
///
/// Kept separate from the Vulkan handles so the offset arithmetic and the
/// LIFO discipline can be exercised without a device.
#[derive(Debug)]
pub struct PoolState {
    capacity: u64,
    offset: u64,
    allocations: u32,
}

/// An aligned region reserved from a [`PoolState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reservation {
    /// Aligned start offset of the region.
    pub offset: u64,
    /// Requested size in bytes.
    pub size: u64,
    /// Size including the alignment padding in front of the region.
    ///
    /// Releasing subtracts this, restoring the pool offset to exactly the
    /// value it had before the reservation was made.
    pub padded_size: u64,
}

impl PoolState {
    /// Creates bookkeeping for a pool of `capacity` bytes.
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            offset: 0,
            allocations: 0,
        }
    }

    /// Reserves an aligned region of `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns the remaining capacity in the error if the aligned region
    /// does not fit.
    pub fn reserve(&mut self, size: u64, alignment: u64) -> Result<Reservation, u64> {
        let aligned = align_up(self.offset, alignment);
        if aligned + size > self.capacity {
            return Err(self.capacity.saturating_sub(self.offset));
        }

        let reservation = Reservation {
            offset: aligned,
            size,
            padded_size: (aligned - self.offset) + size,
        };
        self.offset = aligned + size;
        self.allocations += 1;
        Ok(reservation)
    }

    /// Releases a reservation, enforcing LIFO order.
    ///
    /// Only the most recent outstanding reservation may be released; the
    /// check compares the pool's current offset against the end of the
    /// released region.
    pub fn release(&mut self, reservation: Reservation) -> RhiResult<()> {
        let end = reservation.offset + reservation.size;
        if self.offset != end {
            return Err(RhiError::NonLifoFree {
                pool_offset: self.offset,
                allocation_end: end,
            });
        }

        self.offset -= reservation.padded_size;
        self.allocations -= 1;
        Ok(())
    }

    /// Current bump offset.
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of outstanding reservations.
    #[inline]
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    /// Remaining capacity in bytes, ignoring alignment padding.
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.capacity - self.offset
    }
}

/// One contiguous device-memory block for a single memory-type index.
struct MemoryPool {
    memory: vk::DeviceMemory,
    state: PoolState,
    host_visible: bool,
    /// Base of the persistent mapping, null for device-local pools.
    mapped: *mut u8,
}

/// A lease into a [`MemoryPool`].
///
/// Exclusively used by exactly one buffer or image resource until it is
/// handed back to [`DeviceAllocator::free`].
#[derive(Debug)]
pub struct Allocation {
    memory: vk::DeviceMemory,
    type_index: u32,
    reservation: Reservation,
    /// `pool_base + offset` for host-visible pools, null otherwise.
    mapped: *mut u8,
}

// SAFETY: the mapped pointer targets a persistently-mapped pool that lives
// for the lifetime of the owning allocator, and the engine's submission
// model confines all writes through it to a single thread.
unsafe impl Send for Allocation {}
unsafe impl Sync for Allocation {}

impl Allocation {
    /// The device memory block this allocation lives in.
    #[inline]
    pub fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    /// Byte offset of this allocation within its pool.
    #[inline]
    pub fn offset(&self) -> vk::DeviceSize {
        self.reservation.offset
    }

    /// Size of this allocation in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.reservation.size
    }

    /// CPU pointer into the pool's persistent mapping.
    ///
    /// `None` for device-local allocations.
    #[inline]
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        if self.mapped.is_null() {
            None
        } else {
            Some(self.mapped)
        }
    }
}

/// Sub-allocates device memory from fixed-size pools keyed by memory-type
/// index.
pub struct DeviceAllocator {
    device: ash::Device,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    pools: HashMap<u32, MemoryPool>,
}

impl DeviceAllocator {
    /// Creates an allocator for the given device.
    pub fn new(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: ash::Device,
    ) -> Self {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Self {
            device,
            memory_properties,
            pools: HashMap::new(),
        }
    }

    /// Allocates memory satisfying a buffer's requirements and binds nothing;
    /// the caller binds at the returned offset.
    pub fn allocate_buffer(
        &mut self,
        buffer: vk::Buffer,
        cpu_visible: bool,
    ) -> RhiResult<Allocation> {
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        self.allocate(requirements, cpu_visible)
    }

    /// Allocates memory satisfying an image's requirements.
    pub fn allocate_image(
        &mut self,
        image: vk::Image,
        cpu_visible: bool,
    ) -> RhiResult<Allocation> {
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };
        self.allocate(requirements, cpu_visible)
    }

    /// Sub-allocates an aligned region for the given requirements.
    ///
    /// Selects the first memory-type index whose bit is set in the
    /// requirements mask and whose properties contain HOST_VISIBLE |
    /// HOST_COHERENT (when `cpu_visible`) or DEVICE_LOCAL (otherwise),
    /// lazily creating the pool for that index.
    ///
    /// # Errors
    ///
    /// - [`RhiError::NoSuitableMemoryType`] if no memory type matches.
    /// - [`RhiError::OutOfPoolMemory`] if the pool's remaining capacity is
    ///   insufficient; pools are never grown.
    pub fn allocate(
        &mut self,
        requirements: vk::MemoryRequirements,
        cpu_visible: bool,
    ) -> RhiResult<Allocation> {
        let wanted = if cpu_visible {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        } else {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        };

        let type_index = self
            .memory_type_from_properties(requirements.memory_type_bits, wanted)
            .ok_or(RhiError::NoSuitableMemoryType {
                type_bits: requirements.memory_type_bits,
            })?;

        if !self.pools.contains_key(&type_index) {
            let pool = self.create_pool(type_index, cpu_visible)?;
            self.pools.insert(type_index, pool);
        }

        let pool = self
            .pools
            .get_mut(&type_index)
            .expect("pool inserted above");

        // A host-visible-capable type may have been first used for a
        // device-local request; map it on the first cpu-visible use.
        if cpu_visible && pool.mapped.is_null() {
            pool.mapped = unsafe {
                self.device.map_memory(
                    pool.memory,
                    0,
                    POOL_SIZE,
                    vk::MemoryMapFlags::empty(),
                )?
            } as *mut u8;
            pool.host_visible = true;
        }

        let reservation = pool
            .state
            .reserve(requirements.size, requirements.alignment)
            .map_err(|remaining| RhiError::OutOfPoolMemory {
                type_index,
                requested: requirements.size,
                remaining,
            })?;

        let mapped = if pool.mapped.is_null() {
            std::ptr::null_mut()
        } else {
            // SAFETY: the reservation lies within the mapped POOL_SIZE range.
            unsafe { pool.mapped.add(reservation.offset as usize) }
        };

        Ok(Allocation {
            memory: pool.memory,
            type_index,
            reservation,
            mapped,
        })
    }

    /// Returns an allocation's region to its pool.
    ///
    /// Allocations must be freed in exact reverse order of creation; the
    /// LIFO consistency check rejects anything else.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::NonLifoFree`] when the allocation is not the
    /// most recently made one in its pool.
    pub fn free(&mut self, allocation: Allocation) -> RhiResult<()> {
        let pool = self
            .pools
            .get_mut(&allocation.type_index)
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!(
                    "no pool for memory type {}",
                    allocation.type_index
                ))
            })?;

        pool.state.release(allocation.reservation)
    }

    /// Finds the first memory-type index matching `type_bits` whose
    /// property flags contain `wanted`.
    fn memory_type_from_properties(
        &self,
        type_bits: u32,
        wanted: vk::MemoryPropertyFlags,
    ) -> Option<u32> {
        let count = self.memory_properties.memory_type_count as usize;
        self.memory_properties.memory_types[..count]
            .iter()
            .enumerate()
            .find(|(i, ty)| {
                (type_bits & (1 << i)) != 0 && ty.property_flags.contains(wanted)
            })
            .map(|(i, _)| i as u32)
    }

    fn create_pool(&self, type_index: u32, cpu_visible: bool) -> RhiResult<MemoryPool> {
        let allocate_info = vk::MemoryAllocateInfo::default()
            .allocation_size(POOL_SIZE)
            .memory_type_index(type_index);

        let memory = unsafe { self.device.allocate_memory(&allocate_info, None)? };

        let mapped = if cpu_visible {
            (unsafe {
                self.device
                    .map_memory(memory, 0, POOL_SIZE, vk::MemoryMapFlags::empty())?
            }) as *mut u8
        } else {
            std::ptr::null_mut()
        };

        debug!(
            "Created {} pool for memory type {} ({} bytes)",
            if cpu_visible { "host-visible" } else { "device-local" },
            type_index,
            POOL_SIZE
        );

        Ok(MemoryPool {
            memory,
            state: PoolState::new(POOL_SIZE),
            host_visible: cpu_visible,
            mapped,
        })
    }

    /// Unmaps and frees every pool.
    ///
    /// Called by the device before it destroys itself; all resource
    /// allocations must have been freed by then.
    pub fn destroy_pools(&mut self) {
        for (type_index, pool) in self.pools.drain() {
            if pool.state.allocations() > 0 {
                warn!(
                    "Destroying pool for memory type {} with {} outstanding allocation(s)",
                    type_index,
                    pool.state.allocations()
                );
            }
            unsafe {
                if pool.host_visible {
                    self.device.unmap_memory(pool.memory);
                }
                self.device.free_memory(pool.memory, None);
            }
        }
        debug!("All memory pools destroyed");
    }
}

// SAFETY: the raw mapped pointers target allocator-owned mappings; access
// is serialized by the Mutex the allocator lives behind.
unsafe impl Send for DeviceAllocator {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(100, 64), 128);
    }

    #[test]
    fn test_reserve_returns_aligned_offsets() {
        let mut state = PoolState::new(4096);

        for &(size, alignment) in &[(10u64, 4u64), (100, 64), (1, 256), (128, 16)] {
            let r = state.reserve(size, alignment).unwrap();
            assert_eq!(r.offset % alignment, 0, "offset {} not aligned", r.offset);
        }
    }

    #[test]
    fn test_reserve_within_capacity_never_fails() {
        let mut state = PoolState::new(1024);
        // 4 allocations of 256 exactly fill the pool
        for _ in 0..4 {
            state.reserve(256, 1).unwrap();
        }
        assert_eq!(state.remaining(), 0);
    }

    #[test]
    fn test_reserve_exceeding_capacity_reports_error() {
        let mut state = PoolState::new(1024);
        state.reserve(1000, 1).unwrap();

        let err = state.reserve(100, 1).unwrap_err();
        assert_eq!(err, 24); // remaining capacity reported back

        // The failed reservation must not disturb the cursor
        assert_eq!(state.offset(), 1000);
        assert_eq!(state.allocations(), 1);
    }

    #[test]
    fn test_lifo_release_restores_offset_exactly() {
        let mut state = PoolState::new(4096);

        let a = state.reserve(100, 64).unwrap();
        let b = state.reserve(30, 256).unwrap();
        let c = state.reserve(512, 16).unwrap();

        state.release(c).unwrap();
        state.release(b).unwrap();
        state.release(a).unwrap();

        assert_eq!(state.offset(), 0);
        assert_eq!(state.allocations(), 0);
    }

    #[test]
    fn test_out_of_order_release_rejected() {
        let mut state = PoolState::new(4096);

        let a = state.reserve(100, 64).unwrap();
        let _b = state.reserve(30, 256).unwrap();

        let err = state.release(a).unwrap_err();
        assert!(matches!(err, RhiError::NonLifoFree { .. }));

        // Bookkeeping is untouched after the rejected release
        assert_eq!(state.allocations(), 2);
    }

    #[test]
    fn test_release_and_reuse() {
        let mut state = PoolState::new(1024);

        let a = state.reserve(512, 256).unwrap();
        state.release(a).unwrap();

        // Freed space is reusable
        let b = state.reserve(1024, 1).unwrap();
        assert_eq!(b.offset, 0);
    }

    #[test]
    fn test_distinct_reservations_are_disjoint() {
        let mut state = PoolState::new(4096);

        let a = state.reserve(128, 256).unwrap();
        let b = state.reserve(128, 256).unwrap();

        let a_end = a.offset + a.size;
        assert!(b.offset >= a_end, "regions overlap: {:?} vs {:?}", a, b);
    }
}
