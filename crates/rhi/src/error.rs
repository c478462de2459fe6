//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No suitable GPU found
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// No memory type satisfies the requested properties
    #[error("No memory type matches bits {type_bits:#b} with the requested properties")]
    NoSuitableMemoryType {
        /// Memory type bits from the resource's requirements
        type_bits: u32,
    },

    /// A memory pool has insufficient remaining capacity
    #[error(
        "Pool for memory type {type_index} exhausted: requested {requested} bytes, {remaining} remaining"
    )]
    OutOfPoolMemory {
        /// Memory type index of the exhausted pool
        type_index: u32,
        /// Requested allocation size in bytes
        requested: u64,
        /// Remaining pool capacity in bytes
        remaining: u64,
    },

    /// An allocation was freed out of LIFO order
    #[error(
        "Allocation freed out of order: pool offset {pool_offset}, allocation ends at {allocation_end}"
    )]
    NonLifoFree {
        /// The pool's current bump offset
        pool_offset: u64,
        /// Where the freed allocation ends
        allocation_end: u64,
    },

    /// A CPU write was attempted on memory that is not mapped
    #[error("Memory is not host-visible: {0}")]
    NotMapped(String),

    /// An image layout transition with no known barrier masks
    #[error("Unsupported image layout transition: {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        from: crate::texture::TextureLayout,
        /// Requested layout
        to: crate::texture::TextureLayout,
    },

    /// Shader loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument error
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
