//! Error types for the engine.

use thiserror::Error;

/// Top-level engine error.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Resource loading errors
    #[error("Resource error: {0}")]
    Resource(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the engine's Error type.
pub type Result<T> = std::result::Result<T, Error>;
