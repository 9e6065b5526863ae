//! Error types shared across the workspace.

use thiserror::Error;

/// Main error type for setup-time failures outside the Vulkan wrappers.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors raised outside of the RHI layer
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the workspace's [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;
