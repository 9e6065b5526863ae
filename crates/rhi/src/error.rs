//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// No GPU satisfies the selection criteria
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A requested instance layer is not installed
    #[error("Layer {0} requested but not available")]
    MissingLayer(String),

    /// A name passed to Vulkan is not a valid C string
    #[error("Invalid name {0:?}: contains a NUL byte")]
    InvalidName(String),

    /// Shader loading or compilation error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

/// Converts configured names into owned C strings.
pub fn to_cstrings(names: &[String]) -> RhiResult<Vec<std::ffi::CString>> {
    names
        .iter()
        .map(|name| {
            std::ffi::CString::new(name.as_str()).map_err(|_| RhiError::InvalidName(name.clone()))
        })
        .collect()
}
