//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides owned wrappers over the Vulkan objects trigon creates
//! through `ash`. It handles:
//! - Instance creation, validation layers and the debug messenger
//! - Physical device selection and logical device creation
//! - Swapchain, render pass and framebuffer management
//! - Shader loading (SPIR-V files or WGSL compiled with naga)
//! - Graphics pipeline creation
//! - Command buffers and synchronization primitives
//!
//! Every wrapper destroys its Vulkan object on drop. Objects that depend on the
//! logical device hold an `Arc<Device>`, so the device outlives them.

mod error;

pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;

pub use error::{RhiError, RhiResult, to_cstrings};

// Re-export ash types that users might need
pub use ash::vk;
