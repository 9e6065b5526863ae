//! Frame loop of trigon.
//!
//! This crate turns the provisioned Vulkan resources into frames:
//! - [`frame_ring`]: per-slot command buffer, semaphores and fence
//! - [`frame`]: the frame counter selecting the current slot
//! - [`cycle`]: wait, acquire, reset, record, submit, present, advance
//! - [`recorder`]: the triangle's command buffer contents
//! - [`provision`]: one-time setup of device, swapchain and pipeline
//!
//! [`Renderer`] ties them together for the host loop.

pub mod backend;
pub mod cycle;
pub mod error;
pub mod frame;
pub mod frame_ring;
pub mod provision;
pub mod recorder;
mod renderer;
pub mod vulkan;

#[cfg(test)]
mod testing;

pub use cycle::{FrameReport, SubmissionCycle};
pub use error::{ErrorKind, FrameStage, RenderError};
pub use renderer::Renderer;
