//! Core utilities shared by every trigon crate.
//!
//! This crate provides foundational types used across the renderer:
//! - Error types and result aliases
//! - Logging initialization
//! - Timer utilities
//! - The immutable startup configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    DEFAULT_FRAMES_IN_FLIGHT, RendererConfig, ShaderSource, ValidationConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::Timer;
