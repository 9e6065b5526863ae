//! Platform layer for trigon.
//!
//! This crate provides:
//! - Window creation via winit, sized and titled from [`trigon_core::WindowConfig`]
//! - The instance extensions a Vulkan surface needs on the current platform
//! - Vulkan surface creation from the window's raw handles

mod window;

pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::{ElementState, KeyEvent, WindowEvent};
pub use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
pub use winit::keyboard::{KeyCode, PhysicalKey};
