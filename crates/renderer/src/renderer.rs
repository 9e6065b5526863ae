//! The renderer the host loop drives.

use ash::vk;
use tracing::info;

use trigon_core::RendererConfig;
use trigon_platform::Window;

use crate::cycle::{FrameReport, SubmissionCycle};
use crate::error::RenderError;
use crate::provision::ProvisionedResources;
use crate::recorder::CommandRecorder;
use crate::vulkan::VulkanFrameBackend;

/// Draws a triangle into the window every frame.
///
/// # Resource Destruction Order
///
/// Dropping the renderer waits, at most the fence timeout, for the device to
/// go idle, destroys the frame slots, then releases the pipeline, pipeline
/// layout, framebuffers, render pass, command pool, swapchain, logical device,
/// surface, debug messenger and instance, in that order. If the device does
/// not go idle in time, all of them are leaked instead.
pub struct Renderer {
    cycle: SubmissionCycle<VulkanFrameBackend>,
    extent: vk::Extent2D,
}

impl Renderer {
    /// Build every Vulkan resource for `window` and the frame slots on top.
    ///
    /// # Errors
    ///
    /// Any setup failure is returned as a fatal [`RenderError`].
    pub fn new(window: &Window, config: &RendererConfig) -> Result<Self, RenderError> {
        let resources = ProvisionedResources::new(window, config)?;
        let extent = resources.swapchain().extent();

        let backend =
            VulkanFrameBackend::new(resources, config.frames_in_flight, config.fence_timeout)?;
        let cycle = SubmissionCycle::new(
            backend,
            CommandRecorder::new(config.clear_color),
            config.fence_timeout,
            config.acquire_timeout,
        );

        info!(
            "Renderer initialized: {}x{}, {} frames in flight",
            extent.width, extent.height, config.frames_in_flight
        );

        Ok(Self { cycle, extent })
    }

    /// Render and present one frame. See [`SubmissionCycle::render_frame`].
    pub fn render_frame(&mut self) -> Result<FrameReport, RenderError> {
        self.cycle.render_frame()
    }

    /// Wait, at most the fence timeout, until the GPU has finished every submitted frame.
    pub fn wait_idle(&self) -> Result<(), RenderError> {
        self.cycle.wait_idle()
    }

    /// Wait for the device to go idle and destroy the frame slots.
    ///
    /// The remaining resources are released when the renderer is dropped.
    pub fn shutdown(&mut self) -> Result<(), RenderError> {
        self.cycle.shutdown()
    }

    /// Swapchain extent every frame is drawn at.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.cycle.frames_submitted()
    }
}
