//! The device operations the submission cycle drives.
//!
//! [`SubmissionCycle`](crate::cycle::SubmissionCycle) only talks to the GPU
//! through [`FrameBackend`]. The Vulkan implementation lives in
//! [`crate::vulkan`]; tests use a simulated device.

use std::time::Duration;

use ash::vk;
use tracing::{error, warn};
use trigon_rhi::sync::FenceStatus;

use crate::recorder::CommandEncoder;

/// Result of a successful image acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcquiredImage {
    /// Index of the swapchain image. Valid until the matching present.
    pub image_index: u32,
    /// The swapchain no longer matches the surface exactly but can still be used.
    pub suboptimal: bool,
}

/// Everything the recorder needs to draw into one swapchain image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub pipeline: vk::Pipeline,
    pub extent: vk::Extent2D,
}

/// Proof that the device had no outstanding work.
///
/// Only [`FrameBackend::wait_idle`] hands these out, and destroying frame
/// slots or provisioned resources requires one.
#[derive(Debug)]
pub struct DeviceIdle {
    _private: (),
}

impl DeviceIdle {
    pub(crate) fn confirmed() -> Self {
        Self { _private: () }
    }
}

/// Per-frame device operations, addressed by frame slot.
///
/// Errors are raw Vulkan result codes; the cycle classifies them.
pub trait FrameBackend {
    type Encoder: CommandEncoder;

    /// Number of frame slots.
    fn slot_count(&self) -> usize;

    /// Number of swapchain images.
    fn image_count(&self) -> usize;

    /// Block until the slot's previous submission has completed or `timeout` expires.
    fn wait_for_slot(&self, slot: usize, timeout: Duration) -> Result<FenceStatus, vk::Result>;

    /// Acquire the next swapchain image, signaling the slot's image-acquired semaphore.
    fn acquire_image(&self, slot: usize, timeout: Duration) -> Result<AcquiredImage, vk::Result>;

    /// Reset the slot's fence and command buffer.
    ///
    /// Only called after [`wait_for_slot`](Self::wait_for_slot) reported the
    /// fence signaled.
    fn reset_slot(&self, slot: usize) -> Result<(), vk::Result>;

    /// The slot's command buffer, or `None` once the slots are destroyed.
    fn encoder(&self, slot: usize) -> Option<&Self::Encoder>;

    /// The render target for a swapchain image.
    fn render_target(&self, image_index: u32) -> Option<RenderTarget>;

    /// Submit the slot's command buffer: wait on image-acquired, signal
    /// render-finished and the slot's fence.
    fn submit(&self, slot: usize) -> Result<(), vk::Result>;

    /// Present `image_index` once the slot's render-finished semaphore signals.
    ///
    /// Returns true if the swapchain is suboptimal.
    fn present(&self, slot: usize, image_index: u32) -> Result<bool, vk::Result>;

    /// Wait until the device has no outstanding work.
    ///
    /// Every submission is tracked by a slot fence, so the wait is bounded by
    /// `timeout`. Returns `TIMEOUT` if submitted work is still running when it
    /// expires.
    fn wait_idle(&self, timeout: Duration) -> Result<DeviceIdle, vk::Result>;

    /// Destroy the frame slots. Idempotent.
    fn destroy_slots(&mut self, idle: &DeviceIdle);

    /// Destroy the resources the slots draw with, down to the device itself.
    /// Destroys the slots first if they are still alive. Idempotent.
    fn destroy_resources(&mut self, idle: &DeviceIdle);

    /// Leak every object still alive, so nothing the device may be using
    /// is destroyed.
    fn abandon(&mut self);
}

/// How [`teardown`] ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Teardown {
    /// Slots and resources were destroyed.
    Released,
    /// The device never confirmed it was idle; everything still alive was leaked.
    Leaked,
}

/// Release everything `backend` owns once the device is idle.
///
/// A lost device has no outstanding work left, so it is treated as idle. Any
/// other failure of the idle wait, including a timeout, leaks the slots and
/// the resources instead of destroying them under the GPU.
pub(crate) fn teardown<B: FrameBackend + ?Sized>(backend: &mut B, timeout: Duration) -> Teardown {
    let idle = match backend.wait_idle(timeout) {
        Ok(idle) => idle,
        Err(vk::Result::ERROR_DEVICE_LOST) => {
            warn!("Device lost before teardown, destroying resources anyway");
            DeviceIdle::confirmed()
        }
        Err(e) => {
            error!(
                "Device did not go idle before teardown ({:?}), leaking frame slots and resources",
                e
            );
            backend.abandon();
            return Teardown::Leaked;
        }
    };

    backend.destroy_slots(&idle);
    backend.destroy_resources(&idle);
    Teardown::Released
}
