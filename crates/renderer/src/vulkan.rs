//! [`FrameBackend`] on a real Vulkan device.

use std::time::Duration;

use ash::vk;
use tracing::debug;
use trigon_rhi::command::CommandBuffer;
use trigon_rhi::sync::{self, FenceStatus, timeout_nanos};

use crate::backend::{self, AcquiredImage, DeviceIdle, FrameBackend, RenderTarget};
use crate::error::RenderError;
use crate::frame_ring::{FrameRing, FrameSlot};
use crate::provision::ProvisionedResources;

/// Frame slots plus the provisioned resources they draw with.
///
/// Dropping the backend waits, bounded by the teardown timeout, for the
/// device to go idle and destroys the slots before any provisioned resource.
/// If the device never confirms it is idle, both are leaked.
pub struct VulkanFrameBackend {
    ring: Option<FrameRing>,
    resources: Option<ProvisionedResources>,
    teardown_timeout: Duration,
}

impl VulkanFrameBackend {
    /// Create `frames_in_flight` frame slots on top of `resources`.
    ///
    /// `teardown_timeout` bounds the idle wait when the backend is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotCreation`] if any slot cannot be created.
    pub fn new(
        resources: ProvisionedResources,
        frames_in_flight: usize,
        teardown_timeout: Duration,
    ) -> Result<Self, RenderError> {
        let ring = FrameRing::create(
            resources.device(),
            resources.command_pool(),
            frames_in_flight,
        )?;

        Ok(Self {
            ring: Some(ring),
            resources: Some(resources),
            teardown_timeout,
        })
    }

    /// Slot `index`, failing once the ring has been destroyed.
    fn slot(&self, index: usize) -> Result<&FrameSlot, vk::Result> {
        self.ring
            .as_ref()
            .and_then(|ring| ring.get(index))
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }

    fn provisioned(&self) -> Result<&ProvisionedResources, vk::Result> {
        self.resources
            .as_ref()
            .ok_or(vk::Result::ERROR_INITIALIZATION_FAILED)
    }
}

impl FrameBackend for VulkanFrameBackend {
    type Encoder = CommandBuffer;

    fn slot_count(&self) -> usize {
        self.ring.as_ref().map_or(0, FrameRing::len)
    }

    fn image_count(&self) -> usize {
        self.resources
            .as_ref()
            .map_or(0, |resources| resources.swapchain().image_count())
    }

    fn wait_for_slot(&self, slot: usize, timeout: Duration) -> Result<FenceStatus, vk::Result> {
        self.slot(slot)?.in_flight().wait(timeout)
    }

    fn acquire_image(&self, slot: usize, timeout: Duration) -> Result<AcquiredImage, vk::Result> {
        let semaphore = self.slot(slot)?.image_acquired().handle();
        let (image_index, suboptimal) = self
            .provisioned()?
            .swapchain()
            .acquire_next_image(semaphore, timeout_nanos(timeout))?;

        Ok(AcquiredImage {
            image_index,
            suboptimal,
        })
    }

    fn reset_slot(&self, slot: usize) -> Result<(), vk::Result> {
        let slot = self.slot(slot)?;
        slot.in_flight().reset()?;
        slot.set_submitted(false);
        slot.command_buffer().reset()
    }

    fn encoder(&self, slot: usize) -> Option<&Self::Encoder> {
        self.ring
            .as_ref()
            .and_then(|ring| ring.get(slot))
            .map(FrameSlot::command_buffer)
    }

    fn render_target(&self, image_index: u32) -> Option<RenderTarget> {
        let resources = self.resources.as_ref()?;
        let framebuffer = resources.framebuffers().get(image_index as usize)?;

        Some(RenderTarget {
            render_pass: resources.render_pass().handle(),
            framebuffer: framebuffer.handle(),
            pipeline: resources.pipeline().handle(),
            extent: framebuffer.extent(),
        })
    }

    fn submit(&self, slot: usize) -> Result<(), vk::Result> {
        let slot = self.slot(slot)?;
        let resources = self.provisioned()?;

        let wait_semaphores = [slot.image_acquired().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [slot.command_buffer().handle()];
        let signal_semaphores = [slot.render_finished().handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the command buffer was recorded this frame, and the fence was
        // reset after its previous submission retired.
        unsafe {
            resources
                .device()
                .submit_graphics(&[submit_info], slot.in_flight().handle())?;
        }
        slot.set_submitted(true);
        Ok(())
    }

    fn present(&self, slot: usize, image_index: u32) -> Result<bool, vk::Result> {
        let render_finished = self.slot(slot)?.render_finished().handle();
        let resources = self.provisioned()?;
        resources.swapchain().present(
            resources.device().present_queue(),
            image_index,
            render_finished,
        )
    }

    fn wait_idle(&self, timeout: Duration) -> Result<DeviceIdle, vk::Result> {
        let Some(resources) = self.resources.as_ref() else {
            return Ok(DeviceIdle::confirmed());
        };

        if let Some(ring) = &self.ring {
            let fences = ring.submitted_fences();
            if sync::wait_all(resources.device(), &fences, timeout)? == FenceStatus::TimedOut {
                return Err(vk::Result::TIMEOUT);
            }
        }

        // Every submission has retired; this only drains the present queue.
        resources.device().wait_idle()?;
        Ok(DeviceIdle::confirmed())
    }

    fn destroy_slots(&mut self, idle: &DeviceIdle) {
        if let Some(ring) = self.ring.take() {
            ring.destroy(idle);
        }
    }

    fn destroy_resources(&mut self, idle: &DeviceIdle) {
        self.destroy_slots(idle);
        if let Some(resources) = self.resources.take() {
            drop(resources);
            debug!("Provisioned resources destroyed");
        }
    }

    fn abandon(&mut self) {
        if let Some(ring) = self.ring.take() {
            std::mem::forget(ring);
        }
        if let Some(resources) = self.resources.take() {
            std::mem::forget(resources);
        }
    }
}

impl Drop for VulkanFrameBackend {
    fn drop(&mut self) {
        if self.ring.is_none() && self.resources.is_none() {
            return;
        }

        let timeout = self.teardown_timeout;
        let outcome = backend::teardown(self, timeout);
        debug!("Frame backend released: {:?}", outcome);
    }
}
