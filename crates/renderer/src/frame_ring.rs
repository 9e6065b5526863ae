//! Frame slot ring.
//!
//! Each frame in flight owns a [`FrameSlot`]: a command buffer, the
//! image-acquired and render-finished semaphores, and the fence the CPU waits
//! on before touching any of them again.

use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};
use trigon_rhi::command::{CommandBuffer, CommandPool};
use trigon_rhi::device::Device;
use trigon_rhi::sync::{Fence, Semaphore};

use crate::backend::DeviceIdle;
use crate::error::RenderError;

/// Resources of one frame in flight.
pub struct FrameSlot {
    command_buffer: CommandBuffer,
    /// Signaled by the swapchain when the acquired image is ready
    image_acquired: Semaphore,
    /// Signaled by the graphics queue when rendering is complete
    render_finished: Semaphore,
    /// Signaled when this slot's submission has completed
    in_flight: Fence,
    /// Set between a submit and the next reset. A reset fence with nothing
    /// submitted behind it never signals.
    submitted: Cell<bool>,
}

impl FrameSlot {
    fn new(device: &Arc<Device>, pool: &CommandPool) -> trigon_rhi::RhiResult<Self> {
        Ok(Self {
            command_buffer: CommandBuffer::new(device.clone(), pool)?,
            image_acquired: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            // Signaled so the first wait returns immediately.
            in_flight: Fence::new(device.clone(), true)?,
            submitted: Cell::new(false),
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_acquired(&self) -> &Semaphore {
        &self.image_acquired
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }

    /// Whether the fence tracks a submission (possibly already complete).
    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted.get()
    }

    #[inline]
    pub fn set_submitted(&self, submitted: bool) {
        self.submitted.set(submitted);
    }
}

/// Fixed set of frame slots, indexed by [`FrameCounter::slot`](crate::frame::FrameCounter::slot).
pub struct FrameRing {
    slots: Vec<FrameSlot>,
}

impl FrameRing {
    /// Create `count` slots, allocating their command buffers from `pool`.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotCreation`] for the first slot that fails.
    /// Slots created before it are released.
    pub fn create(
        device: &Arc<Device>,
        pool: &CommandPool,
        count: usize,
    ) -> Result<Self, RenderError> {
        let slots = (0..count)
            .map(|slot| {
                FrameSlot::new(device, pool)
                    .map_err(|source| RenderError::SlotCreation { slot, source })
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!("Created {} frame slots", slots.len());

        Ok(Self { slots })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn get(&self, slot: usize) -> Option<&FrameSlot> {
        self.slots.get(slot)
    }

    /// Fences of every slot with a submission behind it.
    pub fn submitted_fences(&self) -> Vec<vk::Fence> {
        self.slots
            .iter()
            .filter(|slot| slot.is_submitted())
            .map(|slot| slot.in_flight().handle())
            .collect()
    }

    /// Destroy every slot. Requires proof that the device is idle.
    pub fn destroy(self, _idle: &DeviceIdle) {
        let count = self.slots.len();
        drop(self.slots);
        debug!("Destroyed {} frame slots", count);
    }
}
