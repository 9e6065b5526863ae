//! The per-frame submission cycle.
//!
//! One call to [`SubmissionCycle::render_frame`] runs:
//!
//! 1. **Wait** for the current slot's fence, bounded by the fence timeout
//! 2. **Acquire** the next swapchain image, signaling the slot's image-acquired semaphore
//! 3. **Reset** the slot's fence and command buffer
//! 4. **Record** the triangle into the slot's command buffer
//! 5. **Submit** on the graphics queue, waiting on image-acquired at
//!    `COLOR_ATTACHMENT_OUTPUT` and signaling render-finished and the fence
//! 6. **Present**, gated on render-finished
//! 7. **Advance** the frame counter
//!
//! The fence is reset only once an image is in hand. A failed acquire leaves
//! the fence signaled, so the next attempt at the same slot does not block on
//! work that was never submitted. A fatal error halts the cycle: the slot may
//! hold a reset fence nothing will ever signal, so no further frame is tried.

use std::time::Duration;

use ash::vk;
use tracing::{debug, error, info, trace, warn};
use trigon_rhi::sync::FenceStatus;

use crate::backend::{DeviceIdle, FrameBackend};
use crate::error::{ErrorKind, FrameStage, RenderError};
use crate::frame::FrameCounter;
use crate::recorder::CommandRecorder;

/// Outcome of one successful frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number, starting at 0.
    pub frame: u64,
    /// Frame slot the frame used.
    pub slot: usize,
    /// Swapchain image the frame was drawn into.
    pub image_index: u32,
    /// Acquire or present reported the swapchain as suboptimal.
    pub suboptimal: bool,
}

/// Drives frames through a [`FrameBackend`].
pub struct SubmissionCycle<B: FrameBackend> {
    backend: B,
    counter: FrameCounter,
    recorder: CommandRecorder,
    fence_timeout: Duration,
    acquire_timeout: Duration,
    halted: bool,
    shut_down: bool,
}

impl<B: FrameBackend> SubmissionCycle<B> {
    pub fn new(
        backend: B,
        recorder: CommandRecorder,
        fence_timeout: Duration,
        acquire_timeout: Duration,
    ) -> Self {
        let counter = FrameCounter::new(backend.slot_count());
        debug!(
            "Submission cycle ready: {} slots, {} swapchain images",
            counter.slot_count(),
            backend.image_count()
        );

        Self {
            backend,
            counter,
            recorder,
            fence_timeout,
            acquire_timeout,
            halted: false,
            shut_down: false,
        }
    }

    /// Render and present one frame.
    ///
    /// # Errors
    ///
    /// - [`RenderError::Shutdown`] after [`shutdown`](Self::shutdown)
    /// - [`RenderError::Halted`] once any earlier frame failed fatally
    /// - [`RenderError::DeviceUnresponsive`] if the fence wait or the acquire times out
    /// - [`RenderError::OutOfDate`] / [`RenderError::SurfaceLost`] (recoverable) from
    ///   acquire or present
    /// - [`RenderError::InvalidImage`] if the acquired index has no framebuffer
    /// - [`RenderError::Recording`] if the command buffer cannot be begun or ended
    /// - [`RenderError::DeviceLost`] / [`RenderError::Vulkan`] for anything else
    ///
    /// A failed acquire does not advance the frame counter, so the same slot is
    /// retried. Once the frame is submitted the counter advances even if the
    /// present fails.
    pub fn render_frame(&mut self) -> Result<FrameReport, RenderError> {
        if self.shut_down {
            return Err(RenderError::Shutdown);
        }
        if self.halted {
            return Err(RenderError::Halted);
        }

        let result = self.run_frame();
        if let Err(e) = &result {
            if e.kind() == ErrorKind::Fatal {
                error!("Frame {} failed, halting: {}", self.counter.frame(), e);
                self.halted = true;
            }
        }
        result
    }

    fn run_frame(&mut self) -> Result<FrameReport, RenderError> {
        let slot = self.counter.slot();
        let frame = self.counter.frame();

        match self
            .backend
            .wait_for_slot(slot, self.fence_timeout)
            .map_err(|result| RenderError::from_vk(FrameStage::Wait, result))?
        {
            FenceStatus::Signaled => {}
            FenceStatus::TimedOut => {
                return Err(RenderError::DeviceUnresponsive {
                    stage: FrameStage::Wait,
                    timeout: self.fence_timeout,
                });
            }
        }

        let acquired = match self.backend.acquire_image(slot, self.acquire_timeout) {
            Ok(acquired) => acquired,
            Err(vk::Result::TIMEOUT | vk::Result::NOT_READY) => {
                return Err(RenderError::DeviceUnresponsive {
                    stage: FrameStage::Acquire,
                    timeout: self.acquire_timeout,
                });
            }
            Err(result) => return Err(RenderError::from_vk(FrameStage::Acquire, result)),
        };

        self.backend
            .reset_slot(slot)
            .map_err(|result| RenderError::from_vk(FrameStage::Reset, result))?;

        let target = self.backend.render_target(acquired.image_index).ok_or(
            RenderError::InvalidImage {
                index: acquired.image_index,
                count: self.backend.image_count(),
            },
        )?;
        let encoder = self.backend.encoder(slot).ok_or(RenderError::Shutdown)?;
        self.recorder
            .record(encoder, &target)
            .map_err(RenderError::Recording)?;

        self.backend
            .submit(slot)
            .map_err(|result| RenderError::from_vk(FrameStage::Submit, result))?;

        let presented = self.backend.present(slot, acquired.image_index);
        self.counter.advance();

        let present_suboptimal =
            presented.map_err(|result| RenderError::from_vk(FrameStage::Present, result))?;
        let suboptimal = acquired.suboptimal || present_suboptimal;
        if suboptimal {
            warn!("Frame {}: swapchain is suboptimal for the surface", frame);
        }

        trace!(
            "Frame {} presented (slot {}, image {})",
            frame, slot, acquired.image_index
        );

        Ok(FrameReport {
            frame,
            slot,
            image_index: acquired.image_index,
            suboptimal,
        })
    }

    /// Wait until the device has finished all submitted work.
    ///
    /// # Errors
    ///
    /// [`RenderError::DeviceUnresponsive`] if the work does not finish within
    /// the fence timeout, otherwise the classified error of the wait.
    pub fn wait_idle(&self) -> Result<(), RenderError> {
        self.idle().map(|_| ())
    }

    /// Wait for the device to go idle, then destroy the frame slots.
    ///
    /// Calling it again is a no-op. Afterwards every [`render_frame`](Self::render_frame)
    /// returns [`RenderError::Shutdown`].
    ///
    /// # Errors
    ///
    /// If the idle wait fails or times out, nothing is destroyed and the error
    /// is returned.
    pub fn shutdown(&mut self) -> Result<(), RenderError> {
        if self.shut_down {
            return Ok(());
        }

        let idle = self.idle()?;
        self.backend.destroy_slots(&idle);
        self.shut_down = true;

        info!("Submission cycle shut down after {} frames", self.counter.frame());
        Ok(())
    }

    fn idle(&self) -> Result<DeviceIdle, RenderError> {
        match self.backend.wait_idle(self.fence_timeout) {
            Ok(idle) => Ok(idle),
            Err(vk::Result::TIMEOUT) => Err(RenderError::DeviceUnresponsive {
                stage: FrameStage::Teardown,
                timeout: self.fence_timeout,
            }),
            Err(result) => Err(RenderError::from_vk(FrameStage::Teardown, result)),
        }
    }

    /// Number of frames submitted so far.
    #[inline]
    pub fn frames_submitted(&self) -> u64 {
        self.counter.frame()
    }

    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[inline]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, RecordedCommand, SimulatedDevice};

    fn cycle(device: SimulatedDevice) -> SubmissionCycle<SimulatedDevice> {
        SubmissionCycle::new(
            device,
            CommandRecorder::default(),
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
    }

    #[test]
    fn test_slots_alternate() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));

        let slots: Vec<usize> = (0..5)
            .map(|_| cycle.render_frame().unwrap().slot)
            .collect();

        assert_eq!(slots, vec![0, 1, 0, 1, 0]);
        assert_eq!(cycle.backend().submitted_slots(), vec![0, 1, 0, 1, 0]);
        assert_eq!(cycle.frames_submitted(), 5);
        assert!(cycle.backend().violations().is_empty());
    }

    #[test]
    fn test_frame_report() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));

        let first = cycle.render_frame().unwrap();
        let second = cycle.render_frame().unwrap();

        assert_eq!(
            first,
            FrameReport {
                frame: 0,
                slot: 0,
                image_index: 0,
                suboptimal: false
            }
        );
        assert_eq!(second.frame, 1);
        assert_eq!(second.image_index, 1);
    }

    #[test]
    fn test_wait_then_reset_then_record() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        for _ in 0..6 {
            cycle.render_frame().unwrap();
        }

        let events = cycle.backend().events();
        for slot in 0..2 {
            let per_slot: Vec<Event> = events
                .iter()
                .copied()
                .filter(|event| match event {
                    Event::Wait { slot: s }
                    | Event::Reset { slot: s }
                    | Event::Record { slot: s }
                    | Event::Submit { slot: s } => *s == slot,
                    _ => false,
                })
                .collect();

            for frame in per_slot.chunks(4) {
                assert_eq!(
                    frame,
                    [
                        Event::Wait { slot },
                        Event::Reset { slot },
                        Event::Record { slot },
                        Event::Submit { slot },
                    ]
                );
            }
        }
        assert!(cycle.backend().violations().is_empty());
    }

    #[test]
    fn test_slot_reused_only_after_retire() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        for _ in 0..8 {
            cycle.render_frame().unwrap();
        }

        let events = cycle.backend().events();
        let mut outstanding = [false; 2];
        for event in events {
            match event {
                Event::Submit { slot } => outstanding[slot] = true,
                Event::Retire { slot } => outstanding[slot] = false,
                Event::Reset { slot } | Event::Record { slot } => {
                    assert!(!outstanding[slot], "slot {} touched while in flight", slot);
                }
                _ => {}
            }
        }
        assert!(cycle.backend().max_in_flight() <= 2);
    }

    #[test]
    fn test_one_triangle_per_frame() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        for _ in 0..4 {
            cycle.render_frame().unwrap();
        }

        for slot in 0..2 {
            let recordings = cycle.backend().recorder(slot).recordings();
            assert_eq!(recordings.len(), 2);
            for recording in recordings {
                let draws: Vec<&RecordedCommand> = recording
                    .iter()
                    .filter(|c| matches!(c, RecordedCommand::Draw { .. }))
                    .collect();
                assert_eq!(
                    draws,
                    vec![&RecordedCommand::Draw {
                        vertex_count: 3,
                        instance_count: 1,
                        first_vertex: 0,
                        first_instance: 0,
                    }]
                );
                assert!(recording.contains(&RecordedCommand::SetScissor {
                    offset: (0, 0),
                    extent: (800, 600),
                }));
                assert!(recording.iter().any(|c| matches!(
                    c,
                    RecordedCommand::SetViewport { width, height, .. }
                        if *width == 800.0 && *height == 600.0
                )));
            }
        }
    }

    #[test]
    fn test_surface_lost_on_acquire_is_recoverable() {
        let device = SimulatedDevice::new(2, 3).fail_acquire(2, vk::Result::ERROR_SURFACE_LOST_KHR);
        let mut cycle = cycle(device);

        cycle.render_frame().unwrap();
        cycle.render_frame().unwrap();
        let err = cycle.render_frame().unwrap_err();

        assert!(matches!(
            err,
            RenderError::SurfaceLost {
                stage: FrameStage::Acquire
            }
        ));
        assert!(err.is_recoverable());
        assert_eq!(cycle.frames_submitted(), 2);

        let events = cycle.backend().events();
        let after_failure = &events[events
            .iter()
            .rposition(|e| matches!(e, Event::Acquire { .. }))
            .unwrap()..];
        assert_eq!(after_failure, [Event::Acquire { slot: 0 }]);

        // The same slot is retried without blocking.
        let report = cycle.render_frame().unwrap();
        assert_eq!(report.slot, 0);
        assert_eq!(report.frame, 2);
        assert!(cycle.backend().violations().is_empty());
    }

    #[test]
    fn test_out_of_date_present_is_returned() {
        let device = SimulatedDevice::new(2, 3).fail_present(1, vk::Result::ERROR_OUT_OF_DATE_KHR);
        let mut cycle = cycle(device);

        cycle.render_frame().unwrap();
        let err = cycle.render_frame().unwrap_err();

        assert!(matches!(
            err,
            RenderError::OutOfDate {
                stage: FrameStage::Present
            }
        ));
        assert!(err.is_recoverable());
        // The submission went through, so the frame still counts.
        assert_eq!(cycle.frames_submitted(), 2);
        assert_eq!(cycle.render_frame().unwrap().slot, 0);
    }

    #[test]
    fn test_device_lost_on_present_is_fatal() {
        let device = SimulatedDevice::new(2, 3).fail_present(0, vk::Result::ERROR_DEVICE_LOST);
        let mut cycle = cycle(device);

        let err = cycle.render_frame().unwrap_err();
        assert!(matches!(
            err,
            RenderError::DeviceLost {
                stage: FrameStage::Present
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }

    #[test]
    fn test_busy_device_is_unresponsive() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle.render_frame().unwrap();
        cycle.render_frame().unwrap();

        cycle.backend().set_busy(true);
        let err = cycle.render_frame().unwrap_err();

        assert!(matches!(
            err,
            RenderError::DeviceUnresponsive {
                stage: FrameStage::Wait,
                timeout,
            } if timeout == Duration::from_millis(100)
        ));
        assert_eq!(err.kind(), ErrorKind::Unresponsive);
        assert_eq!(cycle.frames_submitted(), 2);
        assert!(cycle.backend().violations().is_empty());
    }

    #[test]
    fn test_acquire_timeout_is_unresponsive() {
        let device = SimulatedDevice::new(2, 3).fail_acquire(0, vk::Result::TIMEOUT);
        let mut cycle = cycle(device);

        let err = cycle.render_frame().unwrap_err();
        assert!(matches!(
            err,
            RenderError::DeviceUnresponsive {
                stage: FrameStage::Acquire,
                ..
            }
        ));
        assert_eq!(cycle.frames_submitted(), 0);
    }

    #[test]
    fn test_invalid_image_index() {
        let device = SimulatedDevice::new(2, 3).acquire_returns(0, 7);
        let mut cycle = cycle(device);

        let err = cycle.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::InvalidImage { index: 7, count: 3 }));
        assert!(
            !cycle
                .backend()
                .events()
                .iter()
                .any(|e| matches!(e, Event::Record { .. } | Event::Submit { .. }))
        );
    }

    #[test]
    fn test_begin_failure_is_fatal() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle
            .backend()
            .recorder(0)
            .fail_next_begin(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        let err = cycle.render_frame().unwrap_err();
        assert!(matches!(err, RenderError::Recording(_)));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(cycle.backend().submitted_slots().is_empty());
    }

    #[test]
    fn test_fatal_error_halts_cycle() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle
            .backend()
            .recorder(0)
            .fail_next_begin(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);

        assert!(matches!(cycle.render_frame(), Err(RenderError::Recording(_))));
        assert!(cycle.is_halted());
        let events_before = cycle.backend().events().len();

        // Slot 0 now holds a reset fence with nothing submitted behind it.
        assert!(matches!(cycle.render_frame(), Err(RenderError::Halted)));
        assert_eq!(cycle.backend().events().len(), events_before);
        assert!(cycle.backend().violations().is_empty());

        cycle.shutdown().unwrap();
        assert!(cycle.backend().is_destroyed());
        assert!(cycle.backend().violations().is_empty());
    }

    #[test]
    fn test_recoverable_error_does_not_halt() {
        let device = SimulatedDevice::new(2, 3).fail_acquire(0, vk::Result::ERROR_OUT_OF_DATE_KHR);
        let mut cycle = cycle(device);

        assert!(cycle.render_frame().unwrap_err().is_recoverable());
        assert!(!cycle.is_halted());
        assert_eq!(cycle.render_frame().unwrap().frame, 0);
    }

    #[test]
    fn test_suboptimal_is_reported() {
        let device = SimulatedDevice::new(2, 3).suboptimal_acquire(1);
        let mut cycle = cycle(device);

        assert!(!cycle.render_frame().unwrap().suboptimal);
        assert!(cycle.render_frame().unwrap().suboptimal);
    }

    #[test]
    fn test_teardown_waits_for_idle() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle.render_frame().unwrap();
        cycle.render_frame().unwrap();

        cycle.backend().set_busy(true);
        let err = cycle.shutdown().unwrap_err();
        assert!(matches!(
            err,
            RenderError::DeviceUnresponsive {
                stage: FrameStage::Teardown,
                ..
            }
        ));
        assert!(!cycle.backend().is_destroyed());
        assert!(!cycle.backend().resources_destroyed());
        assert!(!cycle.is_shut_down());

        cycle.backend().set_busy(false);
        cycle.shutdown().unwrap();
        assert!(cycle.backend().is_destroyed());

        let events = cycle.backend().events();
        let idle = events.iter().position(|e| *e == Event::Idle).unwrap();
        let destroy = events.iter().position(|e| *e == Event::Destroy).unwrap();
        assert!(idle < destroy);
        assert!(
            !events[idle..]
                .iter()
                .any(|e| matches!(e, Event::Submit { .. }))
        );
        assert!(cycle.backend().violations().is_empty());
    }

    #[test]
    fn test_render_after_shutdown() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle.render_frame().unwrap();
        cycle.shutdown().unwrap();
        cycle.shutdown().unwrap();

        assert!(matches!(cycle.render_frame(), Err(RenderError::Shutdown)));
        let destroys = cycle
            .backend()
            .events()
            .iter()
            .filter(|e| **e == Event::Destroy)
            .count();
        assert_eq!(destroys, 1);
    }

    #[test]
    fn test_wait_idle_is_bounded() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle.render_frame().unwrap();

        cycle.backend().set_busy(true);
        assert_eq!(
            cycle.wait_idle().unwrap_err().kind(),
            ErrorKind::Unresponsive
        );
    }

    #[test]
    fn test_wait_idle_retires_everything() {
        let mut cycle = cycle(SimulatedDevice::new(2, 3));
        cycle.render_frame().unwrap();
        cycle.render_frame().unwrap();

        cycle.wait_idle().unwrap();

        let events = cycle.backend().events();
        assert_eq!(events.last(), Some(&Event::Idle));
        assert!(events.contains(&Event::Retire { slot: 0 }));
        assert!(events.contains(&Event::Retire { slot: 1 }));
    }
}
