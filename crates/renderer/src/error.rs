//! Renderer error types.
//!
//! Every failure of the frame loop is a [`RenderError`]. Callers decide what to
//! do with it through [`RenderError::kind`]: fatal errors end the process,
//! recoverable ones skip the frame, and an unresponsive device means a bounded
//! wait expired.

use std::fmt;
use std::time::Duration;

use ash::vk;
use thiserror::Error;
use trigon_rhi::RhiError;

/// Step of the submission cycle an error was raised in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FrameStage {
    /// Waiting for the frame slot's fence.
    Wait,
    /// Resetting the slot's fence and command buffer.
    Reset,
    /// Acquiring the next swapchain image.
    Acquire,
    /// Recording the slot's command buffer.
    Record,
    /// Submitting to the graphics queue.
    Submit,
    /// Queueing the image for presentation.
    Present,
    /// Waiting for the device to go idle before teardown.
    Teardown,
}

impl FrameStage {
    pub fn name(self) -> &'static str {
        match self {
            FrameStage::Wait => "wait",
            FrameStage::Reset => "reset",
            FrameStage::Acquire => "acquire",
            FrameStage::Record => "record",
            FrameStage::Submit => "submit",
            FrameStage::Present => "present",
            FrameStage::Teardown => "teardown",
        }
    }
}

impl fmt::Display for FrameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a caller should react to a [`RenderError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// The renderer cannot continue.
    Fatal,
    /// The frame was skipped; the swapchain would need to be rebuilt to recover fully.
    Recoverable,
    /// A bounded wait on the device expired.
    Unresponsive,
}

/// Error type of the renderer crate.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Building the Vulkan resources failed
    #[error("Renderer setup failed: {0}")]
    Setup(#[from] RhiError),

    /// Window-system failure during setup
    #[error("Platform error: {0}")]
    Platform(#[from] trigon_core::Error),

    /// Creating the synchronization objects or command buffer of a slot failed
    #[error("Failed to create frame slot {slot}: {source}")]
    SlotCreation {
        slot: usize,
        #[source]
        source: RhiError,
    },

    /// Beginning or ending the command buffer failed
    #[error("Command recording failed: {0}")]
    Recording(#[source] RhiError),

    /// The swapchain handed out an index with no framebuffer behind it
    #[error("Swapchain returned image index {index}, but only {count} images exist")]
    InvalidImage { index: u32, count: usize },

    #[error("Device lost during {stage}")]
    DeviceLost { stage: FrameStage },

    /// Any other Vulkan error code
    #[error("Vulkan error during {stage}: {result}")]
    Vulkan { stage: FrameStage, result: vk::Result },

    /// The cycle was torn down and cannot render any more frames
    #[error("Renderer has been shut down")]
    Shutdown,

    /// An earlier frame failed fatally; no further frames are attempted
    #[error("Renderer halted after a fatal frame error")]
    Halted,

    #[error("Swapchain out of date during {stage}")]
    OutOfDate { stage: FrameStage },

    #[error("Surface lost during {stage}")]
    SurfaceLost { stage: FrameStage },

    /// A fence wait or image acquisition did not finish within its timeout
    #[error("Device unresponsive: {stage} did not complete within {timeout:?}")]
    DeviceUnresponsive { stage: FrameStage, timeout: Duration },
}

impl RenderError {
    /// Classifies a Vulkan result code raised at `stage`.
    ///
    /// `TIMEOUT` and `NOT_READY` are not special-cased here: only the caller
    /// knows which timeout was exceeded.
    pub fn from_vk(stage: FrameStage, result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => RenderError::OutOfDate { stage },
            vk::Result::ERROR_SURFACE_LOST_KHR => RenderError::SurfaceLost { stage },
            vk::Result::ERROR_DEVICE_LOST => RenderError::DeviceLost { stage },
            result => RenderError::Vulkan { stage, result },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RenderError::OutOfDate { .. } | RenderError::SurfaceLost { .. } => {
                ErrorKind::Recoverable
            }
            RenderError::DeviceUnresponsive { .. } => ErrorKind::Unresponsive,
            RenderError::Setup(_)
            | RenderError::Platform(_)
            | RenderError::SlotCreation { .. }
            | RenderError::Recording(_)
            | RenderError::InvalidImage { .. }
            | RenderError::DeviceLost { .. }
            | RenderError::Vulkan { .. }
            | RenderError::Shutdown
            | RenderError::Halted => ErrorKind::Fatal,
        }
    }

    /// Returns true if the frame can be skipped and the loop continued.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        self.kind() == ErrorKind::Recoverable
    }

    /// The cycle step the error was raised in, if it came from the frame loop.
    pub fn stage(&self) -> Option<FrameStage> {
        match self {
            RenderError::DeviceLost { stage }
            | RenderError::Vulkan { stage, .. }
            | RenderError::OutOfDate { stage }
            | RenderError::SurfaceLost { stage }
            | RenderError::DeviceUnresponsive { stage, .. } => Some(*stage),
            RenderError::Recording(_) | RenderError::InvalidImage { .. } => {
                Some(FrameStage::Record)
            }
            RenderError::Setup(_)
            | RenderError::Platform(_)
            | RenderError::SlotCreation { .. }
            | RenderError::Shutdown
            | RenderError::Halted => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swapchain_errors_are_recoverable() {
        for stage in [FrameStage::Acquire, FrameStage::Present] {
            let out_of_date = RenderError::from_vk(stage, vk::Result::ERROR_OUT_OF_DATE_KHR);
            assert!(matches!(out_of_date, RenderError::OutOfDate { stage: s } if s == stage));
            assert!(out_of_date.is_recoverable());

            let surface_lost = RenderError::from_vk(stage, vk::Result::ERROR_SURFACE_LOST_KHR);
            assert!(matches!(surface_lost, RenderError::SurfaceLost { .. }));
            assert_eq!(surface_lost.kind(), ErrorKind::Recoverable);
        }
    }

    #[test]
    fn test_device_lost_is_fatal() {
        let err = RenderError::from_vk(FrameStage::Submit, vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(
            err,
            RenderError::DeviceLost {
                stage: FrameStage::Submit
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_other_results_are_fatal() {
        let err = RenderError::from_vk(FrameStage::Wait, vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(matches!(
            err,
            RenderError::Vulkan {
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.stage(), Some(FrameStage::Wait));
    }

    #[test]
    fn test_unresponsive_kind() {
        let err = RenderError::DeviceUnresponsive {
            stage: FrameStage::Wait,
            timeout: Duration::from_secs(2),
        };
        assert_eq!(err.kind(), ErrorKind::Unresponsive);
        assert_eq!(
            err.to_string(),
            "Device unresponsive: wait did not complete within 2s"
        );
    }

    #[test]
    fn test_setup_errors_are_fatal() {
        let err: RenderError = RhiError::NoSuitableGpu.into();
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert_eq!(err.stage(), None);

        let err = RenderError::SlotCreation {
            slot: 1,
            source: RhiError::VulkanError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
        };
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.to_string().starts_with("Failed to create frame slot 1"));
    }

    #[test]
    fn test_halted_is_fatal() {
        assert_eq!(RenderError::Halted.kind(), ErrorKind::Fatal);
        assert_eq!(RenderError::Halted.stage(), None);
    }

    #[test]
    fn test_stage_display() {
        assert_eq!(FrameStage::Acquire.to_string(), "acquire");
        assert_eq!(FrameStage::Teardown.to_string(), "teardown");
    }
}
