//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//!
//! Host waits are always bounded. [`Fence::wait`] takes a [`Duration`] and
//! reports an expired wait as [`FenceStatus::TimedOut`] instead of an error,
//! so the caller decides what a stalled GPU means.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use trigon_rhi::device::Device;
//! use trigon_rhi::sync::{Fence, FenceStatus, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), trigon_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device.clone(), true)?;
//!
//! if in_flight.wait(Duration::from_secs(2))? == FenceStatus::Signaled {
//!     in_flight.reset()?;
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Outcome of a bounded fence wait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FenceStatus {
    /// The fence was signaled within the timeout.
    Signaled,
    /// The timeout expired first.
    TimedOut,
}

/// Converts a host timeout to the nanosecond count Vulkan expects, saturating at `u64::MAX`.
#[inline]
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

/// Waits up to `timeout` for every fence in `fences` to become signaled.
///
/// An empty slice is trivially signaled.
///
/// # Errors
///
/// Returns the raw Vulkan error if the wait fails for any reason other than
/// the timeout (e.g. `ERROR_DEVICE_LOST`).
pub fn wait_all(
    device: &Device,
    fences: &[vk::Fence],
    timeout: Duration,
) -> Result<FenceStatus, vk::Result> {
    if fences.is_empty() {
        return Ok(FenceStatus::Signaled);
    }

    let result = unsafe {
        device
            .handle()
            .wait_for_fences(fences, true, timeout_nanos(timeout))
    };

    match result {
        Ok(()) => Ok(FenceStatus::Signaled),
        Err(vk::Result::TIMEOUT) => Ok(FenceStatus::TimedOut),
        Err(e) => Err(e),
    }
}

/// Vulkan semaphore wrapper.
///
/// Used for the image-acquired and render-finished signals of a frame slot.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// A frame slot's fence is signaled by the queue when the slot's submission
/// completes and is waited on before the slot is reused.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, creates the fence in the signaled state so the
    ///   first wait returns immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits up to `timeout` for the fence to become signaled.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan error if the wait fails for any reason other
    /// than the timeout (e.g. `ERROR_DEVICE_LOST`).
    pub fn wait(&self, timeout: Duration) -> Result<FenceStatus, vk::Result> {
        wait_all(&self.device, &[self.fence], timeout)
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any pending queue submission.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan error if the reset fails.
    pub fn reset(&self) -> Result<(), vk::Result> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

// Safety: Semaphore and Fence are Send+Sync because:
// - Arc<Device> is Send+Sync
// - vk::Semaphore and vk::Fence are Copy handles
unsafe impl Send for Semaphore {}
unsafe impl Sync for Semaphore {}
unsafe impl Send for Fence {}
unsafe impl Sync for Fence {}
