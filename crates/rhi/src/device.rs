//! Vulkan logical device and queue management.
//!
//! # Overview
//!
//! The [`Device`] struct owns the Vulkan logical device together with the two
//! queues the renderer submits to:
//! - the graphics queue, which executes recorded command buffers
//! - the presentation queue, which hands finished images to the surface
//!
//! Both may be the same hardware queue. Every other RHI object keeps an
//! `Arc<Device>`, so the device is destroyed only after all of them.
//!
//! # Example
//!
//! ```no_run
//! use std::ffi::CString;
//! use trigon_rhi::instance::{Instance, InstanceDesc};
//! use trigon_rhi::physical_device::select_physical_device;
//! use trigon_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new(&InstanceDesc {
//!     application_name: "example",
//!     surface_extensions: &[],
//!     validation_layers: None,
//! })
//! .expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let extensions = vec![CString::from(ash::khr::swapchain::NAME)];
//!
//! let physical_device_info =
//!     select_physical_device(instance.handle(), surface, &surface_loader, &extensions)
//!         .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info, extensions)
//!     .expect("Failed to create logical device");
//!
//! let graphics_queue = device.graphics_queue();
//! let present_queue = device.present_queue();
//! ```

use std::ffi::{CString, c_char};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices};

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared across the renderer through `Arc`. Queue
/// submission is externally synchronized by the single render thread.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Graphics queue handle.
    graphics_queue: vk::Queue,
    /// Presentation queue handle (may equal the graphics queue).
    present_queue: vk::Queue,
    /// Queue family indices.
    queue_families: QueueFamilyIndices,
    /// Device extensions the device was created with.
    extensions: Vec<CString>,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// One queue is created for each unique queue family in
    /// `physical_device_info.queue_families`. No optional device features are enabled.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `physical_device_info` - The selected physical device
    /// * `extensions` - Device extensions to enable, kept for the device's lifetime
    ///
    /// # Errors
    ///
    /// Returns an error if the queue families are incomplete or device creation fails.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
        extensions: Vec<CString>,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (graphics_family, present_family) =
            queue_families.pair().ok_or(RhiError::NoSuitableGpu)?;

        // Create queue create infos for unique queue families
        let unique_families = queue_families.unique_families();
        let queue_priorities = [1.0f32];

        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
            })
            .collect();

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            unique_families
        );

        let features = vk::PhysicalDeviceFeatures::default();
        let extension_names: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();
        // Device layers are deprecated but older loaders still read them
        let layer_names: Vec<*const c_char> =
            instance.layers().iter().map(|layer| layer.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);
        #[allow(deprecated)]
        let create_info = create_info.enabled_layer_names(&layer_names);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with extension(s) {:?}",
            extensions
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        debug!("Graphics queue retrieved from family {}", graphics_family);

        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!("Present queue retrieved from family {}", present_family);

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            graphics_queue,
            present_queue,
            queue_families,
            extensions,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Returns the presentation queue handle.
    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Returns the queue family indices.
    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Returns the device extensions the device was created with.
    #[inline]
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }

    /// Waits for the device to become idle.
    ///
    /// Blocks until all outstanding operations on all queues have completed.
    ///
    /// # Errors
    ///
    /// Returns the raw Vulkan error (typically `ERROR_DEVICE_LOST`) if the wait fails.
    pub fn wait_idle(&self) -> Result<(), vk::Result> {
        unsafe { self.device.device_wait_idle() }
    }

    /// Submits work to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are fully recorded
    /// - Every semaphore and the fence are valid and not in use by another pending submission
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo<'_>],
        fence: vk::Fence,
    ) -> Result<(), vk::Result> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            // Wait for all operations to complete before cleanup
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device is Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy handles
// - QueueFamilyIndices and the extension names are plain data
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_is_send_sync() {
        // Compile-time check that Device is Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
