//! Vulkan instance management.
//!
//! This module handles VkInstance creation, validation layers, and the debug messenger.
//!
//! # Overview
//!
//! The [`Instance`] struct owns the Vulkan entry point, the instance, and (when
//! validation is enabled) the debug utils messenger. It also owns the exact
//! extension and layer names it was created with, so they live as long as the
//! instance itself.
//!
//! # Example
//!
//! ```no_run
//! use trigon_rhi::instance::{Instance, InstanceDesc};
//!
//! let layers = vec!["VK_LAYER_KHRONOS_validation".to_string()];
//! let instance = Instance::new(&InstanceDesc {
//!     application_name: "Hello Triangle",
//!     surface_extensions: &[],
//!     validation_layers: Some(&layers),
//! })
//! .expect("Failed to create Vulkan instance");
//!
//! assert!(instance.has_validation());
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::{RhiError, RhiResult, to_cstrings};

/// Parameters for [`Instance::new`].
#[derive(Clone, Copy, Debug)]
pub struct InstanceDesc<'a> {
    /// Application name reported to the driver.
    pub application_name: &'a str,
    /// Extensions the window system needs to create a surface.
    pub surface_extensions: &'a [&'static CStr],
    /// Layers to enable. `Some` also enables the debug messenger.
    pub validation_layers: Option<&'a [String]>,
}

/// Vulkan instance wrapper with optional validation layer support.
///
/// This struct manages the lifetime of the Vulkan instance and its associated
/// debug utilities. When dropped, it destroys the messenger and then the instance.
pub struct Instance {
    /// Vulkan entry point loader
    entry: Entry,
    /// Vulkan instance handle
    instance: ash::Instance,
    /// Debug utils extension loader (only present when validation is enabled)
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger handle (only present when validation is enabled)
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Instance extensions the instance was created with
    extensions: Vec<CString>,
    /// Instance layers the instance was created with
    layers: Vec<CString>,
}

impl Instance {
    /// Creates a new Vulkan instance.
    ///
    /// # Arguments
    ///
    /// * `desc` - Application name, surface extensions and validation layers
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Vulkan library cannot be loaded
    /// - A requested validation layer is not installed ([`RhiError::MissingLayer`])
    /// - Instance creation fails
    /// - Debug messenger setup fails (when validation is enabled)
    pub fn new(desc: &InstanceDesc<'_>) -> RhiResult<Self> {
        // Load the Vulkan library
        let entry = unsafe { Entry::load()? };

        log_available_extensions(&entry);
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        debug!("{} instance layer(s) available", available_layers.len());
        for layer in &available_layers {
            debug!(
                "  {:?} (spec {}.{}.{})",
                layer.layer_name_as_c_str().unwrap_or(c"<invalid>"),
                vk::api_version_major(layer.spec_version),
                vk::api_version_minor(layer.spec_version),
                vk::api_version_patch(layer.spec_version)
            );
        }

        let layers = match desc.validation_layers {
            Some(names) => {
                let layers = to_cstrings(names)?;
                if let Some(missing) = find_missing_layer(&available_layers, &layers) {
                    warn!("Validation layer {:?} is not installed", missing);
                    return Err(RhiError::MissingLayer(missing.to_string_lossy().into_owned()));
                }
                layers
            }
            None => Vec::new(),
        };
        let validation = desc.validation_layers.is_some();

        let mut extensions: Vec<CString> = desc
            .surface_extensions
            .iter()
            .map(|&name| name.to_owned())
            .collect();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.to_owned());
        }

        let application_name = CString::new(desc.application_name)
            .map_err(|_| RhiError::InvalidName(desc.application_name.to_string()))?;

        let app_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_names: Vec<*const c_char> =
            extensions.iter().map(|name| name.as_ptr()).collect();
        let layer_names: Vec<*const c_char> = layers.iter().map(|name| name.as_ptr()).collect();

        // Chained so instance creation and destruction are reported too
        let mut messenger_info = debug_messenger_create_info();

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extension_names)
            .enabled_layer_names(&layer_names);
        if validation {
            create_info = create_info.push_next(&mut messenger_info);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        info!(
            "Vulkan instance created for '{}' with {} extension(s), {} layer(s)",
            desc.application_name,
            extensions.len(),
            layers.len()
        );
        for name in &extensions {
            debug!("Instance extension: {:?}", name);
        }

        let (debug_utils, debug_messenger) = if validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            let messenger = match unsafe {
                debug_utils.create_debug_utils_messenger(&debug_messenger_create_info(), None)
            } {
                Ok(messenger) => messenger,
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            };
            info!("Validation layers enabled, debug messenger created");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
            extensions,
            layers,
        })
    }

    /// Returns the Vulkan instance handle.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the Vulkan entry point loader.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns whether validation layers are enabled.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    /// Returns the layers the instance was created with.
    ///
    /// Logical devices enable the same list for compatibility with older drivers.
    #[inline]
    pub fn layers(&self) -> &[CString] {
        &self.layers
    }

    /// Returns the extensions the instance was created with.
    #[inline]
    pub fn extensions(&self) -> &[CString] {
        &self.extensions
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            // Destroy debug messenger before instance
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
                debug!("Debug messenger destroyed");
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Lists the instance extensions the loader offers. Diagnostics only.
fn log_available_extensions(entry: &Entry) {
    match unsafe { entry.enumerate_instance_extension_properties(None) } {
        Ok(available) => {
            debug!("{} instance extension(s) available", available.len());
            for extension in &available {
                debug!(
                    "  {:?} (revision {})",
                    extension.extension_name_as_c_str().unwrap_or(c"<invalid>"),
                    extension.spec_version
                );
            }
        }
        Err(e) => warn!("Failed to enumerate instance extensions: {:?}", e),
    }
}

/// First layer in `wanted` that is not among the `available` ones.
fn find_missing_layer<'a>(
    available: &[vk::LayerProperties],
    wanted: &'a [CString],
) -> Option<&'a CString> {
    wanted.iter().find(|wanted| {
        !available.iter().any(|layer| {
            layer
                .layer_name_as_c_str()
                .is_ok_and(|name| name == wanted.as_c_str())
        })
    })
}

/// Debug messenger configuration shared by instance creation and the persistent messenger.
fn debug_messenger_create_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
}

/// Debug callback function for validation layer messages.
///
/// Messages are forwarded to `tracing` at the level matching their severity.
///
/// # Safety
///
/// This function is called by the Vulkan loader and must follow the
/// Vulkan specification for debug callbacks.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let type_str = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            error!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            warn!("[Vulkan {}] {}", type_str, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            debug!("[Vulkan {}] {}", type_str, message);
        }
        _ => {
            trace!("[Vulkan {}] {}", type_str, message);
        }
    }

    // Never abort the call that triggered the message
    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer(name: &CStr) -> vk::LayerProperties {
        vk::LayerProperties::default().layer_name(name).unwrap()
    }

    #[test]
    fn test_find_missing_layer() {
        let available = [layer(c"VK_LAYER_KHRONOS_validation"), layer(c"VK_LAYER_MESA_overlay")];

        let installed = [CString::from(c"VK_LAYER_KHRONOS_validation")];
        assert_eq!(find_missing_layer(&available, &installed), None);

        let wanted = [
            CString::from(c"VK_LAYER_MESA_overlay"),
            CString::from(c"VK_LAYER_LUNARG_api_dump"),
        ];
        assert_eq!(
            find_missing_layer(&available, &wanted),
            Some(&wanted[1])
        );
        assert_eq!(find_missing_layer(&[], &wanted), Some(&wanted[0]));
    }

    fn headless(validation_layers: Option<&[String]>) -> RhiResult<Instance> {
        Instance::new(&InstanceDesc {
            application_name: "trigon tests",
            surface_extensions: &[],
            validation_layers,
        })
    }

    #[test]
    fn test_instance_creation_without_validation() {
        // This test requires a Vulkan loader to be installed
        match headless(None) {
            Ok(instance) => {
                assert!(!instance.has_validation());
                assert!(instance.layers().is_empty());
                assert!(instance.extensions().is_empty());
            }
            Err(RhiError::LoadingError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Err(RhiError::VulkanError(e)) => {
                eprintln!("Skipping test: no usable Vulkan driver ({})", e);
            }
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_missing_layer_is_fatal() {
        let layers = vec!["VK_LAYER_TRIGON_does_not_exist".to_string()];
        match headless(Some(&layers)) {
            Err(RhiError::MissingLayer(name)) => {
                assert_eq!(name, "VK_LAYER_TRIGON_does_not_exist");
            }
            Err(RhiError::LoadingError(_)) | Err(RhiError::VulkanError(_)) => {
                eprintln!("Skipping test: Vulkan not available");
            }
            Ok(_) => panic!("instance created with a layer that does not exist"),
            Err(e) => panic!("Unexpected error: {:?}", e),
        }
    }

    #[test]
    fn test_debug_messenger_reports_verbose_warning_error() {
        let info = debug_messenger_create_info();
        assert!(
            info.message_severity
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE)
        );
        assert!(
            info.message_severity
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING)
        );
        assert!(
            info.message_severity
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR)
        );
        assert!(
            !info
                .message_severity
                .contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO)
        );
        assert!(info.pfn_user_callback.is_some());
    }
}
