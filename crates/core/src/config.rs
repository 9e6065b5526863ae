//! Startup configuration.
//!
//! [`RendererConfig`] gathers every knob the renderer reads: window size,
//! validation layers, device extensions, frames in flight, wait timeouts and
//! the shader source. It is built once in `main`, validated, and then only
//! ever passed around by shared reference.
//!
//! # Environment overrides
//!
//! [`RendererConfig::from_env`] starts from the defaults and applies:
//!
//! | variable | field |
//! |---|---|
//! | `TRIGON_VALIDATION` | `validation.enabled` |
//! | `TRIGON_FRAMES_IN_FLIGHT` | `frames_in_flight` |
//! | `TRIGON_FENCE_TIMEOUT_MS` | `fence_timeout` |
//! | `TRIGON_ACQUIRE_TIMEOUT_MS` | `acquire_timeout` |
//! | `TRIGON_SHADER_DIR` | `shaders` |
//! | `TRIGON_RECOVERABLE_GRACE_MS` | `recoverable_grace` |
//!
//! # Example
//!
//! ```
//! use trigon_core::RendererConfig;
//!
//! let config = RendererConfig::default();
//! config.validate().expect("defaults are valid");
//! assert_eq!(config.frames_in_flight, 2);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Number of frame slots used unless configured otherwise.
pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

/// Largest accepted `frames_in_flight`.
const MAX_FRAMES_IN_FLIGHT: usize = 4;

const ENV_VALIDATION: &str = "TRIGON_VALIDATION";
const ENV_FRAMES_IN_FLIGHT: &str = "TRIGON_FRAMES_IN_FLIGHT";
const ENV_FENCE_TIMEOUT_MS: &str = "TRIGON_FENCE_TIMEOUT_MS";
const ENV_ACQUIRE_TIMEOUT_MS: &str = "TRIGON_ACQUIRE_TIMEOUT_MS";
const ENV_SHADER_DIR: &str = "TRIGON_SHADER_DIR";
const ENV_RECOVERABLE_GRACE_MS: &str = "TRIGON_RECOVERABLE_GRACE_MS";

/// Window creation parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowConfig {
    /// Initial inner width in physical pixels.
    pub width: u32,
    /// Initial inner height in physical pixels.
    pub height: u32,
    /// Window title.
    pub title: String,
    /// Whether the user may resize the window.
    ///
    /// The swapchain is never rebuilt, so this stays `false` by default.
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Vulkan window".to_string(),
            resizable: false,
        }
    }
}

/// Validation layer settings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationConfig {
    /// Enables the layers below and the debug messenger.
    pub enabled: bool,
    /// Instance layers to enable. Every one must be installed.
    pub layers: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(debug_assertions),
            layers: vec!["VK_LAYER_KHRONOS_validation".to_string()],
        }
    }
}

/// Where the triangle's shaders come from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum ShaderSource {
    /// The WGSL shader compiled into the binary, translated to SPIR-V at startup.
    #[default]
    EmbeddedWgsl,
    /// Precompiled `vert.spv` and `frag.spv` in the given directory.
    SpirvDir(PathBuf),
}

/// Immutable renderer configuration.
#[derive(Clone, Debug, PartialEq)]
pub struct RendererConfig {
    /// Application name reported to the Vulkan driver.
    pub application_name: String,
    /// Window parameters.
    pub window: WindowConfig,
    /// Validation layer parameters.
    pub validation: ValidationConfig,
    /// Device extensions every candidate GPU must support.
    pub device_extensions: Vec<String>,
    /// Number of frame slots (frames the CPU may run ahead of the GPU).
    pub frames_in_flight: usize,
    /// Upper bound on waiting for a frame slot's fence.
    pub fence_timeout: Duration,
    /// Upper bound on waiting for a presentable image.
    pub acquire_timeout: Duration,
    /// Shader source.
    pub shaders: ShaderSource,
    /// Clear color of the color attachment (RGBA, each in `[0, 1]`).
    pub clear_color: [f32; 4],
    /// How long recoverable frame errors may keep failing every frame before
    /// the host gives up. Frames skipped while the window is minimised do not count.
    pub recoverable_grace: Duration,
    /// How often the host logs frame statistics.
    pub stats_interval: Duration,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            application_name: "Hello Triangle".to_string(),
            window: WindowConfig::default(),
            validation: ValidationConfig::default(),
            device_extensions: vec!["VK_KHR_swapchain".to_string()],
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            fence_timeout: Duration::from_secs(2),
            acquire_timeout: Duration::from_secs(2),
            shaders: ShaderSource::EmbeddedWgsl,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            recoverable_grace: Duration::from_secs(5),
            stats_interval: Duration::from_secs(5),
        }
    }
}

impl RendererConfig {
    /// Builds the configuration from the defaults and the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if an override cannot be parsed or the
    /// resulting configuration fails [`validate`](Self::validate).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from the defaults and an arbitrary variable lookup.
    ///
    /// `lookup` is queried for each supported override; `None` keeps the default.
    ///
    /// # Errors
    ///
    /// Same as [`from_env`](Self::from_env).
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_VALIDATION) {
            config.validation.enabled = parse_flag(ENV_VALIDATION, &value)?;
        }
        if let Some(value) = lookup(ENV_FRAMES_IN_FLIGHT) {
            config.frames_in_flight = parse_number(ENV_FRAMES_IN_FLIGHT, &value)?;
        }
        if let Some(value) = lookup(ENV_FENCE_TIMEOUT_MS) {
            config.fence_timeout = Duration::from_millis(parse_number(ENV_FENCE_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_ACQUIRE_TIMEOUT_MS) {
            config.acquire_timeout =
                Duration::from_millis(parse_number(ENV_ACQUIRE_TIMEOUT_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_RECOVERABLE_GRACE_MS) {
            config.recoverable_grace =
                Duration::from_millis(parse_number(ENV_RECOVERABLE_GRACE_MS, &value)?);
        }
        if let Some(value) = lookup(ENV_SHADER_DIR) {
            config.shaders = ShaderSource::SpirvDir(PathBuf::from(value));
        }

        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for values the renderer cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first offending field.
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&self.frames_in_flight) {
            return Err(Error::Config(format!(
                "frames_in_flight must be between 1 and {}, got {}",
                MAX_FRAMES_IN_FLIGHT, self.frames_in_flight
            )));
        }

        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if self.fence_timeout.is_zero() {
            return Err(Error::Config("fence_timeout must be non-zero".to_string()));
        }
        if self.acquire_timeout.is_zero() {
            return Err(Error::Config("acquire_timeout must be non-zero".to_string()));
        }
        if self.recoverable_grace.is_zero() {
            return Err(Error::Config("recoverable_grace must be non-zero".to_string()));
        }

        if self.device_extensions.is_empty() {
            return Err(Error::Config(
                "at least one device extension (VK_KHR_swapchain) is required".to_string(),
            ));
        }

        let names = self
            .device_extensions
            .iter()
            .chain(self.validation.layers.iter())
            .chain(std::iter::once(&self.application_name));
        for name in names {
            if name.contains('\0') {
                return Err(Error::Config(format!(
                    "name {:?} contains a NUL byte",
                    name
                )));
            }
        }

        if self.validation.enabled && self.validation.layers.is_empty() {
            return Err(Error::Config(
                "validation is enabled but no layers are configured".to_string(),
            ));
        }

        if let Some(component) = self
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(Error::Config(format!(
                "clear_color components must be in [0, 1], got {}",
                component
            )));
        }

        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Ok(true),
        "0" | "false" | "off" | "no" => Ok(false),
        other => Err(Error::Config(format!(
            "{} must be a boolean (1/0, true/false, on/off), got {:?}",
            key, other
        ))),
    }
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{} must be a number, got {:?}: {}", key, value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RendererConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 600);
        assert!(!config.window.resizable);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.device_extensions, vec!["VK_KHR_swapchain"]);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("X", "1").unwrap());
        assert!(parse_flag("X", " ON ").unwrap());
        assert!(!parse_flag("X", "false").unwrap());
        assert!(parse_flag("X", "maybe").is_err());
    }

    #[test]
    fn test_frames_in_flight_bounds() {
        let mut config = RendererConfig::default();
        config.frames_in_flight = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.frames_in_flight = MAX_FRAMES_IN_FLIGHT + 1;
        assert!(config.validate().is_err());
        config.frames_in_flight = MAX_FRAMES_IN_FLIGHT;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let mut config = RendererConfig::default();
        config.fence_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.acquire_timeout = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = RendererConfig::default();
        config.recoverable_grace = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_nul_in_names() {
        let mut config = RendererConfig::default();
        config.device_extensions.push("VK_KHR\0bad".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_clear_color() {
        let mut config = RendererConfig::default();
        config.clear_color = [0.0, 0.0, 1.5, 1.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_needs_layers() {
        let mut config = RendererConfig::default();
        config.validation.enabled = true;
        config.validation.layers.clear();
        assert!(config.validate().is_err());

        config.validation.enabled = false;
        assert!(config.validate().is_ok());
    }
}
