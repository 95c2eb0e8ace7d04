//! User option set
//!
//! Loaded once per invocation from a TOML file plus a directory of raw
//! per-device Xorg lines, then handed to the generator as read-only input.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::startup::StartupMode;
use crate::types::{GpuDevice, Mode, Toggle};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid option {option}: {reason}")]
    Invalid { option: &'static str, reason: String },
}

/// Complete option set for one invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionSet {
    #[serde(default)]
    pub startup: StartupOptions,
    #[serde(default)]
    pub integrated: IntegratedOptions,
    #[serde(default)]
    pub nvidia: NvidiaOptions,

    /// Raw lines appended to each `Device` section, in file order
    #[serde(skip)]
    pub extra_lines: HashMap<GpuDevice, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartupOptions {
    #[serde(default = "default_startup_mode")]
    pub startup_mode: StartupMode,
    /// Mode used by `ac_auto` when running on battery
    #[serde(default = "default_battery_mode")]
    pub ac_auto_battery_mode: Mode,
}

/// Which Xorg driver the integrated GPU should use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratedDriver {
    /// The vendor DDX (`intel` / `amdgpu`), if installed
    Xorg,
    Modesetting,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedOptions {
    #[serde(default = "default_integrated_driver")]
    pub driver: IntegratedDriver,
    /// `AccelMethod` value, Intel only. Empty means unset.
    #[serde(default)]
    pub accel: String,
    #[serde(default)]
    pub tearfree: Toggle,
    #[serde(default = "default_dri")]
    pub dri: u8,
    /// `AllowPRIMEDisplayOffloadSink` in hybrid mode
    #[serde(default)]
    pub reverseprime: Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NvidiaFlag {
    Overclocking,
    TripleBuffer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NvidiaOptions {
    /// Load `nvidia_drm` with `modeset=1`
    #[serde(default = "default_modeset")]
    pub modeset: bool,
    #[serde(default = "default_nvidia_flags")]
    pub options: Vec<NvidiaFlag>,
    /// Passed to `xrandr --dpi`. Empty disables the DPI step.
    #[serde(default = "default_dpi")]
    pub dpi: String,
    #[serde(default)]
    pub ignore_abi: bool,
    #[serde(default)]
    pub allow_external_gpus: bool,
}

fn default_startup_mode() -> StartupMode {
    StartupMode::Integrated
}

fn default_battery_mode() -> Mode {
    Mode::Integrated
}

fn default_integrated_driver() -> IntegratedDriver {
    IntegratedDriver::Modesetting
}

fn default_dri() -> u8 {
    3
}

fn default_modeset() -> bool {
    true
}

fn default_nvidia_flags() -> Vec<NvidiaFlag> {
    vec![NvidiaFlag::Overclocking]
}

fn default_dpi() -> String {
    "96".to_string()
}

impl Default for StartupOptions {
    fn default() -> Self {
        Self {
            startup_mode: default_startup_mode(),
            ac_auto_battery_mode: default_battery_mode(),
        }
    }
}

impl Default for IntegratedOptions {
    fn default() -> Self {
        Self {
            driver: default_integrated_driver(),
            accel: String::new(),
            tearfree: Toggle::Unset,
            dri: default_dri(),
            reverseprime: Toggle::Unset,
        }
    }
}

impl Default for NvidiaOptions {
    fn default() -> Self {
        Self {
            modeset: default_modeset(),
            options: default_nvidia_flags(),
            dpi: default_dpi(),
            ignore_abi: false,
            allow_external_gpus: false,
        }
    }
}

impl NvidiaOptions {
    pub fn has_flag(&self, flag: NvidiaFlag) -> bool {
        self.options.contains(&flag)
    }
}

impl OptionSet {
    /// Load options from `path` and extra Xorg lines from `extra_dir`.
    /// A missing option file yields the defaults.
    pub fn load(path: &Path, extra_dir: &Path) -> Result<Self, ConfigError> {
        let mut options = match fs::read_to_string(path) {
            Ok(contents) => {
                let options: OptionSet =
                    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                        path: path.to_path_buf(),
                        source,
                    })?;
                info!(path = %path.display(), "Loaded option file");
                options
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "Option file not found, using defaults");
                OptionSet::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        options.validate()?;
        options.extra_lines = load_extra_lines(extra_dir)?;
        Ok(options)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.integrated.dri > 3 {
            return Err(ConfigError::Invalid {
                option: "integrated.dri",
                reason: format!("{} is not one of 0, 1, 2, 3", self.integrated.dri),
            });
        }
        if self.nvidia.dpi.chars().any(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                option: "nvidia.dpi",
                reason: format!("'{}' must be a single value", self.nvidia.dpi),
            });
        }
        Ok(())
    }

    pub fn extra_lines_for(&self, device: GpuDevice) -> &[String] {
        self.extra_lines.get(&device).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Read `<identifier>.conf` for every device. Blank lines and `#` comments
/// are skipped, everything else is kept verbatim and in order.
pub fn load_extra_lines(dir: &Path) -> Result<HashMap<GpuDevice, Vec<String>>, ConfigError> {
    let mut extra = HashMap::new();

    for device in GpuDevice::ALL {
        let path = dir.join(format!("{}.conf", device.identifier()));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(source) => return Err(ConfigError::Read { path, source }),
        };

        let lines: Vec<String> = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_string)
            .collect();

        debug!(device = device.identifier(), count = lines.len(), "Loaded extra Xorg lines");
        if !lines.is_empty() {
            extra.insert(device, lines);
        }
    }

    Ok(extra)
}
