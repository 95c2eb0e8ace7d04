//! Core value types shared by the generator and the orchestrator

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// GPU operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Only the NVIDIA GPU drives outputs
    #[serde(alias = "nvidia")]
    #[value(alias = "nvidia")]
    Discrete,
    /// Only the integrated GPU drives outputs
    Integrated,
    /// Integrated GPU drives outputs, NVIDIA renders through PRIME offload
    Hybrid,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Discrete => "discrete",
            Mode::Integrated => "integrated",
            Mode::Hybrid => "hybrid",
        }
    }

    /// Whether the NVIDIA driver stack is part of the X session
    pub fn uses_nvidia(&self) -> bool {
        matches!(self, Mode::Discrete | Mode::Hybrid)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown GPU mode '{0}'")]
pub struct UnknownMode(pub String);

impl FromStr for Mode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "discrete" | "nvidia" => Ok(Mode::Discrete),
            "integrated" => Ok(Mode::Integrated),
            "hybrid" => Ok(Mode::Hybrid),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

/// Vendor of the CPU-integrated GPU. Exactly one is present per machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegratedVendor {
    Intel,
    Amd,
}

impl IntegratedVendor {
    pub fn device(&self) -> GpuDevice {
        match self {
            IntegratedVendor::Intel => GpuDevice::Intel,
            IntegratedVendor::Amd => GpuDevice::Amd,
        }
    }
}

/// A GPU slot that gets its own `Device` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuDevice {
    Nvidia,
    Intel,
    Amd,
}

impl GpuDevice {
    /// Identifier used for the `Device` and `Screen` sections
    pub fn identifier(&self) -> &'static str {
        match self {
            GpuDevice::Nvidia => "nvidia",
            GpuDevice::Intel => "intel",
            GpuDevice::Amd => "amd",
        }
    }

    /// Name of the vendor's own Xorg driver
    pub fn vendor_driver(&self) -> &'static str {
        match self {
            GpuDevice::Nvidia => "nvidia",
            GpuDevice::Intel => "intel",
            GpuDevice::Amd => "amdgpu",
        }
    }

    pub const ALL: [GpuDevice; 3] = [GpuDevice::Nvidia, GpuDevice::Intel, GpuDevice::Amd];
}

/// Optional yes/no option. An empty string in the option file means unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Toggle {
    #[default]
    #[serde(rename = "")]
    Unset,
    #[serde(rename = "yes")]
    Yes,
    #[serde(rename = "no")]
    No,
}

impl Toggle {
    /// Xorg boolean literal, `None` when the option must not be emitted
    pub fn as_xorg_bool(&self) -> Option<&'static str> {
        match self {
            Toggle::Unset => None,
            Toggle::Yes => Some("true"),
            Toggle::No => Some("false"),
        }
    }
}

/// Xorg bus addresses of both GPUs
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusIds {
    pub nvidia: String,
    pub integrated_vendor: IntegratedVendor,
    pub integrated: String,
}

impl BusIds {
    pub fn integrated_device(&self) -> GpuDevice {
        self.integrated_vendor.device()
    }
}
