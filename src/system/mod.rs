//! Live system collaborators
//!
//! Every external check and action goes through one of the traits below,
//! one method per logical operation. The orchestrator and the probe only
//! ever see these traits; the concrete types shell out, read sysfs or talk
//! to D-Bus.

pub mod command;
pub mod display;
pub mod kernel;
pub mod pci;
pub mod power;
pub mod processes;
pub mod service;
pub mod state;

use anyhow::Result;
use std::path::Path;

use crate::config::OptionSet;
use crate::types::{BusIds, IntegratedVendor, Mode};

/// Process table access
pub trait ProcessTable {
    /// PIDs of processes whose name is exactly one of `names`
    fn pids_by_names(&self, names: &[&str]) -> Result<Vec<u32>>;

    /// Login name of the process owner
    fn owner_of(&self, pid: u32) -> Result<String>;

    /// Send SIGKILL
    fn kill(&self, pid: u32) -> Result<()>;
}

/// X display utilities (RandR, GLX, session hooks)
pub trait DisplayTools {
    /// Raw `xrandr --listproviders` output
    fn list_providers(&self) -> Result<String>;

    fn set_provider_output_source(&self, source: &str, sink: &str) -> Result<()>;

    /// `xrandr --auto`
    fn auto_configure(&self) -> Result<()>;

    fn set_dpi(&self, dpi: &str) -> Result<()>;

    /// Whether the default GL context is served by the NVIDIA driver
    fn gl_vendor_is_nvidia(&self) -> Result<bool>;

    fn run_xsetup_script(&self, script: &Path) -> Result<()>;
}

/// Kernel module state for a mode
pub trait KernelSetup {
    fn setup_kernel_state(&self, options: &OptionSet, mode: Mode) -> Result<()>;
}

/// GPU bus address discovery
pub trait BusIdResolver {
    fn resolve_bus_ids(&self) -> Result<BusIds>;
}

/// Availability of the integrated vendor's Xorg driver
pub trait DriverProbe {
    fn vendor_driver_available(&self, vendor: IntegratedVendor) -> bool;
}

/// Persisted mode bookkeeping, passed to the orchestrator explicitly
pub trait StateStore {
    fn requested_mode(&self) -> Result<Option<Mode>>;
    fn set_requested_mode(&self, mode: Mode) -> Result<()>;
    fn applied_mode(&self) -> Result<Option<Mode>>;
    fn set_applied_mode(&self, mode: Mode) -> Result<()>;
    fn last_error(&self) -> Result<Option<String>>;
    fn set_last_error(&self, error: Option<&str>) -> Result<()>;
}
