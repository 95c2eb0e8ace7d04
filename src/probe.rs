//! Runtime state queries
//!
//! Nothing here is cached: GPU state can change underneath us (another
//! tool, a crashed session, a suspend/resume), so every call asks again.

use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::constants::processes::XORG_NAMES;
use crate::system::display::offload_available;
use crate::system::power::is_ac_power_connected;
use crate::system::service::ServiceQuery;
use crate::system::{DisplayTools, ProcessTable};
use crate::types::Mode;

/// Whether an `X` or `Xorg` process exists
pub fn is_xorg_running(processes: &dyn ProcessTable) -> Result<bool> {
    Ok(!processes.pids_by_names(XORG_NAMES)?.is_empty())
}

/// Classify the running session from the GL vendor and the offload providers
pub fn active_renderer(display: &dyn DisplayTools) -> Result<Mode> {
    if display.gl_vendor_is_nvidia()? {
        return Ok(Mode::Discrete);
    }
    if offload_available(&display.list_providers()?) {
        Ok(Mode::Hybrid)
    } else {
        Ok(Mode::Integrated)
    }
}

/// Existing files among `candidates`. Xorg reads them as well, and their
/// device settings win over the generated configuration.
pub fn overriding_configs<P: AsRef<Path>>(candidates: &[P]) -> Vec<PathBuf> {
    candidates
        .iter()
        .map(|p| p.as_ref())
        .filter(|p| p.exists())
        .map(Path::to_path_buf)
        .collect()
}

pub struct RuntimeProbe<'a> {
    pub processes: &'a dyn ProcessTable,
    pub display: &'a dyn DisplayTools,
    pub services: &'a dyn ServiceQuery,
    pub power_supply_dir: &'a Path,
}

impl RuntimeProbe<'_> {
    pub fn xorg_running(&self) -> Result<bool> {
        is_xorg_running(self.processes)
    }

    pub fn ac_power_connected(&self) -> bool {
        is_ac_power_connected(self.power_supply_dir)
    }

    pub fn active_renderer(&self) -> Result<Mode> {
        active_renderer(self.display)
    }

    pub fn service_active(&self, name: &str) -> bool {
        self.services.is_service_active(name)
    }
}
