//! Startup mode resolution for the boot transition

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::OptionSet;
use crate::constants::kernel::STARTUP_PARAM;
use crate::types::Mode;

/// Mode requested for boot, either fixed or chosen from the power source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StartupMode {
    #[serde(alias = "nvidia")]
    #[value(alias = "nvidia")]
    Discrete,
    Integrated,
    Hybrid,
    /// Discrete on AC power, the configured battery mode otherwise
    #[value(name = "ac_auto")]
    AcAuto,
}

impl StartupMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StartupMode::Discrete => "discrete",
            StartupMode::Integrated => "integrated",
            StartupMode::Hybrid => "hybrid",
            StartupMode::AcAuto => "ac_auto",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "ac_auto" => Some(StartupMode::AcAuto),
            other => other.parse::<Mode>().ok().map(StartupMode::from),
        }
    }
}

impl From<Mode> for StartupMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Discrete => StartupMode::Discrete,
            Mode::Integrated => StartupMode::Integrated,
            Mode::Hybrid => StartupMode::Hybrid,
        }
    }
}

/// Value of `prime-switch.startup=<mode>` on the kernel command line
pub fn startup_param(cmdline: &str) -> Option<StartupMode> {
    let prefix = format!("{STARTUP_PARAM}=");
    let value = cmdline
        .split_whitespace()
        .filter_map(|arg| arg.strip_prefix(prefix.as_str()))
        .last()?;

    let mode = StartupMode::parse(value);
    if mode.is_none() {
        warn!(value, "Ignoring unknown startup mode on kernel command line");
    }
    mode
}

/// Pick the boot mode: kernel parameter, then the persisted startup mode,
/// then the configured default. `ac_auto` is resolved last.
pub fn resolve_startup_mode(
    cmdline: Option<&str>,
    persisted: Option<StartupMode>,
    options: &OptionSet,
    ac_connected: impl FnOnce() -> bool,
) -> Mode {
    let requested = if let Some(mode) = cmdline.and_then(startup_param) {
        info!(mode = mode.as_str(), "Startup mode set by kernel parameter");
        mode
    } else if let Some(mode) = persisted {
        info!(mode = mode.as_str(), "Startup mode read from state");
        mode
    } else {
        info!(mode = options.startup.startup_mode.as_str(), "Using configured startup mode");
        options.startup.startup_mode
    };

    match requested {
        StartupMode::Discrete => Mode::Discrete,
        StartupMode::Integrated => Mode::Integrated,
        StartupMode::Hybrid => Mode::Hybrid,
        StartupMode::AcAuto => {
            if ac_connected() {
                info!("ac_auto: AC power connected, using discrete mode");
                Mode::Discrete
            } else {
                let mode = options.startup.ac_auto_battery_mode;
                info!(mode = %mode, "ac_auto: running on battery");
                mode
            }
        }
    }
}
