//! GPU mode transition orchestrator
//!
//! Runs the phases of a mode switch strictly in order. Teardown and wiring
//! problems are collected as warnings; kernel and Xorg failures abort and
//! leave no configuration file behind; a DPI failure aborts but keeps the
//! new configuration, which is already valid for the next X start.
//!
//! There is no internal locking. Only one transition may run at a time,
//! which the service wrapper guarantees.

mod error;

pub use error::{ErrorKind, Phase, TransitionError, Warning};

use anyhow::{anyhow, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};

use crate::config::OptionSet;
use crate::constants::offload::NVIDIA_SINK;
use crate::constants::processes::{LOGIN_MANAGER_USER, XORG_NAMES};
use crate::constants::xorg::MODESETTING_DRIVER;
use crate::probe::is_xorg_running;
use crate::system::display::integrated_provider;
use crate::system::{DisplayTools, KernelSetup, ProcessTable, StateStore};
use crate::types::{BusIds, Mode};
use crate::xorg::{
    assemble_document, cleanup_xorg_conf, resolve_integrated_driver, write_xorg_conf,
    ResolvedDriver,
};

/// What triggered the transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// Before the login manager starts; refused if X is already up
    Boot,
    /// User-requested switch
    Switch,
}

/// Whether offload wiring and DPI run as part of the transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSteps {
    Run,
    /// Left to a later `prime` run from the display manager's setup hook
    Defer,
}

/// Everything a single transition needs. Consumed by [`TransitionContext::apply_mode`].
#[derive(Debug, Clone)]
pub struct TransitionRequest {
    pub mode: Mode,
    pub options: OptionSet,
    pub bus_ids: BusIds,
    pub driver_available: bool,
    pub kind: TransitionKind,
    pub session: SessionSteps,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionReport {
    pub mode: Mode,
    /// Login manager X servers that were killed
    pub killed: Vec<u32>,
    pub warnings: Vec<Warning>,
}

impl TransitionReport {
    fn new(mode: Mode) -> Self {
        Self {
            mode,
            killed: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn warn(&mut self, phase: Phase, message: String) {
        warn!(phase = %phase, message = %message, "Transition step did not complete");
        self.warnings.push(Warning { phase, message });
    }
}

/// Collaborators and locations a transition acts on
pub struct TransitionContext<'a> {
    pub processes: &'a dyn ProcessTable,
    pub display: &'a dyn DisplayTools,
    pub kernel: &'a dyn KernelSetup,
    pub state: &'a dyn StateStore,
    pub xorg_conf: &'a Path,
    pub xsetup_dir: &'a Path,
    /// Set asynchronously (signal handler); checked between phases only
    pub cancel: Option<&'a AtomicBool>,
}

impl TransitionContext<'_> {
    /// Run a full transition and record its outcome in the state store.
    pub fn apply_mode(
        &self,
        request: TransitionRequest,
    ) -> Result<TransitionReport, TransitionError> {
        info!(mode = %request.mode, kind = ?request.kind, "Starting GPU mode transition");

        let result = self.run_phases(&request);
        self.record_outcome(&result);
        result
    }

    /// Apply the mode last requested with `switch`, for the display
    /// manager's pre-start hook. X is down at that point, so the session
    /// steps are left to `prime`. `Ok(None)` when no mode was ever requested.
    pub fn apply_requested_mode(
        &self,
        options: OptionSet,
        bus_ids: BusIds,
        driver_available: bool,
    ) -> Result<Option<TransitionReport>, TransitionError> {
        let requested = self
            .state
            .requested_mode()
            .map_err(|e| TransitionError::external(Phase::Preflight, &e))?;
        let Some(mode) = requested else {
            warn!("No requested mode recorded, leaving the configuration alone");
            return Ok(None);
        };

        self.apply_mode(TransitionRequest {
            mode,
            options,
            bus_ids,
            driver_available,
            kind: TransitionKind::Switch,
            session: SessionSteps::Defer,
        })
        .map(Some)
    }

    /// Offload wiring, xsetup hook and DPI for an already configured mode
    pub fn apply_session_steps(
        &self,
        mode: Mode,
        options: &OptionSet,
        bus_ids: &BusIds,
        driver_available: bool,
    ) -> Result<TransitionReport, TransitionError> {
        let driver =
            resolve_integrated_driver(bus_ids.integrated_device(), options, driver_available);
        let mut report = TransitionReport::new(mode);
        self.session_steps(mode, options, driver, &mut report)?;
        Ok(report)
    }

    fn run_phases(&self, request: &TransitionRequest) -> Result<TransitionReport, TransitionError> {
        let mode = request.mode;
        let mut report = TransitionReport::new(mode);

        self.checkpoint(Phase::Preflight)?;
        if request.kind == TransitionKind::Boot {
            let running = is_xorg_running(self.processes)
                .map_err(|e| TransitionError::external(Phase::Preflight, &e))?;
            if running {
                return Err(TransitionError::new(Phase::Preflight, ErrorKind::XorgRunning));
            }
            // Picked up again by `setup` when the display manager starts
            if let Err(e) = self.state.set_requested_mode(mode) {
                report.warn(Phase::Preflight, format!("Cannot record requested mode: {e:#}"));
            }
        }

        self.checkpoint(Phase::Teardown)?;
        self.kill_login_manager_servers(&mut report);

        self.checkpoint(Phase::Cleanup)?;
        cleanup_xorg_conf(self.xorg_conf)
            .map_err(|e| TransitionError::filesystem(Phase::Cleanup, self.xorg_conf, e))?;

        self.checkpoint(Phase::Kernel)?;
        if let Err(e) = self.kernel.setup_kernel_state(&request.options, mode) {
            self.discard_config();
            return Err(TransitionError::external(Phase::Kernel, &e));
        }

        self.checkpoint(Phase::Xorg)?;
        let driver = resolve_integrated_driver(
            request.bus_ids.integrated_device(),
            &request.options,
            request.driver_available,
        );
        if driver.fell_back {
            report.warn(
                Phase::Xorg,
                format!(
                    "Xorg driver {} is not installed, using {MODESETTING_DRIVER}",
                    request.bus_ids.integrated_device().vendor_driver()
                ),
            );
        }

        let text = assemble_document(
            mode,
            &request.bus_ids,
            &request.options,
            request.driver_available,
        );
        if let Err(e) = write_xorg_conf(self.xorg_conf, &text) {
            self.discard_config();
            return Err(TransitionError::filesystem(Phase::Xorg, self.xorg_conf, e));
        }
        if let Err(e) = self.state.set_applied_mode(mode) {
            report.warn(Phase::Xorg, format!("Cannot record applied mode: {e:#}"));
        }

        match request.session {
            SessionSteps::Run => self.session_steps(mode, &request.options, driver, &mut report)?,
            SessionSteps::Defer => debug!("Session steps deferred"),
        }

        info!(mode = %mode, warnings = report.warnings.len(), "GPU mode transition complete");
        Ok(report)
    }

    fn session_steps(
        &self,
        mode: Mode,
        options: &OptionSet,
        driver: ResolvedDriver,
        report: &mut TransitionReport,
    ) -> Result<(), TransitionError> {
        self.checkpoint(Phase::Wiring)?;
        if mode.uses_nvidia() {
            if let Err(e) = self.wire_offload(driver) {
                report.warn(Phase::Wiring, format!("Cannot set up PRIME: {e:#}"));
            }
        }

        let script = self.xsetup_dir.join(format!("xsetup-{mode}.sh"));
        if script.is_file() {
            info!(script = %script.display(), "Running xsetup hook");
            if let Err(e) = self.display.run_xsetup_script(&script) {
                report.warn(Phase::Wiring, format!("{e:#}"));
            }
        }

        self.checkpoint(Phase::Dpi)?;
        let dpi = options.nvidia.dpi.trim();
        if !dpi.is_empty() {
            info!(dpi, "Setting DPI");
            self.display
                .set_dpi(dpi)
                .map_err(|e| TransitionError::external(Phase::Dpi, &e))?;
        }
        Ok(())
    }

    /// Point the NVIDIA sink at the integrated provider, then let RandR
    /// enable the outputs.
    fn wire_offload(&self, driver: ResolvedDriver) -> Result<()> {
        let source = if driver.is_vendor() {
            let listing = self.display.list_providers()?;
            integrated_provider(&listing)
                .ok_or_else(|| anyhow!("No Intel or AMD provider in xrandr output"))?
        } else {
            MODESETTING_DRIVER.to_string()
        };

        info!(source = %source, sink = NVIDIA_SINK, "Setting provider output source");
        self.display.set_provider_output_source(&source, NVIDIA_SINK)?;
        self.display.auto_configure()
    }

    /// Kill X servers left running by the login manager's greeter. Best effort.
    fn kill_login_manager_servers(&self, report: &mut TransitionReport) {
        let pids = match self.processes.pids_by_names(XORG_NAMES) {
            Ok(pids) => pids,
            Err(e) => {
                report.warn(Phase::Teardown, format!("Cannot list X servers: {e:#}"));
                return;
            }
        };

        for pid in pids {
            match self.processes.owner_of(pid) {
                Ok(owner) if owner == LOGIN_MANAGER_USER => {
                    info!(pid, owner = %owner, "Killing login manager X server");
                    match self.processes.kill(pid) {
                        Ok(()) => report.killed.push(pid),
                        Err(e) => report.warn(Phase::Teardown, format!("{e:#}")),
                    }
                }
                Ok(owner) => debug!(pid, owner = %owner, "Leaving X server alone"),
                Err(e) => {
                    report.warn(Phase::Teardown, format!("Cannot find owner of {pid}: {e:#}"))
                }
            }
        }
    }

    fn checkpoint(&self, next: Phase) -> Result<(), TransitionError> {
        if self.cancel.is_some_and(|flag| flag.load(Ordering::SeqCst)) {
            warn!(phase = %next, "Transition cancelled");
            return Err(TransitionError::new(next, ErrorKind::Cancelled));
        }
        Ok(())
    }

    /// Remove whatever may have been written, including a stray temp file
    fn discard_config(&self) {
        if let Err(e) = cleanup_xorg_conf(self.xorg_conf) {
            error!(
                path = %self.xorg_conf.display(),
                error = %e,
                "Cannot remove Xorg configuration"
            );
        }
    }

    fn record_outcome(&self, result: &Result<TransitionReport, TransitionError>) {
        let message = match result {
            Ok(_) => None,
            Err(e) => {
                error!(phase = %e.phase, error = %e, "GPU mode transition failed");
                Some(e.to_string())
            }
        };
        if let Err(e) = self.state.set_last_error(message.as_deref()) {
            warn!(error = %e, "Cannot record transition outcome");
        }
    }
}
