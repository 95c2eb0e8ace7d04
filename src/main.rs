#![forbid(unsafe_code)]

mod config;
mod constants;
mod probe;
mod startup;
mod system;
mod transition;
mod types;
mod xorg;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use tracing::{error, info, warn, Level as TraceLevel};
use tracing_subscriber::FmtSubscriber;

use config::OptionSet;
use constants::{paths, services};
use probe::{overriding_configs, RuntimeProbe};
use startup::{resolve_startup_mode, StartupMode};
use system::display::XrandrTools;
use system::kernel::ModprobeKernel;
use system::pci::{SysfsBusIds, XorgModuleProbe};
use system::power::is_ac_power_connected;
use system::processes::SystemProcessTable;
use system::service::{ServiceQuery, ServiceStatus};
use system::state::FileStateStore;
use system::{BusIdResolver, DriverProbe, StateStore};
use transition::{
    ErrorKind, SessionSteps, TransitionContext, TransitionError, TransitionKind, TransitionReport,
    TransitionRequest,
};
use types::{BusIds, Mode};

#[derive(Parser, Debug)]
#[command(
    name = "prime-switch",
    version,
    about = "Switch between NVIDIA, integrated and hybrid graphics"
)]
struct Cli {
    /// Option file
    #[arg(long, global = true, default_value = paths::CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Configure the startup mode before the display manager starts
    Boot,
    /// Switch to MODE. Takes effect when the display manager restarts
    Switch {
        #[arg(value_enum)]
        mode: Mode,
    },
    /// Apply the requested mode from the display manager's pre-start hook
    Setup,
    /// Set up PRIME offload wiring and DPI in the running X session
    Prime,
    /// Persist the mode `boot` uses when the kernel command line sets none
    SetStartup {
        #[arg(value_enum)]
        mode: StartupMode,
    },
    /// Print the Xorg configuration MODE would use
    Generate {
        #[arg(value_enum)]
        mode: Mode,
    },
    /// Show the current GPU state
    Status {
        #[arg(long)]
        json: bool,
    },
}

/// Live collaborators shared by the commands
struct Machine {
    processes: SystemProcessTable,
    display: XrandrTools,
    kernel: ModprobeKernel,
    state: FileStateStore,
    buses: SysfsBusIds,
    drivers: XorgModuleProbe,
}

impl Machine {
    fn new() -> Self {
        Self {
            processes: SystemProcessTable,
            display: XrandrTools,
            kernel: ModprobeKernel::default(),
            state: FileStateStore::new(paths::STATE_DIR),
            buses: SysfsBusIds {
                devices_dir: PathBuf::from(paths::PCI_DEVICES),
            },
            drivers: XorgModuleProbe {
                drivers_dir: PathBuf::from(paths::XORG_DRIVERS),
            },
        }
    }

    fn context<'a>(&'a self, cancel: Option<&'a AtomicBool>) -> TransitionContext<'a> {
        TransitionContext {
            processes: &self.processes,
            display: &self.display,
            kernel: &self.kernel,
            state: &self.state,
            xorg_conf: Path::new(paths::XORG_CONF),
            xsetup_dir: Path::new(paths::XSETUP_DIR),
            cancel,
        }
    }

    /// Bus IDs and whether the integrated vendor driver is installed
    fn hardware(&self) -> Result<(BusIds, bool)> {
        let bus_ids = self.buses.resolve_bus_ids()?;
        let available = self.drivers.vendor_driver_available(bus_ids.integrated_vendor);
        info!(
            nvidia = %bus_ids.nvidia,
            integrated = %bus_ids.integrated,
            vendor_driver = available,
            "Detected GPUs"
        );
        Ok((bus_ids, available))
    }
}

#[derive(Serialize)]
struct StatusReport {
    startup_mode: Option<StartupMode>,
    requested_mode: Option<Mode>,
    applied_mode: Option<Mode>,
    last_error: Option<String>,
    renderer: Option<Mode>,
    overriding_configs: Vec<PathBuf>,
    xorg_running: Option<bool>,
    ac_power: bool,
    display_manager_active: bool,
}

fn main() -> ExitCode {
    // Parse log level from environment variable
    let log_level = match std::env::var("LOG_LEVEL")
        .unwrap_or_else(|_| "info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => TraceLevel::TRACE,
        "debug" => TraceLevel::DEBUG,
        "warn" => TraceLevel::WARN,
        "error" => TraceLevel::ERROR,
        _ => TraceLevel::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Cannot install logger: {e}");
    }

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let machine = Machine::new();

    match cli.command {
        Command::Boot => boot(&machine, &cli.config),
        Command::Switch { mode } => switch(&machine, &cli.config, mode),
        Command::Setup => setup(&machine, &cli.config),
        Command::Prime => prime(&machine, &cli.config),
        Command::SetStartup { mode } => {
            machine.state.set_startup_mode(mode)?;
            info!(mode = mode.as_str(), "Startup mode saved");
            Ok(ExitCode::SUCCESS)
        }
        Command::Generate { mode } => {
            let options = load_options(&cli.config)?;
            let (bus_ids, available) = machine.hardware()?;
            let driver =
                xorg::resolve_integrated_driver(bus_ids.integrated_device(), &options, available);
            if driver.fell_back {
                warn!(
                    driver = bus_ids.integrated_device().vendor_driver(),
                    "Xorg driver is not installed, using modesetting"
                );
            }
            print!("{}", xorg::assemble_document(mode, &bus_ids, &options, available));
            Ok(ExitCode::SUCCESS)
        }
        Command::Status { json } => status(&machine, json),
    }
}

fn load_options(path: &Path) -> Result<OptionSet> {
    OptionSet::load(path, Path::new(paths::EXTRA_XORG_DIR))
        .with_context(|| format!("Invalid configuration in {}", path.display()))
}

/// SIGINT/SIGTERM raise the returned flag
fn cancel_flag() -> Result<Arc<AtomicBool>> {
    use signal_hook::consts::{SIGINT, SIGTERM};

    let flag = Arc::new(AtomicBool::new(false));
    for signal in [SIGINT, SIGTERM] {
        signal_hook::flag::register(signal, Arc::clone(&flag))
            .with_context(|| format!("Failed to register handler for signal {signal}"))?;
    }
    Ok(flag)
}

fn boot(machine: &Machine, config: &Path) -> Result<ExitCode> {
    let options = load_options(config)?;
    let (bus_ids, driver_available) = machine.hardware()?;

    let cmdline = fs::read_to_string(paths::PROC_CMDLINE)
        .inspect_err(|e| warn!(error = %e, "Cannot read kernel command line"))
        .ok();
    let persisted = machine.state.startup_mode().unwrap_or_else(|e| {
        warn!(error = %e, "Cannot read startup mode, using the configured one");
        None
    });
    let mode = resolve_startup_mode(cmdline.as_deref(), persisted, &options, || {
        is_ac_power_connected(Path::new(paths::POWER_SUPPLY))
    });
    let cancel = cancel_flag()?;
    let result = machine.context(Some(cancel.as_ref())).apply_mode(TransitionRequest {
        mode,
        options,
        bus_ids,
        driver_available,
        kind: TransitionKind::Boot,
        session: SessionSteps::Defer,
    });

    if let Err(TransitionError {
        kind: ErrorKind::XorgRunning,
        ..
    }) = &result
    {
        warn!("X server already running, leaving the current configuration in place");
        return Ok(ExitCode::SUCCESS);
    }
    settle(result)
}

fn setup(machine: &Machine, config: &Path) -> Result<ExitCode> {
    let options = load_options(config)?;
    let (bus_ids, driver_available) = machine.hardware()?;
    warn_about_overriding_configs();

    let cancel = cancel_flag()?;
    match machine
        .context(Some(cancel.as_ref()))
        .apply_requested_mode(options, bus_ids, driver_available)
        .transpose()
    {
        Some(result) => settle(result),
        None => Ok(ExitCode::SUCCESS),
    }
}

fn switch(machine: &Machine, config: &Path, mode: Mode) -> Result<ExitCode> {
    let options = load_options(config)?;
    let (bus_ids, driver_available) = machine.hardware()?;
    warn_if_display_manager_inactive();
    warn_about_overriding_configs();

    machine.state.set_requested_mode(mode)?;
    let cancel = cancel_flag()?;
    let result = machine.context(Some(cancel.as_ref())).apply_mode(TransitionRequest {
        mode,
        options,
        bus_ids,
        driver_available,
        kind: TransitionKind::Switch,
        session: SessionSteps::Run,
    });

    let code = settle(result)?;
    info!("Restart the display manager to use {mode} mode");
    Ok(code)
}

fn prime(machine: &Machine, config: &Path) -> Result<ExitCode> {
    let options = load_options(config)?;
    let (bus_ids, driver_available) = machine.hardware()?;
    warn_if_display_manager_inactive();

    let mode = match machine.state.applied_mode()? {
        Some(mode) => mode,
        None => match machine.state.requested_mode()? {
            Some(mode) => mode,
            None => resolve_startup_mode(None, machine.state.startup_mode()?, &options, || {
                is_ac_power_connected(Path::new(paths::POWER_SUPPLY))
            }),
        },
    };
    info!(mode = %mode, "Setting up session");

    let report = machine
        .context(None)
        .apply_session_steps(mode, &options, &bus_ids, driver_available)?;
    Ok(finish(&report))
}

fn status(machine: &Machine, json: bool) -> Result<ExitCode> {
    let service_status = ServiceStatus::detect();
    let probe = RuntimeProbe {
        processes: &machine.processes,
        display: &machine.display,
        services: &service_status,
        power_supply_dir: Path::new(paths::POWER_SUPPLY),
    };

    let report = StatusReport {
        startup_mode: machine.state.startup_mode()?,
        requested_mode: machine.state.requested_mode()?,
        applied_mode: machine.state.applied_mode()?,
        last_error: machine.state.last_error()?,
        overriding_configs: overriding_configs(paths::OVERRIDING_XORG_CONFS),
        renderer: probe
            .active_renderer()
            .inspect_err(|e| warn!("Cannot determine renderer: {e:#}"))
            .ok(),
        xorg_running: probe
            .xorg_running()
            .inspect_err(|e| warn!("Cannot check for X server: {e:#}"))
            .ok(),
        ac_power: probe.ac_power_connected(),
        display_manager_active: probe.service_active(services::DISPLAY_MANAGER),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_status(&report);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_status(report: &StatusReport) {
    fn mode_or_unknown(mode: Option<Mode>) -> &'static str {
        mode.map(|m| m.as_str()).unwrap_or("unknown")
    }

    let startup = report.startup_mode.map(|m| m.as_str()).unwrap_or("default");
    println!("Startup mode:   {startup}");
    println!("Requested mode: {}", mode_or_unknown(report.requested_mode));
    println!("Applied mode:   {}", mode_or_unknown(report.applied_mode));
    println!("Renderer:       {}", mode_or_unknown(report.renderer));
    match report.xorg_running {
        Some(running) => println!("X running:      {running}"),
        None => println!("X running:      unknown"),
    }
    println!("AC power:       {}", report.ac_power);
    println!("Display manager active: {}", report.display_manager_active);
    for path in &report.overriding_configs {
        println!("Overridden by:  {}", path.display());
    }
    if let Some(error) = &report.last_error {
        println!("Last error:     {error}");
    }
}

fn warn_if_display_manager_inactive() {
    if !ServiceStatus::detect().is_service_active(services::DISPLAY_MANAGER) {
        warn!(service = services::DISPLAY_MANAGER, "Display manager service is not active");
    }
}

fn warn_about_overriding_configs() {
    for path in overriding_configs(paths::OVERRIDING_XORG_CONFS) {
        warn!(
            path = %path.display(),
            "This file overrides the generated Xorg configuration and may break the switch"
        );
    }
}

/// Log the outcome of a transition. A failure after the new configuration
/// was written still leaves the requested mode usable on the next X start.
fn settle(result: Result<TransitionReport, TransitionError>) -> Result<ExitCode> {
    match result {
        Ok(report) => Ok(finish(&report)),
        Err(e) if e.keeps_new_config() => {
            warn!("The new Xorg configuration is in place and applies when X restarts");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

fn finish(report: &TransitionReport) -> ExitCode {
    if !report.warnings.is_empty() {
        warn!(count = report.warnings.len(), mode = %report.mode, "Finished with warnings");
    }
    if !report.killed.is_empty() {
        info!(pids = ?report.killed, "Stopped login manager X servers");
    }
    ExitCode::SUCCESS
}
