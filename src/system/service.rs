//! Service status across init systems
//!
//! The query strategy is chosen once: systemd over the D-Bus system bus
//! when it is reachable, otherwise the init system's own command line tool.

use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use zbus::blocking::Connection;
use zbus::zvariant::{OwnedObjectPath, OwnedValue, Value};

use super::command::succeeds;
use crate::constants::paths;

/// Boolean "is this service running" query
pub trait ServiceQuery {
    fn is_service_active(&self, name: &str) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitSystem {
    Systemd,
    OpenRc,
    RunitArtix,
    RunitVoid,
}

/// Classify PID 1 by its process name
pub fn classify_init(comm: &str, artix_services_present: bool) -> Option<InitSystem> {
    match comm.trim() {
        "systemd" => Some(InitSystem::Systemd),
        "openrc-init" => Some(InitSystem::OpenRc),
        "runit" if artix_services_present => Some(InitSystem::RunitArtix),
        "runit" => Some(InitSystem::RunitVoid),
        _ => None,
    }
}

pub fn detect_init_system() -> Option<InitSystem> {
    let comm = fs::read_to_string(paths::PROC_INIT_COMM).ok()?;
    classify_init(&comm, Path::new(paths::RUNIT_ARTIX_SERVICES).is_dir())
}

/// Command and arguments answering the query for `init`
pub fn status_command(init: InitSystem, name: &str) -> (&'static str, Vec<String>) {
    match init {
        InitSystem::Systemd => ("systemctl", vec!["is-active".to_string(), name.to_string()]),
        InitSystem::OpenRc => ("rc-service", vec![name.to_string(), "status".to_string()]),
        InitSystem::RunitArtix | InitSystem::RunitVoid => {
            ("pgrep", vec!["-a".to_string(), name.to_string()])
        }
    }
}

enum Strategy {
    DBus(Connection),
    Command(Option<InitSystem>),
}

pub struct ServiceStatus {
    strategy: Strategy,
}

impl ServiceStatus {
    /// Probe for D-Bus once and pick the strategy
    pub fn detect() -> Self {
        let strategy = if Path::new(paths::ELOGIND_LIB).is_file() {
            info!("elogind present, querying services through init commands");
            Strategy::Command(detect_init_system())
        } else {
            match Connection::system() {
                Ok(conn) => Strategy::DBus(conn),
                Err(e) => {
                    warn!(
                        error = %e,
                        "Cannot reach the D-Bus system bus, falling back to init commands"
                    );
                    Strategy::Command(detect_init_system())
                }
            }
        };
        Self { strategy }
    }

    /// Command strategy for a known init system
    #[cfg(test)]
    pub fn with_init(init: Option<InitSystem>) -> Self {
        Self {
            strategy: Strategy::Command(init),
        }
    }
}

impl ServiceQuery for ServiceStatus {
    fn is_service_active(&self, name: &str) -> bool {
        match &self.strategy {
            Strategy::DBus(conn) => unit_running(conn, name).unwrap_or_else(|e| {
                debug!(
                    service = name,
                    error = %e,
                    "systemd unit query failed, treating as inactive"
                );
                false
            }),
            Strategy::Command(Some(init)) => {
                let (program, args) = status_command(*init, name);
                succeeds(program, &args)
            }
            Strategy::Command(None) => {
                warn!(service = name, "Unknown init system, cannot check service status");
                false
            }
        }
    }
}

fn unit_running(conn: &Connection, name: &str) -> zbus::Result<bool> {
    let reply = conn.call_method(
        Some("org.freedesktop.systemd1"),
        "/org/freedesktop/systemd1",
        Some("org.freedesktop.systemd1.Manager"),
        "GetUnit",
        &(format!("{name}.service"),),
    )?;
    let unit: OwnedObjectPath = reply.body().deserialize()?;

    let reply = conn.call_method(
        Some("org.freedesktop.systemd1"),
        unit.as_str(),
        Some("org.freedesktop.DBus.Properties"),
        "Get",
        &("org.freedesktop.systemd1.Unit", "SubState"),
    )?;
    let state: OwnedValue = reply.body().deserialize()?;

    Ok(matches!(&*state, Value::Str(s) if s.as_str() == "running"))
}
