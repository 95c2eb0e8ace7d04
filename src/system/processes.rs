//! Process table access through sysinfo, signals and user lookup through nix

use anyhow::{anyhow, Context, Result};
use nix::sys::signal::{kill, Signal};
use nix::unistd::{Pid as NixPid, Uid, User};
use std::ffi::OsStr;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::debug;

use super::ProcessTable;

/// Live process table. Every call takes a fresh snapshot.
#[derive(Debug, Default)]
pub struct SystemProcessTable;

impl SystemProcessTable {
    fn snapshot(to_update: ProcessesToUpdate<'_>) -> System {
        let mut system = System::new();
        system.refresh_processes_specifics(
            to_update,
            true,
            ProcessRefreshKind::everything(),
        );
        system
    }
}

impl ProcessTable for SystemProcessTable {
    fn pids_by_names(&self, names: &[&str]) -> Result<Vec<u32>> {
        let system = Self::snapshot(ProcessesToUpdate::All);
        let mut pids: Vec<u32> = names
            .iter()
            .flat_map(|name| system.processes_by_exact_name(OsStr::new(*name)))
            .map(|process| process.pid().as_u32())
            .collect();
        pids.sort_unstable();
        pids.dedup();
        debug!(?names, ?pids, "Looked up processes by name");
        Ok(pids)
    }

    fn owner_of(&self, pid: u32) -> Result<String> {
        let sys_pid = Pid::from_u32(pid);
        let system = Self::snapshot(ProcessesToUpdate::Some(&[sys_pid]));
        let process = system
            .process(sys_pid)
            .ok_or_else(|| anyhow!("Process {pid} not found"))?;
        let uid = process
            .user_id()
            .ok_or_else(|| anyhow!("Owner of process {pid} is unknown"))?;

        let user = User::from_uid(Uid::from_raw(**uid))
            .with_context(|| format!("Cannot look up uid {}", **uid))?
            .ok_or_else(|| anyhow!("No user with uid {}", **uid))?;
        Ok(user.name)
    }

    fn kill(&self, pid: u32) -> Result<()> {
        let raw = i32::try_from(pid).with_context(|| format!("Invalid PID {pid}"))?;
        kill(NixPid::from_raw(raw), Signal::SIGKILL)
            .with_context(|| format!("Cannot kill process {pid}"))?;
        Ok(())
    }
}
