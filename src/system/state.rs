//! File-backed mode bookkeeping
//!
//! One small text file per value under the state directory, so the values
//! survive reboots and can be inspected by hand.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::{debug, warn};

use super::StateStore;
use crate::startup::StartupMode;
use crate::types::Mode;

const REQUESTED_MODE: &str = "requested_mode";
const APPLIED_MODE: &str = "applied_mode";
const LAST_ERROR: &str = "last_error";
const STARTUP_MODE: &str = "startup_mode";

#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn read(&self, name: &str) -> Result<Option<String>> {
        let path = self.dir.join(name);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents.trim().to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    fn write(&self, name: &str, contents: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create state directory {}", self.dir.display()))?;
        let path = self.dir.join(name);
        fs::write(&path, contents).with_context(|| format!("Failed to write {}", path.display()))?;
        debug!(path = %path.display(), "Saved state");
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {}", path.display())),
        }
    }

    fn read_mode(&self, name: &str) -> Result<Option<Mode>> {
        let Some(value) = self.read(name)? else {
            return Ok(None);
        };
        match value.parse::<Mode>() {
            Ok(mode) => Ok(Some(mode)),
            Err(e) => {
                warn!(
                    file = %self.path(name).display(),
                    error = %e,
                    "Ignoring invalid mode in state file"
                );
                Ok(None)
            }
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Startup mode chosen with `set-startup`, used by `boot` when the
    /// kernel command line has none
    pub fn startup_mode(&self) -> Result<Option<StartupMode>> {
        let Some(value) = self.read(STARTUP_MODE)? else {
            return Ok(None);
        };
        let mode = StartupMode::parse(&value);
        if mode.is_none() {
            warn!(
                file = %self.path(STARTUP_MODE).display(),
                value = %value,
                "Ignoring invalid startup mode"
            );
        }
        Ok(mode)
    }

    pub fn set_startup_mode(&self, mode: StartupMode) -> Result<()> {
        self.write(STARTUP_MODE, mode.as_str())
    }
}

impl StateStore for FileStateStore {
    fn requested_mode(&self) -> Result<Option<Mode>> {
        self.read_mode(REQUESTED_MODE)
    }

    fn set_requested_mode(&self, mode: Mode) -> Result<()> {
        self.write(REQUESTED_MODE, mode.as_str())
    }

    fn applied_mode(&self) -> Result<Option<Mode>> {
        self.read_mode(APPLIED_MODE)
    }

    fn set_applied_mode(&self, mode: Mode) -> Result<()> {
        self.write(APPLIED_MODE, mode.as_str())
    }

    fn last_error(&self) -> Result<Option<String>> {
        self.read(LAST_ERROR)
    }

    fn set_last_error(&self, error: Option<&str>) -> Result<()> {
        match error {
            Some(message) => self.write(LAST_ERROR, message),
            None => self.remove(LAST_ERROR),
        }
    }
}
