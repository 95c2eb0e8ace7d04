//! Transition phases and errors

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Orchestrator phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Preflight,
    Teardown,
    Cleanup,
    Kernel,
    Xorg,
    Wiring,
    Dpi,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Preflight => "preflight",
            Phase::Teardown => "teardown",
            Phase::Cleanup => "cleanup",
            Phase::Kernel => "kernel",
            Phase::Xorg => "xorg",
            Phase::Wiring => "wiring",
            Phase::Dpi => "dpi",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("an X server is already running")]
    XorgRunning,

    #[error("external tool failed: {0}")]
    ExternalTool(String),

    #[error("cannot update {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cancelled")]
    Cancelled,
}

#[derive(Debug, Error)]
#[error("{phase} phase failed: {kind}")]
pub struct TransitionError {
    pub phase: Phase,
    pub kind: ErrorKind,
}

impl TransitionError {
    pub fn new(phase: Phase, kind: ErrorKind) -> Self {
        Self { phase, kind }
    }

    pub fn external(phase: Phase, error: &anyhow::Error) -> Self {
        Self::new(phase, ErrorKind::ExternalTool(format!("{error:#}")))
    }

    pub fn filesystem(phase: Phase, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::new(
            phase,
            ErrorKind::Filesystem {
                path: path.into(),
                source,
            },
        )
    }

    /// Whether the freshly written configuration survives this error.
    /// Only the session phases run after the file is in place.
    pub fn keeps_new_config(&self) -> bool {
        matches!(self.phase, Phase::Wiring | Phase::Dpi)
    }
}

/// Non-fatal problem recorded during a transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub phase: Phase,
    pub message: String,
}
