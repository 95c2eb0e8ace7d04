//! Configuration management for prime-switch
//!
//! - **options**: the per-mode option set read from the TOML option file
//!   and the per-device extra Xorg line files

pub mod options;

pub use options::{IntegratedDriver, NvidiaFlag, OptionSet};
