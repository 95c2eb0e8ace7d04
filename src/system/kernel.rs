//! modprobe-based kernel module setup

use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use tracing::{debug, info};

use super::command::{run, succeeds};
use super::KernelSetup;
use crate::config::OptionSet;
use crate::constants::kernel::{NVIDIA_DRM_MODULE, NVIDIA_MODULES};
use crate::constants::paths;
use crate::types::Mode;

#[derive(Debug, Clone)]
pub struct ModprobeKernel {
    /// `/proc/modules` or a copy of it
    pub modules_file: PathBuf,
}

impl Default for ModprobeKernel {
    fn default() -> Self {
        Self {
            modules_file: PathBuf::from(paths::PROC_MODULES),
        }
    }
}

impl ModprobeKernel {
    fn loaded_modules(&self) -> Result<HashSet<String>> {
        let contents = fs::read_to_string(&self.modules_file)
            .with_context(|| format!("Cannot read {}", self.modules_file.display()))?;
        Ok(parse_loaded_modules(&contents))
    }
}

impl KernelSetup for ModprobeKernel {
    fn setup_kernel_state(&self, options: &OptionSet, mode: Mode) -> Result<()> {
        if mode.uses_nvidia() && !succeeds("modinfo", [NVIDIA_DRM_MODULE]) {
            bail!("Kernel module {NVIDIA_DRM_MODULE} is not installed");
        }

        let loaded = self.loaded_modules()?;
        let Some(args) = modprobe_args(options, mode, &loaded) else {
            debug!(mode = %mode, "NVIDIA modules already unloaded");
            return Ok(());
        };

        info!(mode = %mode, args = ?args, "Setting up kernel modules");
        run("modprobe", &args)
            .with_context(|| format!("Cannot set up kernel modules for {mode} mode"))?;
        Ok(())
    }
}

/// Module names from `/proc/modules` (first field of each line)
pub fn parse_loaded_modules(contents: &str) -> HashSet<String> {
    contents
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(str::to_string)
        .collect()
}

/// `modprobe` arguments for `mode`, `None` when there is nothing to do.
///
/// The NVIDIA stack is loaded for the discrete and hybrid modes. For
/// integrated mode only the modules in `loaded` are removed, dependents
/// first.
pub fn modprobe_args(
    options: &OptionSet,
    mode: Mode,
    loaded: &HashSet<String>,
) -> Option<Vec<String>> {
    if mode.uses_nvidia() {
        let mut args = vec![NVIDIA_DRM_MODULE.to_string()];
        if options.nvidia.modeset {
            args.push("modeset=1".to_string());
        }
        return Some(args);
    }

    let unload: Vec<String> = NVIDIA_MODULES
        .iter()
        .rev()
        .filter(|m| loaded.contains(**m))
        .map(|m| m.to_string())
        .collect();
    if unload.is_empty() {
        return None;
    }
    Some(std::iter::once("-r".to_string()).chain(unload).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const LOADED_ALL: &str = "\
nvidia_drm 73728 4 - Live 0x0000000000000000
nvidia_uvm 1400832 0 - Live 0x0000000000000000
nvidia_modeset 1142784 8 nvidia_drm, Live 0x0000000000000000
nvidia 39067648 456 nvidia_uvm,nvidia_modeset, Live 0x0000000000000000 (POE)
i915 3796992 38 - Live 0x0000000000000000
";

    const LOADED_NO_UVM: &str = "\
nvidia_drm 73728 4 - Live 0x0000000000000000
nvidia_modeset 1142784 8 nvidia_drm, Live 0x0000000000000000
nvidia 39067648 456 nvidia_modeset, Live 0x0000000000000000 (POE)
";

    #[test]
    fn test_nvidia_modes_load_drm_with_modeset() {
        let options = OptionSet::default();
        let loaded = HashSet::new();
        assert_eq!(
            modprobe_args(&options, Mode::Discrete, &loaded).unwrap(),
            vec!["nvidia_drm", "modeset=1"]
        );
        assert_eq!(
            modprobe_args(&options, Mode::Hybrid, &loaded).unwrap(),
            vec!["nvidia_drm", "modeset=1"]
        );
    }

    #[test]
    fn test_modeset_disabled() {
        let mut options = OptionSet::default();
        options.nvidia.modeset = false;
        let loaded = HashSet::new();
        assert_eq!(modprobe_args(&options, Mode::Hybrid, &loaded).unwrap(), vec!["nvidia_drm"]);
    }

    #[test]
    fn test_integrated_unloads_in_reverse_order() {
        let loaded = parse_loaded_modules(LOADED_ALL);
        assert_eq!(
            modprobe_args(&OptionSet::default(), Mode::Integrated, &loaded).unwrap(),
            vec!["-r", "nvidia_drm", "nvidia_uvm", "nvidia_modeset", "nvidia"]
        );
    }

    #[test]
    fn test_integrated_unloads_only_loaded_modules() {
        let loaded = parse_loaded_modules(LOADED_NO_UVM);
        assert_eq!(
            modprobe_args(&OptionSet::default(), Mode::Integrated, &loaded).unwrap(),
            vec!["-r", "nvidia_drm", "nvidia_modeset", "nvidia"]
        );
    }

    #[test]
    fn test_integrated_with_nothing_loaded_is_noop() {
        let loaded = parse_loaded_modules("i915 3796992 38 - Live 0x0000000000000000\n");
        assert_eq!(modprobe_args(&OptionSet::default(), Mode::Integrated, &loaded), None);
        assert_eq!(modprobe_args(&OptionSet::default(), Mode::Integrated, &HashSet::new()), None);
    }

    #[test]
    fn test_parse_loaded_modules() {
        let loaded = parse_loaded_modules(LOADED_ALL);
        assert_eq!(loaded.len(), 5);
        assert!(loaded.contains("nvidia_uvm"));
        assert!(!loaded.contains("Live"));
    }

    #[test]
    fn test_repeated_integrated_setup_runs_no_command() {
        let dir = TempDir::new().unwrap();
        let modules = dir.path().join("modules");
        fs::write(&modules, "i915 3796992 38 - Live 0x0000000000000000\n").unwrap();

        let kernel = ModprobeKernel { modules_file: modules };
        let options = OptionSet::default();
        kernel.setup_kernel_state(&options, Mode::Integrated).unwrap();
        kernel.setup_kernel_state(&options, Mode::Integrated).unwrap();
    }

    #[test]
    fn test_unreadable_module_list_is_error() {
        let dir = TempDir::new().unwrap();
        let kernel = ModprobeKernel {
            modules_file: dir.path().join("absent"),
        };
        assert!(kernel.setup_kernel_state(&OptionSet::default(), Mode::Integrated).is_err());
    }
}
