//! xrandr / glxinfo backed display utilities

use anyhow::{Context, Result};
use std::path::Path;

use super::command::{run, run_with_env};
use super::DisplayTools;
use crate::constants::offload::{
    INTEGRATED_PROVIDER_MARKERS, NVIDIA_GLX_VENDOR, NVIDIA_OFFLOAD_PROVIDER,
};

/// Display utilities acting on the X server named by `$DISPLAY`
#[derive(Debug, Default)]
pub struct XrandrTools;

impl DisplayTools for XrandrTools {
    fn list_providers(&self) -> Result<String> {
        run("xrandr", ["--listproviders"]).context("Cannot list xrandr providers")
    }

    fn set_provider_output_source(&self, source: &str, sink: &str) -> Result<()> {
        run("xrandr", ["--setprovideroutputsource", source, sink])
            .with_context(|| format!("Cannot set provider output source {source} -> {sink}"))?;
        Ok(())
    }

    fn auto_configure(&self) -> Result<()> {
        run("xrandr", ["--auto"]).context("xrandr --auto failed")?;
        Ok(())
    }

    fn set_dpi(&self, dpi: &str) -> Result<()> {
        run("xrandr", ["--dpi", dpi]).with_context(|| format!("Cannot set DPI to {dpi}"))?;
        Ok(())
    }

    fn gl_vendor_is_nvidia(&self) -> Result<bool> {
        let out = run_with_env("glxinfo", Vec::<&str>::new(), &[("__NV_PRIME_RENDER_OFFLOAD", "0")])
            .context("Cannot run glxinfo")?;
        Ok(glx_vendor_is_nvidia(&out))
    }

    fn run_xsetup_script(&self, script: &Path) -> Result<()> {
        run("sh", [script.as_os_str()])
            .with_context(|| format!("Cannot run {}", script.display()))?;
        Ok(())
    }
}

/// Lines of `xrandr --listproviders` that describe a provider
fn provider_lines(listing: &str) -> impl Iterator<Item = &str> {
    listing.lines().filter(|line| {
        line.strip_prefix("Provider ")
            .and_then(|rest| rest.split_once(':'))
            .is_some_and(|(index, _)| {
                !index.is_empty() && index.chars().all(|c| c.is_ascii_digit())
            })
    })
}

/// Whether the NVIDIA PRIME render offload provider is advertised
pub fn offload_available(listing: &str) -> bool {
    let needle = format!("name:{NVIDIA_OFFLOAD_PROVIDER}");
    provider_lines(listing).any(|line| line.contains(&needle))
}

/// Name of the Intel or AMD provider, used as the output source
pub fn integrated_provider(listing: &str) -> Option<String> {
    provider_lines(listing).find_map(|line| {
        let (_, name) = line.split_once("name:")?;
        let lower = name.to_ascii_lowercase();
        INTEGRATED_PROVIDER_MARKERS
            .iter()
            .any(|marker| lower.contains(&marker.to_ascii_lowercase()))
            .then(|| name.trim().to_string())
    })
}

pub fn glx_vendor_is_nvidia(glxinfo: &str) -> bool {
    glxinfo.lines().any(|line| line.contains(NVIDIA_GLX_VENDOR))
}
