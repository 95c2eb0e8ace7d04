//! GPU discovery from sysfs

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{BusIdResolver, DriverProbe};
use crate::constants::pci::{DISPLAY_CLASS_PREFIX, VENDOR_AMD, VENDOR_INTEL, VENDOR_NVIDIA};
use crate::types::{BusIds, IntegratedVendor};

/// Scans `/sys/bus/pci/devices` for display controllers
#[derive(Debug, Clone)]
pub struct SysfsBusIds {
    pub devices_dir: PathBuf,
}

impl BusIdResolver for SysfsBusIds {
    fn resolve_bus_ids(&self) -> Result<BusIds> {
        let mut nvidia = None;
        let mut intel = None;
        let mut amd = None;

        let entries = fs::read_dir(&self.devices_dir)
            .with_context(|| format!("Cannot read {}", self.devices_dir.display()))?;

        let mut slots: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
        slots.sort();

        for slot in slots {
            let Some(class) = read_attr(&slot, "class") else { continue };
            if !class.starts_with(DISPLAY_CLASS_PREFIX) {
                continue;
            }
            let Some(vendor) = read_attr(&slot, "vendor") else { continue };
            let Some(name) = slot.file_name().and_then(|n| n.to_str()) else { continue };
            let Some(bus_id) = xorg_bus_id(name) else { continue };

            debug!(slot = name, vendor = %vendor, bus_id = %bus_id, "Found display controller");
            let target = match vendor.as_str() {
                VENDOR_NVIDIA => &mut nvidia,
                VENDOR_INTEL => &mut intel,
                VENDOR_AMD => &mut amd,
                _ => continue,
            };
            target.get_or_insert(bus_id);
        }

        let Some(nvidia) = nvidia else {
            bail!("No NVIDIA GPU found in {}", self.devices_dir.display());
        };
        let (integrated_vendor, integrated) = match (intel, amd) {
            (Some(id), _) => (IntegratedVendor::Intel, id),
            (None, Some(id)) => (IntegratedVendor::Amd, id),
            (None, None) => bail!("No Intel or AMD integrated GPU found"),
        };

        info!(
            nvidia = %nvidia,
            integrated = %integrated,
            vendor = ?integrated_vendor,
            "Resolved GPU bus IDs"
        );
        Ok(BusIds {
            nvidia,
            integrated_vendor,
            integrated,
        })
    }
}

fn read_attr(slot: &Path, attr: &str) -> Option<String> {
    fs::read_to_string(slot.join(attr)).ok().map(|s| s.trim().to_ascii_lowercase())
}

/// `0000:01:00.0` (hex domain:bus:device.function) to `PCI:1:0:0` (decimal).
/// Non-zero domains are written as `PCI:bus@domain:device:function`.
pub fn xorg_bus_id(slot: &str) -> Option<String> {
    let (domain, rest) = slot.split_once(':')?;
    let (bus, rest) = rest.split_once(':')?;
    let (device, function) = rest.split_once('.')?;

    let domain = u32::from_str_radix(domain, 16).ok()?;
    let bus = u32::from_str_radix(bus, 16).ok()?;
    let device = u32::from_str_radix(device, 16).ok()?;
    let function = u32::from_str_radix(function, 16).ok()?;

    Some(if domain == 0 {
        format!("PCI:{bus}:{device}:{function}")
    } else {
        format!("PCI:{bus}@{domain}:{device}:{function}")
    })
}

/// Checks for the vendor DDX module files
#[derive(Debug, Clone)]
pub struct XorgModuleProbe {
    pub drivers_dir: PathBuf,
}

impl DriverProbe for XorgModuleProbe {
    fn vendor_driver_available(&self, vendor: IntegratedVendor) -> bool {
        let file = format!("{}_drv.so", vendor.device().vendor_driver());
        self.drivers_dir.join(file).is_file()
    }
}
