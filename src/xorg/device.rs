//! `Device` section builder

use std::fmt;

use crate::config::{IntegratedDriver, NvidiaFlag, OptionSet};
use crate::constants::xorg::MODESETTING_DRIVER;
use crate::types::GpuDevice;

/// One generated `Device` stanza
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSection {
    pub identifier: &'static str,
    pub driver: &'static str,
    pub bus_id: String,
    /// Option lines in emission order, without indentation
    pub options: Vec<String>,
}

impl fmt::Display for DeviceSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Section \"Device\"")?;
        writeln!(f, "\tIdentifier \"{}\"", self.identifier)?;
        writeln!(f, "\tDriver \"{}\"", self.driver)?;
        writeln!(f, "\tBusID \"{}\"", self.bus_id)?;
        for line in &self.options {
            writeln!(f, "\t{line}")?;
        }
        writeln!(f, "EndSection")?;
        writeln!(f)
    }
}

/// Outcome of the integrated driver policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDriver {
    pub name: &'static str,
    /// The vendor driver was requested but is not installed
    pub fell_back: bool,
}

impl ResolvedDriver {
    pub fn is_vendor(&self) -> bool {
        self.name != MODESETTING_DRIVER
    }
}

/// Vendor driver only when requested and installed, `modesetting` otherwise
pub fn resolve_integrated_driver(
    device: GpuDevice,
    options: &OptionSet,
    driver_available: bool,
) -> ResolvedDriver {
    match options.integrated.driver {
        IntegratedDriver::Xorg if driver_available => ResolvedDriver {
            name: device.vendor_driver(),
            fell_back: false,
        },
        IntegratedDriver::Xorg => ResolvedDriver {
            name: MODESETTING_DRIVER,
            fell_back: true,
        },
        IntegratedDriver::Modesetting => ResolvedDriver {
            name: MODESETTING_DRIVER,
            fell_back: false,
        },
    }
}

/// Build the `Device` section for `device`.
///
/// `driver_available` only matters for integrated devices; the NVIDIA
/// section always uses the proprietary driver the `Files` section points at.
pub fn build_device_section(
    device: GpuDevice,
    bus_id: &str,
    options: &OptionSet,
    driver_available: bool,
) -> DeviceSection {
    let (driver, mut lines) = match device {
        GpuDevice::Nvidia => (device.vendor_driver(), nvidia_options(options)),
        GpuDevice::Intel | GpuDevice::Amd => {
            let resolved = resolve_integrated_driver(device, options, driver_available);
            (resolved.name, integrated_options(device, options, resolved))
        }
    };

    lines.extend(options.extra_lines_for(device).iter().cloned());

    DeviceSection {
        identifier: device.identifier(),
        driver,
        bus_id: bus_id.to_string(),
        options: lines,
    }
}

fn nvidia_options(options: &OptionSet) -> Vec<String> {
    let mut lines = Vec::new();
    if options.nvidia.has_flag(NvidiaFlag::Overclocking) {
        lines.push("Option \"Coolbits\" \"28\"".to_string());
    }
    if options.nvidia.has_flag(NvidiaFlag::TripleBuffer) {
        lines.push("Option \"TripleBuffer\" \"true\"".to_string());
    }
    lines
}

fn integrated_options(
    device: GpuDevice,
    options: &OptionSet,
    driver: ResolvedDriver,
) -> Vec<String> {
    let integrated = &options.integrated;
    let mut lines = Vec::new();

    // The amdgpu driver has no AccelMethod option.
    if device == GpuDevice::Intel && !integrated.accel.is_empty() {
        lines.push(format!("Option \"AccelMethod\" \"{}\"", integrated.accel));
    }

    if driver.is_vendor() {
        if let Some(value) = integrated.tearfree.as_xorg_bool() {
            lines.push(format!("Option \"TearFree\" \"{value}\""));
        }
    }

    lines.push(format!("Option \"DRI\" \"{}\"", integrated.dri));
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Toggle;

    fn xorg_driver_options() -> OptionSet {
        let mut options = OptionSet::default();
        options.integrated.driver = IntegratedDriver::Xorg;
        options
    }

    #[test]
    fn test_vendor_driver_when_requested_and_available() {
        let section =
            build_device_section(GpuDevice::Intel, "PCI:0:2:0", &xorg_driver_options(), true);
        assert_eq!(section.driver, "intel");

        let section =
            build_device_section(GpuDevice::Amd, "PCI:5:0:0", &xorg_driver_options(), true);
        assert_eq!(section.driver, "amdgpu");
        assert_eq!(section.identifier, "amd");
    }

    #[test]
    fn test_unavailable_driver_falls_back_for_every_request() {
        for driver in [IntegratedDriver::Xorg, IntegratedDriver::Modesetting] {
            for device in [GpuDevice::Intel, GpuDevice::Amd] {
                let mut options = OptionSet::default();
                options.integrated.driver = driver;
                let section = build_device_section(device, "PCI:0:2:0", &options, false);
                assert_eq!(section.driver, "modesetting");
            }
        }
    }

    #[test]
    fn test_fallback_is_reported() {
        let resolved = resolve_integrated_driver(GpuDevice::Intel, &xorg_driver_options(), false);
        assert!(resolved.fell_back);
        assert!(!resolved.is_vendor());

        let resolved = resolve_integrated_driver(GpuDevice::Intel, &OptionSet::default(), false);
        assert!(!resolved.fell_back);
    }

    #[test]
    fn test_tearfree_never_under_modesetting() {
        for tearfree in [Toggle::Yes, Toggle::No, Toggle::Unset] {
            for (driver, available) in [
                (IntegratedDriver::Modesetting, true),
                (IntegratedDriver::Modesetting, false),
                (IntegratedDriver::Xorg, false),
            ] {
                let mut options = OptionSet::default();
                options.integrated.driver = driver;
                options.integrated.tearfree = tearfree;
                let section =
                    build_device_section(GpuDevice::Intel, "PCI:0:2:0", &options, available);
                assert!(section.options.iter().all(|l| !l.contains("TearFree")));
            }
        }
    }

    #[test]
    fn test_tearfree_with_vendor_driver() {
        let mut options = xorg_driver_options();
        options.integrated.tearfree = Toggle::No;
        let section = build_device_section(GpuDevice::Amd, "PCI:5:0:0", &options, true);
        assert_eq!(
            section.options,
            vec!["Option \"TearFree\" \"false\"", "Option \"DRI\" \"3\""]
        );
    }

    #[test]
    fn test_accel_method_is_intel_only() {
        let mut options = xorg_driver_options();
        options.integrated.accel = "sna".to_string();

        let intel = build_device_section(GpuDevice::Intel, "PCI:0:2:0", &options, true);
        assert_eq!(intel.options[0], "Option \"AccelMethod\" \"sna\"");

        let amd = build_device_section(GpuDevice::Amd, "PCI:5:0:0", &options, true);
        assert!(amd.options.iter().all(|l| !l.contains("AccelMethod")));

        let nvidia = build_device_section(GpuDevice::Nvidia, "PCI:1:0:0", &options, true);
        assert!(nvidia.options.iter().all(|l| !l.contains("AccelMethod")));
    }

    #[test]
    fn test_dri_value_verbatim() {
        let mut options = OptionSet::default();
        options.integrated.dri = 2;
        let section = build_device_section(GpuDevice::Intel, "PCI:0:2:0", &options, false);
        assert_eq!(section.options, vec!["Option \"DRI\" \"2\""]);
    }

    #[test]
    fn test_extra_lines_follow_structured_options() {
        let mut options = xorg_driver_options();
        options.integrated.tearfree = Toggle::Yes;
        options.extra_lines.insert(
            GpuDevice::Intel,
            vec!["Option \"Backlight\" \"b\"".to_string(), "Option \"A\" \"1\"".to_string()],
        );
        options
            .extra_lines
            .insert(GpuDevice::Nvidia, vec!["Option \"NoLogo\" \"1\"".to_string()]);

        let intel = build_device_section(GpuDevice::Intel, "PCI:0:2:0", &options, true);
        assert_eq!(
            intel.options,
            vec![
                "Option \"TearFree\" \"true\"",
                "Option \"DRI\" \"3\"",
                "Option \"Backlight\" \"b\"",
                "Option \"A\" \"1\"",
            ]
        );

        let nvidia = build_device_section(GpuDevice::Nvidia, "PCI:1:0:0", &options, true);
        assert_eq!(
            nvidia.options,
            vec!["Option \"Coolbits\" \"28\"", "Option \"NoLogo\" \"1\""]
        );
    }

    #[test]
    fn test_nvidia_section_text() {
        let mut options = OptionSet::default();
        options.nvidia.options = vec![NvidiaFlag::Overclocking, NvidiaFlag::TripleBuffer];
        let section = build_device_section(GpuDevice::Nvidia, "PCI:1:0:0", &options, false);

        assert_eq!(
            section.to_string(),
            "Section \"Device\"\n\
             \tIdentifier \"nvidia\"\n\
             \tDriver \"nvidia\"\n\
             \tBusID \"PCI:1:0:0\"\n\
             \tOption \"Coolbits\" \"28\"\n\
             \tOption \"TripleBuffer\" \"true\"\n\
             EndSection\n\n"
        );
    }
}
