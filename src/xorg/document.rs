//! Xorg configuration document assembly
//!
//! Section order is part of the output contract: Xorg lets a later option
//! override an earlier one with the same key, so the text is built in a
//! fixed order per mode and never reordered.

use std::fmt::Write as _;

use crate::config::OptionSet;
use crate::constants::xorg::{LAYOUT_IDENTIFIER, MODULE_PATHS};
use crate::types::{BusIds, GpuDevice, Mode};

use super::device::build_device_section;

/// Generate the complete configuration text for `mode`.
pub fn assemble_document(
    mode: Mode,
    bus_ids: &BusIds,
    options: &OptionSet,
    driver_available: bool,
) -> String {
    let integrated = bus_ids.integrated_device();
    let nvidia_device = || {
        build_device_section(GpuDevice::Nvidia, &bus_ids.nvidia, options, driver_available)
            .to_string()
    };
    let integrated_device = || {
        build_device_section(integrated, &bus_ids.integrated, options, driver_available)
            .to_string()
    };
    let allow_external = options.nvidia.allow_external_gpus;

    let mut text = String::new();
    match mode {
        Mode::Discrete => {
            text += &files_section();
            text += &layout_section(GpuDevice::Nvidia, integrated, &[]);
            text += &nvidia_device();
            text += &screen_section(
                GpuDevice::Nvidia,
                &screen_options(&["AllowEmptyInitialConfiguration"], allow_external),
            );
            text += &integrated_device();
            text += &screen_section(integrated, &[]);
            text += &server_flags_section(options);
        }
        Mode::Integrated => {
            text += &integrated_device();
        }
        Mode::Hybrid => {
            let mut layout_options = Vec::new();
            if let Some(value) = options.integrated.reverseprime.as_xorg_bool() {
                layout_options.push(format!("Option \"AllowPRIMEDisplayOffloadSink\" \"{value}\""));
            }
            layout_options.push("Option \"AllowNVIDIAGPUScreens\"".to_string());

            text += &layout_section(integrated, GpuDevice::Nvidia, &layout_options);
            text += &integrated_device();
            text += &screen_section(integrated, &screen_options(&[], allow_external));
            text += &nvidia_device();
            text += &screen_section(GpuDevice::Nvidia, &[]);
            text += &server_flags_section(options);
        }
    }
    text
}

fn files_section() -> String {
    let mut text = String::from("Section \"Files\"\n");
    for path in MODULE_PATHS {
        let _ = writeln!(text, "\tModulePath \"{path}\"");
    }
    text.push_str("EndSection\n\n");
    text
}

fn layout_section(active: GpuDevice, inactive: GpuDevice, options: &[String]) -> String {
    let mut text = String::from("Section \"ServerLayout\"\n");
    let _ = writeln!(text, "\tIdentifier \"{LAYOUT_IDENTIFIER}\"");
    let _ = writeln!(text, "\tScreen 0 \"{}\"", active.identifier());
    let _ = writeln!(text, "\tInactive \"{}\"", inactive.identifier());
    for line in options {
        let _ = writeln!(text, "\t{line}");
    }
    text.push_str("EndSection\n\n");
    text
}

fn screen_options(fixed: &[&str], allow_external_gpus: bool) -> Vec<String> {
    let mut lines: Vec<String> = fixed.iter().map(|name| format!("Option \"{name}\"")).collect();
    if allow_external_gpus {
        lines.push("Option \"AllowExternalGpus\"".to_string());
    }
    lines
}

fn screen_section(device: GpuDevice, options: &[String]) -> String {
    let mut text = String::from("Section \"Screen\"\n");
    let _ = writeln!(text, "\tIdentifier \"{}\"", device.identifier());
    let _ = writeln!(text, "\tDevice \"{}\"", device.identifier());
    for line in options {
        let _ = writeln!(text, "\t{line}");
    }
    text.push_str("EndSection\n\n");
    text
}

/// Empty unless `ignore_abi` is set
fn server_flags_section(options: &OptionSet) -> String {
    if options.nvidia.ignore_abi {
        "Section \"ServerFlags\"\n\tOption \"IgnoreABI\" \"1\"\nEndSection\n\n".to_string()
    } else {
        String::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IntegratedDriver;
    use crate::types::{IntegratedVendor, Toggle};

    fn bus_ids(vendor: IntegratedVendor) -> BusIds {
        BusIds {
            nvidia: "PCI:1:0:0".to_string(),
            integrated_vendor: vendor,
            integrated: "PCI:0:2:0".to_string(),
        }
    }

    /// `(section type, identifier)` for every stanza, in document order
    fn stanzas(text: &str) -> Vec<(String, Option<String>)> {
        let mut result = Vec::new();
        let mut current: Option<(String, Option<String>)> = None;
        for line in text.lines() {
            if let Some(kind) = line.strip_prefix("Section ") {
                current = Some((kind.trim_matches('"').to_string(), None));
            } else if let Some(id) = line.trim().strip_prefix("Identifier ") {
                if let Some((_, ident)) = current.as_mut() {
                    *ident = Some(id.trim_matches('"').to_string());
                }
            } else if line == "EndSection" {
                result.push(current.take().expect("EndSection without Section"));
            }
        }
        assert!(current.is_none(), "unterminated section");
        result
    }

    fn kinds(text: &str) -> Vec<String> {
        stanzas(text).into_iter().map(|(kind, _)| kind).collect()
    }

    fn count(text: &str, kind: &str) -> usize {
        kinds(text).iter().filter(|k| *k == kind).count()
    }

    fn option_variants() -> Vec<OptionSet> {
        let mut variants = Vec::new();
        for driver in [IntegratedDriver::Xorg, IntegratedDriver::Modesetting] {
            for flag in [false, true] {
                let mut options = OptionSet::default();
                options.integrated.driver = driver;
                options.integrated.tearfree = if flag { Toggle::Yes } else { Toggle::No };
                options.integrated.reverseprime = if flag { Toggle::Yes } else { Toggle::Unset };
                options.integrated.accel = if flag { "sna".to_string() } else { String::new() };
                options.nvidia.allow_external_gpus = flag;
                variants.push(options);
            }
        }
        variants
    }

    #[test]
    fn test_stanza_order_is_fixed_per_mode() {
        let expected = [
            (Mode::Discrete, vec!["Files", "ServerLayout", "Device", "Screen", "Device", "Screen"]),
            (Mode::Integrated, vec!["Device"]),
            (Mode::Hybrid, vec!["ServerLayout", "Device", "Screen", "Device", "Screen"]),
        ];

        for vendor in [IntegratedVendor::Intel, IntegratedVendor::Amd] {
            for options in option_variants() {
                for available in [false, true] {
                    for (mode, order) in &expected {
                        let text = assemble_document(*mode, &bus_ids(vendor), &options, available);
                        assert_eq!(&kinds(&text), order, "mode={mode} vendor={vendor:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_section_counts() {
        let options = OptionSet::default();
        let ids = bus_ids(IntegratedVendor::Intel);

        let hybrid = assemble_document(Mode::Hybrid, &ids, &options, true);
        assert_eq!(count(&hybrid, "Device"), 2);
        assert_eq!(count(&hybrid, "Screen"), 2);

        let integrated = assemble_document(Mode::Integrated, &ids, &options, true);
        assert_eq!(count(&integrated, "Device"), 1);
        assert_eq!(count(&integrated, "ServerLayout"), 0);

        let discrete = assemble_document(Mode::Discrete, &ids, &options, true);
        assert_eq!(count(&discrete, "Device"), 2);
        assert_eq!(count(&discrete, "Screen"), 2);
        assert_eq!(count(&discrete, "ServerLayout"), 1);
    }

    #[test]
    fn test_layout_references_existing_screens() {
        let options = OptionSet::default();
        for vendor in [IntegratedVendor::Intel, IntegratedVendor::Amd] {
            for mode in [Mode::Discrete, Mode::Hybrid] {
                let text = assemble_document(mode, &bus_ids(vendor), &options, false);
                let screens: Vec<String> = stanzas(&text)
                    .into_iter()
                    .filter(|(kind, _)| kind == "Screen")
                    .filter_map(|(_, id)| id)
                    .collect();

                for line in text.lines() {
                    let line = line.trim();
                    let reference = line
                        .strip_prefix("Screen 0 ")
                        .or_else(|| line.strip_prefix("Inactive "));
                    if let Some(reference) = reference {
                        assert!(screens.contains(&reference.trim_matches('"').to_string()));
                    }
                }
            }
        }
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let mut options = OptionSet::default();
        options.integrated.driver = IntegratedDriver::Xorg;
        options.nvidia.ignore_abi = true;
        let ids = bus_ids(IntegratedVendor::Amd);

        for mode in [Mode::Discrete, Mode::Integrated, Mode::Hybrid] {
            assert_eq!(
                assemble_document(mode, &ids, &options, true),
                assemble_document(mode, &ids, &options, true)
            );
        }
    }

    #[test]
    fn test_discrete_intel_document() {
        let mut options = OptionSet::default();
        options.integrated.driver = IntegratedDriver::Xorg;
        let ids = bus_ids(IntegratedVendor::Intel);

        let expected = "Section \"Files\"\n\
            \tModulePath \"/usr/lib/nvidia\"\n\
            \tModulePath \"/usr/lib32/nvidia\"\n\
            \tModulePath \"/usr/lib32/nvidia/xorg/modules\"\n\
            \tModulePath \"/usr/lib32/xorg/modules\"\n\
            \tModulePath \"/usr/lib64/nvidia/xorg/modules\"\n\
            \tModulePath \"/usr/lib64/nvidia/xorg\"\n\
            \tModulePath \"/usr/lib64/xorg/modules\"\n\
            EndSection\n\n\
            Section \"ServerLayout\"\n\
            \tIdentifier \"layout\"\n\
            \tScreen 0 \"nvidia\"\n\
            \tInactive \"intel\"\n\
            EndSection\n\n\
            Section \"Device\"\n\
            \tIdentifier \"nvidia\"\n\
            \tDriver \"nvidia\"\n\
            \tBusID \"PCI:1:0:0\"\n\
            \tOption \"Coolbits\" \"28\"\n\
            EndSection\n\n\
            Section \"Screen\"\n\
            \tIdentifier \"nvidia\"\n\
            \tDevice \"nvidia\"\n\
            \tOption \"AllowEmptyInitialConfiguration\"\n\
            EndSection\n\n\
            Section \"Device\"\n\
            \tIdentifier \"intel\"\n\
            \tDriver \"DRIVER\"\n\
            \tBusID \"PCI:0:2:0\"\n\
            \tOption \"DRI\" \"3\"\n\
            EndSection\n\n\
            Section \"Screen\"\n\
            \tIdentifier \"intel\"\n\
            \tDevice \"intel\"\n\
            EndSection\n\n";

        assert_eq!(
            assemble_document(Mode::Discrete, &ids, &options, false),
            expected.replace("DRIVER", "modesetting")
        );
        assert_eq!(
            assemble_document(Mode::Discrete, &ids, &options, true),
            expected.replace("DRIVER", "intel")
        );
    }

    #[test]
    fn test_discrete_screen_allows_external_gpus() {
        let mut options = OptionSet::default();
        options.nvidia.allow_external_gpus = true;
        let text =
            assemble_document(Mode::Discrete, &bus_ids(IntegratedVendor::Intel), &options, false);

        assert!(text.contains(
            "Section \"Screen\"\n\
             \tIdentifier \"nvidia\"\n\
             \tDevice \"nvidia\"\n\
             \tOption \"AllowEmptyInitialConfiguration\"\n\
             \tOption \"AllowExternalGpus\"\n\
             EndSection\n\n"
        ));
    }

    #[test]
    fn test_integrated_amd_is_single_device() {
        let text = assemble_document(
            Mode::Integrated,
            &bus_ids(IntegratedVendor::Amd),
            &OptionSet::default(),
            true,
        );

        assert_eq!(
            text,
            "Section \"Device\"\n\
             \tIdentifier \"amd\"\n\
             \tDriver \"modesetting\"\n\
             \tBusID \"PCI:0:2:0\"\n\
             \tOption \"DRI\" \"3\"\n\
             EndSection\n\n"
        );
        assert!(!text.contains("ServerFlags"));
    }

    #[test]
    fn test_hybrid_layout_with_reverse_prime() {
        let mut options = OptionSet::default();
        options.integrated.reverseprime = Toggle::Yes;
        options.nvidia.allow_external_gpus = true;
        options.nvidia.ignore_abi = true;
        let text =
            assemble_document(Mode::Hybrid, &bus_ids(IntegratedVendor::Intel), &options, false);

        let expected = "Section \"ServerLayout\"\n\
            \tIdentifier \"layout\"\n\
            \tScreen 0 \"intel\"\n\
            \tInactive \"nvidia\"\n\
            \tOption \"AllowPRIMEDisplayOffloadSink\" \"true\"\n\
            \tOption \"AllowNVIDIAGPUScreens\"\n\
            EndSection\n\n\
            Section \"Device\"\n\
            \tIdentifier \"intel\"\n\
            \tDriver \"modesetting\"\n\
            \tBusID \"PCI:0:2:0\"\n\
            \tOption \"DRI\" \"3\"\n\
            EndSection\n\n\
            Section \"Screen\"\n\
            \tIdentifier \"intel\"\n\
            \tDevice \"intel\"\n\
            \tOption \"AllowExternalGpus\"\n\
            EndSection\n\n\
            Section \"Device\"\n\
            \tIdentifier \"nvidia\"\n\
            \tDriver \"nvidia\"\n\
            \tBusID \"PCI:1:0:0\"\n\
            \tOption \"Coolbits\" \"28\"\n\
            EndSection\n\n\
            Section \"Screen\"\n\
            \tIdentifier \"nvidia\"\n\
            \tDevice \"nvidia\"\n\
            EndSection\n\n\
            Section \"ServerFlags\"\n\
            \tOption \"IgnoreABI\" \"1\"\n\
            EndSection\n\n";

        assert_eq!(text, expected);
    }

    #[test]
    fn test_hybrid_reverse_prime_unset_omits_option() {
        let text = assemble_document(
            Mode::Hybrid,
            &bus_ids(IntegratedVendor::Amd),
            &OptionSet::default(),
            false,
        );
        assert!(!text.contains("AllowPRIMEDisplayOffloadSink"));
        assert!(text.contains(
            "\tScreen 0 \"amd\"\n\tInactive \"nvidia\"\n\tOption \"AllowNVIDIAGPUScreens\"\n"
        ));
    }

    #[test]
    fn test_hybrid_reverse_prime_disabled() {
        let mut options = OptionSet::default();
        options.integrated.reverseprime = Toggle::No;
        let text =
            assemble_document(Mode::Hybrid, &bus_ids(IntegratedVendor::Intel), &options, false);
        assert!(text.contains("\tOption \"AllowPRIMEDisplayOffloadSink\" \"false\"\n"));
    }

    #[test]
    fn test_server_flags_only_with_ignore_abi() {
        let ids = bus_ids(IntegratedVendor::Intel);
        let mut options = OptionSet::default();
        for mode in [Mode::Discrete, Mode::Hybrid, Mode::Integrated] {
            assert!(!assemble_document(mode, &ids, &options, false).contains("ServerFlags"));
        }

        options.nvidia.ignore_abi = true;
        assert!(assemble_document(Mode::Discrete, &ids, &options, false)
            .ends_with("Section \"ServerFlags\"\n\tOption \"IgnoreABI\" \"1\"\nEndSection\n\n"));
        let text = assemble_document(Mode::Integrated, &ids, &options, false);
        assert!(!text.contains("ServerFlags"));
    }
}
