//! AC power detection from sysfs

use std::fs;
use std::path::Path;

/// Whether any `Mains` power supply under `power_supply_dir` is online
pub fn is_ac_power_connected(power_supply_dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(power_supply_dir) else {
        return false;
    };

    entries.filter_map(Result::ok).any(|entry| {
        let supply = entry.path();
        let is_mains = fs::read_to_string(supply.join("type")).is_ok_and(|t| t.trim() == "Mains");
        is_mains && fs::read_to_string(supply.join("online")).is_ok_and(|o| o.starts_with('1'))
    })
}
