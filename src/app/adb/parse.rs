use std::sync::OnceLock;

use regex::Regex;

use crate::app::models::{BatteryInfo, DeviceRecord};

pub const BATTERY_BLOB_MAX_CHARS: usize = 1000;

/// Parses `adb devices`. The first line is the header; remaining lines are
/// `serial<TAB>state`.
pub fn parse_adb_devices(output: &str) -> Vec<DeviceRecord> {
    output
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let serial = fields.next()?.trim();
            let state = fields.next()?.trim();
            if serial.is_empty() {
                return None;
            }
            Some(DeviceRecord {
                serial: serial.to_string(),
                state: state.to_string(),
            })
        })
        .collect()
}

/// Serials of devices in the exact `device` state.
pub fn parse_ready_serials(output: &str) -> Vec<String> {
    parse_adb_devices(output)
        .into_iter()
        .filter(DeviceRecord::is_ready)
        .map(|record| record.serial)
        .collect()
}

/// `getprop` answers on the last non-empty line; anything before it is noise
/// such as daemon startup chatter.
pub fn parse_getprop_value(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .last()
        .map(str::to_string)
}

fn battery_level_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"level:\s*(\d+)").expect("valid battery regex"))
}

pub fn parse_battery_level(output: &str) -> Option<u8> {
    battery_level_regex()
        .captures(output)
        .and_then(|caps| caps[1].parse::<u8>().ok())
}

pub fn parse_battery(output: &str) -> BatteryInfo {
    let blob: String = output.trim().chars().take(BATTERY_BLOB_MAX_CHARS).collect();
    let level = parse_battery_level(&blob);
    BatteryInfo { blob, level }
}

pub fn parse_version_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}
