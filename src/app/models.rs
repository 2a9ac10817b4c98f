use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEVICE_STATE_READY: &str = "device";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeviceRecord {
    pub serial: String,
    pub state: String,
}

impl DeviceRecord {
    pub fn is_ready(&self) -> bool {
        self.state == DEVICE_STATE_READY
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageRecord {
    pub package_id: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppInfo {
    pub package: String,
    pub version: Option<String>,
    pub target_sdk: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatteryInfo {
    /// At most the first 1000 characters of `dumpsys battery`.
    pub blob: String,
    pub level: Option<u8>,
}

pub const INFO_MODEL: &str = "model";
pub const INFO_BRAND: &str = "brand";
pub const INFO_ANDROID_VERSION: &str = "android_version";
pub const INFO_BATTERY: &str = "battery";
pub const INFO_BATTERY_LEVEL: &str = "battery_level";
pub const INFO_UNKNOWN: &str = "unknown";

/// Field name to value. Each field comes from its own query, so one failing
/// query leaves the others intact.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct DeviceInfo {
    pub fields: BTreeMap<String, String>,
}

impl DeviceInfo {
    pub fn insert(&mut self, field: &str, value: impl Into<String>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn battery_level(&self) -> Option<u8> {
        self.get(INFO_BATTERY_LEVEL)?.parse().ok()
    }
}
