//! Platform accessors the wrappers delegate to, and the values they return.
//!
//! Each trait stands in for one platform service. Hosts implement them over
//! the real services; tests implement them with counters.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::gate::CacheValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub pid: i32,
    pub process_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskInfo {
    pub task_id: i32,
    pub base_activity: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellInfo {
    pub cell_id: i64,
    pub registered: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sensor {
    pub name: String,
    pub sensor_type: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub ssid: String,
    pub bssid: String,
    pub level: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpInfo {
    pub ip_address: u32,
    pub gateway: u32,
    pub dns1: u32,
}

impl CacheValue for DhcpInfo {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiConfiguration {
    pub network_id: i32,
    pub ssid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub provider: String,
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f32,
}

impl CacheValue for Location {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedPackage {
    pub package_name: String,
    pub version_code: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    pub package_name: String,
    pub version_name: Option<String>,
    pub version_code: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationInfo {
    pub package_name: String,
    pub enabled: bool,
}

pub trait ActivityService: Send + Sync {
    fn running_app_processes(&self) -> Vec<ProcessInfo>;
    fn recent_tasks(&self, max_num: i32, flags: i32) -> Vec<TaskInfo>;
    fn running_tasks(&self, max_num: i32) -> Vec<TaskInfo>;
}

/// Identifiers such as the IMEI and SIM serial are never read, so they have
/// no accessor here.
pub trait TelephonyService: Send + Sync {
    fn all_cell_info(&self) -> Vec<CellInfo>;
    fn device_id(&self) -> Option<String>;
    fn network_operator(&self) -> Option<String>;
    fn meid(&self) -> Option<String>;
}

pub trait WifiConnection: Send + Sync {
    fn ssid(&self) -> Option<String>;
    fn bssid(&self) -> Option<String>;
    fn mac_address(&self) -> Option<String>;
}

pub trait WifiService: Send + Sync {
    fn scan_results(&self) -> Vec<ScanResult>;
    fn dhcp_info(&self) -> Option<DhcpInfo>;
    fn configured_networks(&self) -> Vec<WifiConfiguration>;
}

/// Settings store. `secure_string` reads the secure table, `system_string`
/// the system table.
pub trait SettingsResolver: Send + Sync {
    fn secure_string(&self, name: &str) -> Option<String>;
    fn system_string(&self, name: &str) -> Option<String>;
}

pub trait NetworkInterface: Send + Sync {
    fn hardware_address(&self) -> Option<Vec<u8>>;
}

pub trait SensorService: Send + Sync {
    fn sensor_list(&self, sensor_type: i32) -> Vec<Sensor>;
}

pub trait LocationListener: Send + Sync {
    fn on_location_changed(&self, location: &Location);
}

pub trait LocationService: Send + Sync {
    fn last_known_location(&self, provider: &str) -> Option<Location>;
    fn request_location_updates(
        &self,
        provider: &str,
        min_time_ms: i64,
        min_distance_m: f32,
        listener: Arc<dyn LocationListener>,
    );
}

pub trait PackageService: Send + Sync {
    fn package_info(&self, package_name: &str, flags: i32) -> Option<PackageInfo>;
    fn versioned_package_info(&self, package: &VersionedPackage, flags: i32) -> Option<PackageInfo>;
    fn installed_packages(&self, flags: i32) -> Vec<PackageInfo>;
    fn installed_applications(&self, flags: i32) -> Vec<ApplicationInfo>;
}
