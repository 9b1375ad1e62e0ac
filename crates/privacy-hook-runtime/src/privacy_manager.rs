//! Wrappers that rewritten call sites land on.
//!
//! Each wrapper takes the platform service the original call was made on as
//! its first argument and routes the call through the shared [`ConsentGate`].

use std::sync::Arc;
use tracing::debug;

use crate::gate::ConsentGate;
use crate::platform::{
    ActivityService, ApplicationInfo, CellInfo, DhcpInfo, Location, LocationListener,
    LocationService, NetworkInterface, PackageInfo, PackageService, ProcessInfo, ScanResult,
    Sensor, SensorService, SettingsResolver, TaskInfo, TelephonyService, VersionedPackage,
    WifiConfiguration, WifiConnection, WifiService,
};

/// Cache and audit keys, one per wrapped accessor.
pub mod keys {
    pub const RUNNING_APP_PROCESSES: &str = "getRunningAppProcesses";
    pub const RECENT_TASKS: &str = "getRecentTasks";
    pub const RUNNING_TASKS: &str = "getRunningTasks";
    pub const ALL_CELL_INFO: &str = "getAllCellInfo";
    pub const DEVICE_ID: &str = "getDeviceId";
    pub const IMEI: &str = "getImei";
    pub const SIM_SERIAL_NUMBER: &str = "getSimSerialNumber";
    pub const NETWORK_OPERATOR: &str = "getNetworkOperator";
    pub const MEID: &str = "getMeid";
    pub const SSID: &str = "getSSID";
    pub const BSSID: &str = "getBSSID";
    pub const MAC_ADDRESS: &str = "getMacAddress";
    pub const ANDROID_ID: &str = "ANDROID_ID";
    pub const HARDWARE_ADDRESS: &str = "NetworkInterface-getHardwareAddress";
    pub const SENSOR_LIST: &str = "getSensorList";
    pub const SCAN_RESULTS: &str = "getScanResults";
    pub const DHCP_INFO: &str = "getDhcpInfo";
    pub const CONFIGURED_NETWORKS: &str = "getConfiguredNetworks";
    pub const LAST_KNOWN_LOCATION: &str = "getLastKnownLocation";
    pub const REQUEST_LOCATION_UPDATES: &str = "requestLocationUpdates";
    pub const PACKAGE_INFO: &str = "getPackageInfo";
    pub const INSTALLED_PACKAGES: &str = "getInstalledPackages";
    pub const INSTALLED_APPLICATIONS: &str = "getInstalledApplications";
}

/// Settings name whose value is gated; every other name passes through.
pub const ANDROID_ID_SETTING: &str = "android_id";

#[derive(Debug, Clone)]
pub struct PrivacyManager {
    gate: Arc<ConsentGate>,
}

impl PrivacyManager {
    pub fn new(gate: Arc<ConsentGate>) -> Self {
        Self { gate }
    }

    pub fn gate(&self) -> &Arc<ConsentGate> {
        &self.gate
    }

    pub fn running_app_processes(&self, manager: &dyn ActivityService) -> Vec<ProcessInfo> {
        self.gate.guard(keys::RUNNING_APP_PROCESSES, Vec::new, || {
            manager.running_app_processes()
        })
    }

    /// Cached under one key, so later calls ignore `max_num` and `flags`.
    pub fn recent_tasks(&self, manager: &dyn ActivityService, max_num: i32, flags: i32) -> Vec<TaskInfo> {
        self.gate.guard(keys::RECENT_TASKS, Vec::new, || {
            manager.recent_tasks(max_num, flags)
        })
    }

    pub fn running_tasks(&self, manager: &dyn ActivityService, max_num: i32) -> Vec<TaskInfo> {
        self.gate.guard(keys::RUNNING_TASKS, Vec::new, || manager.running_tasks(max_num))
    }

    pub fn all_cell_info(&self, manager: &dyn TelephonyService) -> Vec<CellInfo> {
        self.gate.guard(keys::ALL_CELL_INFO, Vec::new, || manager.all_cell_info())
    }

    pub fn device_id(&self, manager: &dyn TelephonyService) -> Option<String> {
        self.gate.guard(keys::DEVICE_ID, || None, || manager.device_id())
    }

    /// Never read from the platform, with or without consent.
    pub fn imei(&self, _manager: &dyn TelephonyService) -> Option<String> {
        self.gate.guard(keys::IMEI, || None, || None)
    }

    /// Never read from the platform. Denial yields `""`, consent yields `None`.
    pub fn sim_serial_number(&self, _manager: &dyn TelephonyService) -> Option<String> {
        self.gate
            .guard(keys::SIM_SERIAL_NUMBER, || Some(String::new()), || None)
    }

    pub fn network_operator(&self, manager: &dyn TelephonyService) -> Option<String> {
        self.gate.guard(keys::NETWORK_OPERATOR, || Some(String::new()), || {
            manager.network_operator()
        })
    }

    pub fn meid(&self, manager: &dyn TelephonyService) -> Option<String> {
        self.gate
            .guard(keys::MEID, || Some(String::new()), || manager.meid())
    }

    pub fn ssid(&self, info: &dyn WifiConnection) -> Option<String> {
        self.gate
            .guard(keys::SSID, || Some(String::new()), || info.ssid())
    }

    pub fn bssid(&self, info: &dyn WifiConnection) -> Option<String> {
        self.gate
            .guard(keys::BSSID, || Some(String::new()), || info.bssid())
    }

    pub fn mac_address(&self, info: &dyn WifiConnection) -> Option<String> {
        self.gate
            .guard(keys::MAC_ADDRESS, || Some(String::new()), || info.mac_address())
    }

    /// Secure settings lookup. Only `android_id` is gated and cached.
    pub fn secure_string(&self, resolver: &dyn SettingsResolver, name: &str) -> Option<String> {
        if name != ANDROID_ID_SETTING {
            return resolver.system_string(name);
        }
        self.gate.guard(keys::ANDROID_ID, || Some(String::new()), || {
            resolver.secure_string(name)
        })
    }

    /// System settings lookup, handled like [`Self::secure_string`].
    pub fn system_string(&self, resolver: &dyn SettingsResolver, name: &str) -> Option<String> {
        self.secure_string(resolver, name)
    }

    /// Denial yields a single zero byte.
    pub fn hardware_address(&self, interface: &dyn NetworkInterface) -> Option<Vec<u8>> {
        self.gate.guard(keys::HARDWARE_ADDRESS, || Some(vec![0]), || {
            interface.hardware_address()
        })
    }

    pub fn sensor_list(&self, manager: &dyn SensorService, sensor_type: i32) -> Vec<Sensor> {
        self.gate.guard(keys::SENSOR_LIST, Vec::new, || manager.sensor_list(sensor_type))
    }

    pub fn scan_results(&self, manager: &dyn WifiService) -> Vec<ScanResult> {
        self.gate.guard(keys::SCAN_RESULTS, Vec::new, || manager.scan_results())
    }

    pub fn dhcp_info(&self, manager: &dyn WifiService) -> Option<DhcpInfo> {
        self.gate.guard(keys::DHCP_INFO, || None, || manager.dhcp_info())
    }

    pub fn configured_networks(&self, manager: &dyn WifiService) -> Vec<WifiConfiguration> {
        self.gate.guard(keys::CONFIGURED_NETWORKS, Vec::new, || {
            manager.configured_networks()
        })
    }

    pub fn last_known_location(&self, manager: &dyn LocationService, provider: &str) -> Option<Location> {
        self.gate.guard(keys::LAST_KNOWN_LOCATION, || None, || {
            manager.last_known_location(provider)
        })
    }

    /// Registers the listener only with consent. Without it, nothing happens.
    pub fn request_location_updates(
        &self,
        manager: &dyn LocationService,
        provider: &str,
        min_time_ms: i64,
        min_distance_m: f32,
        listener: Arc<dyn LocationListener>,
    ) {
        self.gate.guard_uncached(keys::REQUEST_LOCATION_UPDATES, || (), || {
            manager.request_location_updates(provider, min_time_ms, min_distance_m, listener)
        })
    }

    pub fn package_info(&self, manager: &dyn PackageService, package_name: &str, flags: i32) -> Option<PackageInfo> {
        debug!(package = package_name, "package info requested");
        self.gate.guard_uncached(keys::PACKAGE_INFO, || None, || {
            manager.package_info(package_name, flags)
        })
    }

    pub fn versioned_package_info(
        &self,
        manager: &dyn PackageService,
        package: &VersionedPackage,
        flags: i32,
    ) -> Option<PackageInfo> {
        debug!(package = %package.package_name, "package info requested");
        self.gate.guard_uncached(keys::PACKAGE_INFO, || None, || {
            manager.versioned_package_info(package, flags)
        })
    }

    pub fn installed_packages(&self, manager: &dyn PackageService, flags: i32) -> Vec<PackageInfo> {
        self.gate.guard_uncached(keys::INSTALLED_PACKAGES, Vec::new, || {
            manager.installed_packages(flags)
        })
    }

    /// Same as [`Self::installed_packages`]; the user id is ignored.
    pub fn installed_packages_as_user(
        &self,
        manager: &dyn PackageService,
        flags: i32,
        _user_id: i32,
    ) -> Vec<PackageInfo> {
        self.installed_packages(manager, flags)
    }

    pub fn installed_applications(&self, manager: &dyn PackageService, flags: i32) -> Vec<ApplicationInfo> {
        self.gate.guard_uncached(keys::INSTALLED_APPLICATIONS, Vec::new, || {
            manager.installed_applications(flags)
        })
    }

    /// Same as [`Self::installed_applications`]; the user id is ignored.
    pub fn installed_applications_as_user(
        &self,
        manager: &dyn PackageService,
        flags: i32,
        _user_id: i32,
    ) -> Vec<ApplicationInfo> {
        self.installed_applications(manager, flags)
    }
}
