//! Device metadata
//!
//! `DeviceRecord` is the loosely-typed entry returned by the inventory
//! collaborator (and stored in the inventory cache). `Device` is the resolved,
//! immutable view the rest of the crate works with.

pub mod model;

use serde::{Deserialize, Serialize};

pub use model::{Capability, CapabilitySet, ModelProfile, StreamQuality};

/// Manufacturer reported on the control channel
pub const MANUFACTURER: &str = "Wyze";

/// Raw device entry as returned by the inventory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Hardware address, used as the device identifier
    pub mac: String,
    /// User-assigned name
    #[serde(default)]
    pub nickname: String,
    /// Product model code
    #[serde(default)]
    pub product_model: String,
    /// Product type ("Camera", "Plug", ...)
    #[serde(default)]
    pub product_type: String,
    /// Firmware version
    #[serde(default, rename = "firmware_ver")]
    pub firmware_version: String,
    /// Last known LAN address
    #[serde(default)]
    pub ip: Option<String>,
    /// Whether the cloud considers the device online
    #[serde(default, rename = "device_online")]
    pub online: bool,
    /// P2P identifier
    #[serde(default)]
    pub p2p_id: String,
    /// P2P connection type
    #[serde(default)]
    pub p2p_type: i32,
    /// P2P encryption token
    #[serde(default, rename = "enr")]
    pub enr_token: String,
    /// Whether DTLS is required
    #[serde(default)]
    pub parent_dtls: i32,
}

/// Opaque parameters the native session needs to reach the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct P2pParams {
    /// P2P identifier
    pub p2p_id: String,
    /// P2P connection type
    pub p2p_type: i32,
    /// Encryption token
    pub enr_token: String,
    /// DTLS flag
    pub dtls: bool,
}

/// A camera known to the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Hardware address
    pub mac: String,
    /// Display name
    pub name: String,
    /// Resolved model information
    pub profile: ModelProfile,
    /// Firmware version
    pub firmware_version: String,
    /// Resolved capability set
    pub capabilities: CapabilitySet,
    /// Last known LAN address
    pub host: Option<String>,
    /// Native session parameters
    pub p2p: P2pParams,
}

impl Device {
    /// Resolve a raw inventory entry
    ///
    /// Returns `None` if the record is not a known camera model.
    pub fn from_record(record: &DeviceRecord) -> Option<Self> {
        let profile = ModelProfile::lookup(&record.product_model)?;

        Some(Self {
            mac: record.mac.clone(),
            name: record.nickname.clone(),
            profile,
            firmware_version: record.firmware_version.clone(),
            capabilities: profile.capabilities(),
            host: record.ip.clone().filter(|ip| !ip.is_empty()),
            p2p: P2pParams {
                p2p_id: record.p2p_id.clone(),
                p2p_type: record.p2p_type,
                enr_token: record.enr_token.clone(),
                dtls: record.parent_dtls != 0,
            },
        })
    }

    /// Replace the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Model code
    pub fn model(&self) -> &str {
        self.profile.code
    }

    /// Session quality for this device
    pub fn quality(&self) -> StreamQuality {
        self.profile.quality()
    }
}

/// Filter entry from `initialize` options
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CameraFilter {
    /// MAC to include
    pub mac: String,
    /// Optional display name override
    #[serde(default)]
    pub name: Option<String>,
}

/// Resolve inventory records into devices
///
/// Non-camera records are skipped. When `filters` is non-empty only listed
/// MACs are kept, and a filter's name overrides the nickname. Inventory order
/// is preserved.
pub fn resolve_devices(records: &[DeviceRecord], filters: &[CameraFilter]) -> Vec<Device> {
    records
        .iter()
        .filter_map(|record| {
            let device = Device::from_record(record)?;
            if filters.is_empty() {
                return Some(device);
            }
            let filter = filters.iter().find(|f| f.mac == device.mac)?;
            match filter.name.as_deref() {
                Some(name) if !name.is_empty() => Some(device.with_name(name)),
                _ => Some(device),
            }
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record(mac: &str, model: &str) -> DeviceRecord {
        DeviceRecord {
            mac: mac.to_string(),
            nickname: format!("cam-{}", mac),
            product_model: model.to_string(),
            product_type: "Camera".to_string(),
            firmware_version: "4.36.11.8391".to_string(),
            ip: Some("192.168.1.20".to_string()),
            online: true,
            p2p_id: "P2PID0001".to_string(),
            p2p_type: 4,
            enr_token: "enr".to_string(),
            parent_dtls: 1,
        }
    }

    #[test]
    fn test_from_record() {
        let device = Device::from_record(&record("2CAA8E000001", "HL_PAN3")).unwrap();

        assert_eq!(device.mac, "2CAA8E000001");
        assert_eq!(device.name, "cam-2CAA8E000001");
        assert_eq!(device.model(), "HL_PAN3");
        assert!(device.capabilities.contains(Capability::PanTilt));
        assert!(device.p2p.dtls);
        assert_eq!(device.host.as_deref(), Some("192.168.1.20"));
    }

    #[test]
    fn test_from_record_skips_non_camera() {
        assert!(Device::from_record(&record("2CAA8E000002", "WLPP1")).is_none());
    }

    #[test]
    fn test_empty_ip_is_none() {
        let mut rec = record("2CAA8E000001", "WYZE_CAKP2");
        rec.ip = Some(String::new());
        assert!(Device::from_record(&rec).unwrap().host.is_none());
    }

    #[test]
    fn test_deserialize_inventory_names() {
        let json = r#"{
            "mac": "2CAA8E000001",
            "nickname": "Porch",
            "product_model": "WYZEDB3",
            "firmware_ver": "4.25.1.316",
            "device_online": true,
            "enr": "secret",
            "unrelated": 42
        }"#;
        let rec: DeviceRecord = serde_json::from_str(json).unwrap();

        assert_eq!(rec.firmware_version, "4.25.1.316");
        assert!(rec.online);
        assert_eq!(rec.enr_token, "secret");
        assert_eq!(rec.ip, None);
    }

    #[test]
    fn test_resolve_devices_keeps_order() {
        let records = vec![
            record("A", "WYZE_CAKP2"),
            record("B", "WLPP1"),
            record("C", "HL_CAM3P"),
        ];
        let devices = resolve_devices(&records, &[]);

        let macs: Vec<_> = devices.iter().map(|d| d.mac.as_str()).collect();
        assert_eq!(macs, vec!["A", "C"]);
    }

    #[test]
    fn test_resolve_devices_with_filter() {
        let records = vec![record("A", "WYZE_CAKP2"), record("C", "HL_CAM3P")];
        let filters = vec![CameraFilter {
            mac: "C".into(),
            name: Some("Garage".into()),
        }];
        let devices = resolve_devices(&records, &filters);

        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].mac, "C");
        assert_eq!(devices[0].name, "Garage");
    }
}
