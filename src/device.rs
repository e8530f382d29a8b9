//! Last-known state of an observed device.

use crate::decoder::{DecodedAdvertisement, ProximityBeacon};
use crate::hex;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::time::SystemTime;
use thiserror::Error;
use uuid::Uuid;

/// Connection state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Rejected connection state transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot connect: device is currently {0:?}")]
pub struct InvalidDeviceState(pub ConnectionState);

/// Identity of the first proximity beacon found in a device's payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BeaconSummary {
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    pub measured_power: i8,
    /// Estimated distance in meters for the RSSI it was seen with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

impl BeaconSummary {
    pub fn new(beacon: &ProximityBeacon, rssi: i16, path_loss_exponent: f64) -> Self {
        Self {
            uuid: beacon.uuid,
            major: beacon.major,
            minor: beacon.minor,
            measured_power: beacon.measured_power,
            distance_m: beacon.estimate_distance(rssi, path_loss_exponent),
        }
    }
}

/// Snapshot of a device as last stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    /// Unique key of the device
    pub address: String,
    pub name: Option<String>,
    /// Signal strength in dBm
    pub rssi: i16,
    #[serde(serialize_with = "serialize_millis")]
    pub last_seen: SystemTime,
    pub state: ConnectionState,
    /// Raw manufacturer data by vendor id
    #[serde(serialize_with = "hex::serialize_map")]
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
    /// Decoded manufacturer data by vendor id
    pub decoded: BTreeMap<u16, DecodedAdvertisement>,
    pub beacon: Option<BeaconSummary>,
}

impl DeviceSnapshot {
    /// A freshly sighted, disconnected device with no payloads.
    pub fn new(address: impl Into<String>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            name: None,
            rssi,
            last_seen: SystemTime::now(),
            state: ConnectionState::Disconnected,
            manufacturer_data: BTreeMap::new(),
            decoded: BTreeMap::new(),
            beacon: None,
        }
    }

    /// Name if present and not blank.
    pub fn display_name(&self) -> Option<&str> {
        self.name.as_deref().filter(|n| !n.trim().is_empty())
    }

    pub fn connect(&mut self) -> Result<(), InvalidDeviceState> {
        if self.state != ConnectionState::Disconnected {
            return Err(InvalidDeviceState(self.state));
        }
        self.state = ConnectionState::Connecting;
        Ok(())
    }

    pub fn mark_connected(&mut self) {
        self.state = ConnectionState::Connected;
    }

    pub fn disconnect(&mut self) {
        self.state = ConnectionState::Disconnected;
    }
}

/// Milliseconds since the Unix epoch, saturating to 0 for pre-epoch times.
pub fn unix_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn serialize_millis<S: Serializer>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(unix_millis(*time))
}
