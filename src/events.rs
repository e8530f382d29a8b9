//! Domain events published on the [`EventBus`](crate::bus::EventBus).
//!
//! Events serialize as `{"type": "<TypeName>", "occurred_at": <ms>, ...fields}`.
//! That shape is the contract transport adapters relay to their clients.

use crate::device::{BeaconSummary, DeviceSnapshot, unix_millis};
use crate::hex;
use crate::store::ChangeRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Event type names, as used for bus subscriptions.
pub const SCAN_STARTED: &str = "ScanStarted";
pub const SCAN_STOPPED: &str = "ScanStopped";
pub const DEVICE_CREATED: &str = "DeviceCreated";
pub const DEVICE_UPDATED: &str = "DeviceUpdated";

/// Event body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    ScanStarted {
        scan_id: String,
    },
    ScanStopped {
        scan_id: String,
        device_count: usize,
    },
    DeviceCreated {
        address: String,
        name: Option<String>,
        rssi: i16,
        #[serde(serialize_with = "hex::serialize_map")]
        manufacturer_data: BTreeMap<u16, Vec<u8>>,
        /// Description of each decoded vendor payload
        decoded: BTreeMap<u16, String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        beacon: Option<BeaconSummary>,
    },
    DeviceUpdated {
        address: String,
        changes: ChangeRecord,
    },
}

impl EventPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::ScanStarted { .. } => SCAN_STARTED,
            EventPayload::ScanStopped { .. } => SCAN_STOPPED,
            EventPayload::DeviceCreated { .. } => DEVICE_CREATED,
            EventPayload::DeviceUpdated { .. } => DEVICE_UPDATED,
        }
    }
}

/// A timestamped domain event.
///
/// The timestamp is taken when the event is constructed and cannot be
/// changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainEvent {
    occurred_at: u64,
    #[serde(flatten)]
    payload: EventPayload,
}

impl DomainEvent {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            occurred_at: unix_millis(SystemTime::now()),
            payload,
        }
    }

    pub fn scan_started(scan_id: impl Into<String>) -> Self {
        Self::new(EventPayload::ScanStarted {
            scan_id: scan_id.into(),
        })
    }

    pub fn scan_stopped(scan_id: impl Into<String>, device_count: usize) -> Self {
        Self::new(EventPayload::ScanStopped {
            scan_id: scan_id.into(),
            device_count,
        })
    }

    pub fn device_created(device: &DeviceSnapshot) -> Self {
        Self::new(EventPayload::DeviceCreated {
            address: device.address.clone(),
            name: device.name.clone(),
            rssi: device.rssi,
            manufacturer_data: device.manufacturer_data.clone(),
            decoded: device
                .decoded
                .iter()
                .map(|(id, adv)| (*id, adv.description().to_string()))
                .collect(),
            beacon: device.beacon.clone(),
        })
    }

    pub fn device_updated(address: impl Into<String>, changes: ChangeRecord) -> Self {
        Self::new(EventPayload::DeviceUpdated {
            address: address.into(),
            changes,
        })
    }

    /// Milliseconds since the Unix epoch at construction.
    pub fn occurred_at(&self) -> u64 {
        self.occurred_at
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    pub fn type_name(&self) -> &'static str {
        self.payload.type_name()
    }
}
