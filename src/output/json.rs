//! Newline-delimited JSON relay format.
//!
//! Each event becomes one object:
//! `{"type": "device_created", "data": {...}, "timestamp": <ms>}`.
//! `data` holds the event fields, `timestamp` is the event's creation time.

use crate::events::{DomainEvent, EventPayload};
use crate::output::{EventFormatter, FormatError};
use serde_json::{Value, json};

/// NDJSON event formatter.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonFormatter;

impl JsonFormatter {
    pub fn new() -> Self {
        Self
    }
}

/// Relay name of an event, e.g. `device_created`.
pub fn wire_type(payload: &EventPayload) -> &'static str {
    match payload {
        EventPayload::ScanStarted { .. } => "scan_started",
        EventPayload::ScanStopped { .. } => "scan_stopped",
        EventPayload::DeviceCreated { .. } => "device_created",
        EventPayload::DeviceUpdated { .. } => "device_updated",
    }
}

impl EventFormatter for JsonFormatter {
    fn format(&self, event: &DomainEvent) -> Result<String, FormatError> {
        let mut data = serde_json::to_value(event.payload())?;
        if let Value::Object(fields) = &mut data {
            fields.remove("type");
        }
        let line = json!({
            "type": wire_type(event.payload()),
            "data": data,
            "timestamp": event.occurred_at(),
        });
        Ok(line.to_string())
    }
}
