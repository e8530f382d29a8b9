//! Bluetooth company identifier table.
//!
//! Vendor ids are resolved against a table loaded once at startup from a JSON
//! document. Ids missing from the table resolve to a placeholder name, so an
//! unknown vendor is never an error.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Table bundled with the binary, used when no external table is given.
pub const BUNDLED_VENDOR_TABLE: &str = include_str!("../../data/vendors.json");

/// Information about an advertising vendor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VendorInfo {
    /// Bluetooth SIG company identifier
    pub id: u16,
    /// Short display name (e.g., "Apple")
    pub name: String,
    /// Optional long-form name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl VendorInfo {
    /// Placeholder for ids that are not in the table.
    pub fn unknown(id: u16) -> Self {
        Self {
            id,
            name: format!("Unknown (0x{id:04X})"),
            description: None,
        }
    }
}

/// Immutable id → vendor lookup.
#[derive(Debug, Clone, Default)]
pub struct VendorTable {
    vendors: HashMap<u16, VendorInfo>,
}

impl VendorTable {
    /// Parse a JSON array of `{"id", "name", "description"?}` records.
    ///
    /// `id` may be a number or a hex string such as `"0x004C"`. Records that
    /// are not objects, lack an id or name, or carry an id outside the `u16`
    /// range are skipped. A document that is not an array yields an empty table.
    pub fn from_json(src: &str) -> Self {
        let records = match serde_json::from_str::<Value>(src) {
            Ok(Value::Array(records)) => records,
            Ok(_) => {
                debug!("vendor table is not a JSON array, ignoring");
                Vec::new()
            }
            Err(e) => {
                debug!(error = %e, "vendor table is not valid JSON, ignoring");
                Vec::new()
            }
        };

        let vendors = records
            .iter()
            .filter_map(parse_record)
            .map(|info| (info.id, info))
            .collect();

        Self { vendors }
    }

    /// Table parsed from [`BUNDLED_VENDOR_TABLE`].
    pub fn bundled() -> Self {
        Self::from_json(BUNDLED_VENDOR_TABLE)
    }

    /// Load a table from `path`, falling back to the bundled table when the
    /// file cannot be read.
    pub fn load_or_bundled(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(src) => Self::from_json(&src),
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "cannot read vendor table, using bundled table"
                );
                Self::bundled()
            }
        }
    }

    /// Resolve a vendor id. Never fails.
    pub fn resolve(&self, id: u16) -> VendorInfo {
        self.vendors
            .get(&id)
            .cloned()
            .unwrap_or_else(|| VendorInfo::unknown(id))
    }

    pub fn len(&self) -> usize {
        self.vendors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vendors.is_empty()
    }
}

fn parse_record(record: &Value) -> Option<VendorInfo> {
    let id = match record.get("id")? {
        Value::Number(n) => u16::try_from(n.as_u64()?).ok()?,
        Value::String(s) => parse_hex_id(s)?,
        _ => return None,
    };
    let name = record.get("name")?.as_str()?.trim();
    if name.is_empty() {
        return None;
    }
    let description = record
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(VendorInfo {
        id,
        name: name.to_string(),
        description,
    })
}

fn parse_hex_id(s: &str) -> Option<u16> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_table_knows_apple() {
        let table = VendorTable::bundled();
        let apple = table.resolve(0x004C);
        assert_eq!(apple.name, "Apple");
        assert_eq!(apple.description.as_deref(), Some("Apple, Inc."));
        assert!(table.len() >= 10);
    }

    #[test]
    fn test_unknown_id_gets_placeholder() {
        let table = VendorTable::bundled();
        let info = table.resolve(0xBEEF);
        assert_eq!(info.id, 0xBEEF);
        assert_eq!(info.name, "Unknown (0xBEEF)");
        assert!(info.description.is_none());
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let table = VendorTable::from_json(
            r#"[
                {"id": 76, "name": "Apple"},
                {"id": "0x0075", "name": "Samsung"},
                {"id": 70000, "name": "Too big"},
                {"id": "zz", "name": "Bad hex"},
                {"name": "No id"},
                {"id": 6},
                {"id": 7, "name": "   "},
                "not an object"
            ]"#,
        );
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(0x004C).name, "Apple");
        assert_eq!(table.resolve(0x0075).name, "Samsung");
        assert_eq!(table.resolve(6).name, "Unknown (0x0006)");
    }

    #[test]
    fn test_invalid_document_yields_empty_table() {
        assert!(VendorTable::from_json("{not json").is_empty());
        assert!(VendorTable::from_json(r#"{"id": 1}"#).is_empty());
    }

    #[test]
    fn test_missing_file_falls_back_to_bundled() {
        let table = VendorTable::load_or_bundled(Path::new("/nonexistent/vendors.json"));
        assert_eq!(table.resolve(0x004C).name, "Apple");
    }
}
