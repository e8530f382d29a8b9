//! Lowercase hex rendering for raw payload bytes.

use serde::Serializer;
use serde::ser::SerializeMap;
use std::collections::BTreeMap;

pub fn encode(data: &[u8]) -> String {
    data.iter().map(|b| format!("{b:02x}")).collect()
}

/// `serialize_with` helper rendering bytes as a hex string.
pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&encode(data))
}

/// `serialize_with` helper rendering a vendor payload map as `{"76": "0215..."}`.
pub fn serialize_map<S: Serializer>(
    map: &BTreeMap<u16, Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut out = serializer.serialize_map(Some(map.len()))?;
    for (id, data) in map {
        out.serialize_entry(&id.to_string(), &encode(data))?;
    }
    out.end()
}
