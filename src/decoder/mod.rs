//! Vendor payload decoding.
//!
//! A [`DecoderRegistry`] holds an ordered list of [`PayloadDecoder`]s and a
//! [`VendorTable`]. Every manufacturer-data entry of an advertisement yields
//! exactly one [`DecodedResult`]: the first decoder whose predicate accepts
//! the payload decodes it, and anything else degrades to a generic result
//! carrying the raw bytes.

pub mod beacon;
pub mod vendor;

use crate::hex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error};

pub use beacon::{DEFAULT_PATH_LOSS_EXPONENT, ProximityBeacon, ProximityBeaconDecoder};
pub use vendor::{VendorInfo, VendorTable};

/// Error types for decoding vendor payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Payload shape rejected by the decoder
    #[error("Invalid data: {0}")]
    InvalidData(String),
    /// Payload is a sub-format the decoder does not handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    /// Decoder failed while reading an accepted payload
    #[error("Decoder error: {0}")]
    Decoder(String),
}

/// Result of decoding one vendor payload.
///
/// Every variant carries the original bytes and a human-readable description.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedAdvertisement {
    Generic(GenericAdvertisement),
    Beacon(BeaconAdvertisement),
}

impl DecodedAdvertisement {
    pub fn raw(&self) -> &[u8] {
        match self {
            DecodedAdvertisement::Generic(g) => &g.raw,
            DecodedAdvertisement::Beacon(BeaconAdvertisement::Proximity(b)) => &b.raw,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            DecodedAdvertisement::Generic(g) => &g.description,
            DecodedAdvertisement::Beacon(BeaconAdvertisement::Proximity(b)) => &b.description,
        }
    }

    /// The proximity beacon, if this payload is one.
    pub fn as_proximity_beacon(&self) -> Option<&ProximityBeacon> {
        match self {
            DecodedAdvertisement::Beacon(BeaconAdvertisement::Proximity(b)) => Some(b),
            DecodedAdvertisement::Generic(_) => None,
        }
    }
}

/// Payload no decoder understood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenericAdvertisement {
    #[serde(serialize_with = "hex::serialize")]
    pub raw: Vec<u8>,
    pub description: String,
}

impl GenericAdvertisement {
    /// Build the fallback result for `raw`, described as `"<vendor> - Raw: <hex>"`.
    pub fn new(vendor: &VendorInfo, raw: &[u8]) -> Self {
        Self {
            raw: raw.to_vec(),
            description: format!("{} - Raw: {}", vendor.name, hex::encode(raw)),
        }
    }
}

/// Beacon sub-formats.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "beacon_type", rename_all = "snake_case")]
pub enum BeaconAdvertisement {
    Proximity(ProximityBeacon),
}

/// A vendor payload together with its resolved vendor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedResult {
    pub vendor: VendorInfo,
    pub advertisement: DecodedAdvertisement,
}

/// A pluggable decoder for one vendor payload format.
pub trait PayloadDecoder: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this decoder recognizes `data` sent under `vendor_id`.
    fn can_decode(&self, vendor_id: u16, data: &[u8]) -> bool;

    /// Decode a payload previously accepted by [`PayloadDecoder::can_decode`].
    fn decode(&self, vendor_id: u16, data: &[u8]) -> Result<DecodedAdvertisement, DecodeError>;
}

/// Ordered, first-match-wins set of payload decoders.
pub struct DecoderRegistry {
    vendors: VendorTable,
    decoders: Vec<Arc<dyn PayloadDecoder>>,
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.decoders.iter().map(|d| d.name()).collect();
        f.debug_struct("DecoderRegistry")
            .field("vendors", &self.vendors.len())
            .field("decoders", &names)
            .finish()
    }
}

impl DecoderRegistry {
    /// Registry with no decoders; every payload decodes as generic.
    pub fn empty(vendors: VendorTable) -> Self {
        Self {
            vendors,
            decoders: Vec::new(),
        }
    }

    /// Registry with the built-in decoders registered.
    pub fn new(vendors: VendorTable) -> Self {
        let mut registry = Self::empty(vendors);
        registry.register_decoder(Arc::new(ProximityBeaconDecoder));
        registry
    }

    /// Append a decoder. Later registrations have lower priority.
    pub fn register_decoder(&mut self, decoder: Arc<dyn PayloadDecoder>) {
        debug!(decoder = decoder.name(), "registered payload decoder");
        self.decoders.push(decoder);
    }

    pub fn vendors(&self) -> &VendorTable {
        &self.vendors
    }

    /// Decode every entry of a vendor payload map, one result per entry.
    pub fn decode(&self, payloads: &BTreeMap<u16, Vec<u8>>) -> Vec<DecodedResult> {
        payloads
            .iter()
            .map(|(&vendor_id, data)| self.decode_one(vendor_id, data))
            .collect()
    }

    /// Decode a single vendor payload. Failures degrade to a generic result.
    pub fn decode_one(&self, vendor_id: u16, data: &[u8]) -> DecodedResult {
        let vendor = self.vendors.resolve(vendor_id);

        let decoded = self
            .decoders
            .iter()
            .find(|d| d.can_decode(vendor_id, data))
            .and_then(|decoder| match decoder.decode(vendor_id, data) {
                Ok(advertisement) => Some(advertisement),
                Err(e) => {
                    error!(
                        decoder = decoder.name(),
                        vendor_id,
                        payload = %hex::encode(data),
                        error = %e,
                        "payload decode failed, falling back to generic"
                    );
                    None
                }
            });

        let advertisement = decoded.unwrap_or_else(|| {
            DecodedAdvertisement::Generic(GenericAdvertisement::new(&vendor, data))
        });

        DecodedResult {
            vendor,
            advertisement,
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new(VendorTable::bundled())
    }
}
