//! Proximity beacon (iBeacon) decoding and distance estimation.
//!
//! Layout of the manufacturer data after the Apple company id:
//!
//! ```text
//! offset  size  field
//! 0       1     sub-type marker (0x02)
//! 1       1     length marker (0x15)
//! 2       16    proximity UUID, big-endian
//! 18      2     major, big-endian u16
//! 20      2     minor, big-endian u16
//! 22      1     measured power at 1 m, signed dBm
//! ```

use super::{BeaconAdvertisement, DecodeError, DecodedAdvertisement, PayloadDecoder};
use crate::hex;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Apple Inc. company identifier.
pub const APPLE_VENDOR_ID: u16 = 0x004C;

/// Beacon sub-type marker (byte 0).
pub const BEACON_TYPE: u8 = 0x02;

/// Beacon length marker (byte 1).
pub const BEACON_LENGTH: u8 = 0x15;

/// Minimum payload length for a proximity beacon.
pub const BEACON_PAYLOAD_LEN: usize = 23;

/// Default environmental path-loss exponent (free space).
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 2.0;

/// Plausible range of calibrated measured power, in dBm.
pub const MEASURED_POWER_RANGE: std::ops::RangeInclusive<i16> = -100..=-10;

/// A decoded proximity beacon.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProximityBeacon {
    #[serde(serialize_with = "hex::serialize")]
    pub raw: Vec<u8>,
    pub uuid: Uuid,
    pub major: u16,
    pub minor: u16,
    /// Calibrated RSSI at 1 meter, dBm
    pub measured_power: i8,
    pub description: String,
}

impl ProximityBeacon {
    /// Estimate the distance in meters for a live `rssi` reading.
    ///
    /// See [`estimate_distance`].
    pub fn estimate_distance(&self, rssi: i16, path_loss_exponent: f64) -> Option<f64> {
        estimate_distance(Some(self.measured_power), rssi, path_loss_exponent)
    }
}

/// Log-distance path-loss estimate: `10^((A - rssi) / (10 n))` meters.
///
/// Returns `None` when `measured_power` is absent or outside
/// [`MEASURED_POWER_RANGE`], when `path_loss_exponent` is not a positive
/// number, or when `rssi` is not negative.
pub fn estimate_distance(
    measured_power: Option<i8>,
    rssi: i16,
    path_loss_exponent: f64,
) -> Option<f64> {
    let a = i16::from(measured_power?);
    if !MEASURED_POWER_RANGE.contains(&a) {
        return None;
    }
    if path_loss_exponent.is_nan() || path_loss_exponent <= 0.0 || rssi >= 0 {
        return None;
    }
    let exponent = f64::from(a - rssi) / (10.0 * path_loss_exponent);
    Some(10f64.powf(exponent))
}

/// Decoder for Apple proximity beacons.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProximityBeaconDecoder;

impl PayloadDecoder for ProximityBeaconDecoder {
    fn name(&self) -> &'static str {
        "proximity-beacon"
    }

    fn can_decode(&self, vendor_id: u16, data: &[u8]) -> bool {
        vendor_id == APPLE_VENDOR_ID
            && data.len() >= BEACON_PAYLOAD_LEN
            && data[0] == BEACON_TYPE
            && data[1] == BEACON_LENGTH
    }

    fn decode(&self, vendor_id: u16, data: &[u8]) -> Result<DecodedAdvertisement, DecodeError> {
        if vendor_id != APPLE_VENDOR_ID || data.first() != Some(&BEACON_TYPE) {
            return Err(DecodeError::UnsupportedFormat(format!(
                "vendor 0x{vendor_id:04X} payload is not a proximity beacon"
            )));
        }
        if !self.can_decode(vendor_id, data) {
            return Err(DecodeError::InvalidData(format!(
                "malformed proximity beacon: {} bytes",
                data.len()
            )));
        }
        debug!(payload = %hex::encode(data), "decoding proximity beacon");

        let uuid_bytes: [u8; 16] = data[2..18]
            .try_into()
            .map_err(|_| DecodeError::Decoder("uuid field truncated".into()))?;
        let uuid = Uuid::from_bytes(uuid_bytes);
        let major = u16::from_be_bytes([data[18], data[19]]);
        let minor = u16::from_be_bytes([data[20], data[21]]);
        let measured_power = i8::from_be_bytes([data[22]]);

        let description = format!(
            "iBeacon - UUID: {uuid}, Major: {major}, Minor: {minor}, Measured Power: {measured_power} dBm"
        );

        Ok(DecodedAdvertisement::Beacon(BeaconAdvertisement::Proximity(
            ProximityBeacon {
                raw: data.to_vec(),
                uuid,
                major,
                minor,
                measured_power,
                description,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TEST_BEACON_UUID, beacon_payload};

    fn decode(data: &[u8]) -> ProximityBeacon {
        match ProximityBeaconDecoder.decode(APPLE_VENDOR_ID, data).unwrap() {
            DecodedAdvertisement::Beacon(BeaconAdvertisement::Proximity(b)) => b,
            other => panic!("expected beacon, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_fields() {
        let data = beacon_payload(1, 2, -59);
        assert_eq!(data[22], 0xC5);

        let beacon = decode(&data);
        assert_eq!(beacon.uuid.to_string(), TEST_BEACON_UUID);
        assert_eq!(beacon.major, 1);
        assert_eq!(beacon.minor, 2);
        assert_eq!(beacon.measured_power, -59);
        assert_eq!(beacon.raw, data);
        assert_eq!(
            beacon.description,
            format!(
                "iBeacon - UUID: {TEST_BEACON_UUID}, Major: 1, Minor: 2, Measured Power: -59 dBm"
            )
        );
    }

    #[test]
    fn test_major_minor_are_big_endian() {
        let beacon = decode(&beacon_payload(0xABCD, 0x0102, -70));
        assert_eq!(beacon.major, 0xABCD);
        assert_eq!(beacon.minor, 0x0102);
    }

    #[test]
    fn test_trailing_bytes_are_accepted() {
        let mut data = beacon_payload(7, 8, -60);
        data.extend_from_slice(&[0xFF, 0xFF]);
        assert!(ProximityBeaconDecoder.can_decode(APPLE_VENDOR_ID, &data));
        assert_eq!(decode(&data).minor, 8);
    }

    #[test]
    fn test_decode_never_fails_for_accepted_payloads() {
        for power in [i8::MIN, -100, -59, -1, 0, 20, i8::MAX] {
            for (major, minor) in [(0, 0), (u16::MAX, 1), (256, u16::MAX)] {
                let data = beacon_payload(major, minor, power);
                assert!(ProximityBeaconDecoder.can_decode(APPLE_VENDOR_ID, &data));
                let beacon = decode(&data);
                assert_eq!((beacon.major, beacon.minor), (major, minor));
                assert_eq!(beacon.measured_power, power);
            }
        }
    }

    #[test]
    fn test_can_decode_rejects_short_payloads() {
        let data = beacon_payload(1, 2, -59);
        for len in 0..BEACON_PAYLOAD_LEN {
            assert!(!ProximityBeaconDecoder.can_decode(APPLE_VENDOR_ID, &data[..len]));
        }
    }

    #[test]
    fn test_can_decode_rejects_wrong_markers_and_vendor() {
        let mut wrong_type = beacon_payload(1, 2, -59);
        wrong_type[0] = 0x10;
        assert!(!ProximityBeaconDecoder.can_decode(APPLE_VENDOR_ID, &wrong_type));

        let mut wrong_len = beacon_payload(1, 2, -59);
        wrong_len[1] = 0x16;
        assert!(!ProximityBeaconDecoder.can_decode(APPLE_VENDOR_ID, &wrong_len));

        assert!(!ProximityBeaconDecoder.can_decode(0x0075, &beacon_payload(1, 2, -59)));
    }

    #[test]
    fn test_decode_rejects_unaccepted_payload() {
        let err = ProximityBeaconDecoder
            .decode(APPLE_VENDOR_ID, &[0x02, 0x15, 0x00])
            .unwrap_err();
        assert!(matches!(err, DecodeError::InvalidData(_)));
    }

    #[test]
    fn test_decode_rejects_other_formats() {
        let err = ProximityBeaconDecoder
            .decode(0x0075, &beacon_payload(1, 2, -59))
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));

        let err = ProximityBeaconDecoder
            .decode(APPLE_VENDOR_ID, &[0x10, 0x05, 0x01])
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_estimate_distance_reference_point() {
        let d = estimate_distance(Some(-59), -69, DEFAULT_PATH_LOSS_EXPONENT).unwrap();
        assert!((d - 10f64.powf(0.5)).abs() < 1e-9);
        assert!((d - 3.162).abs() < 0.001);

        // At the calibration point the estimate is one meter
        let one = estimate_distance(Some(-59), -59, 2.0).unwrap();
        assert!((one - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_estimate_distance_grows_as_rssi_drops() {
        let mut previous = 0.0;
        for rssi in (-120..=-1).rev() {
            let d = estimate_distance(Some(-59), rssi, 2.5).unwrap();
            assert!(d > previous, "distance must grow at rssi {rssi}");
            previous = d;
        }
    }

    #[test]
    fn test_estimate_distance_guards() {
        assert_eq!(estimate_distance(None, -60, 2.0), None);
        assert_eq!(estimate_distance(Some(-59), 0, 2.0), None);
        assert_eq!(estimate_distance(Some(-59), 5, 2.0), None);
        assert_eq!(estimate_distance(Some(-101), -60, 2.0), None);
        assert_eq!(estimate_distance(Some(-9), -60, 2.0), None);
        assert_eq!(estimate_distance(Some(0), -60, 2.0), None);
        assert_eq!(estimate_distance(Some(-59), -60, 0.0), None);
        assert_eq!(estimate_distance(Some(-59), -60, -2.0), None);
        assert_eq!(estimate_distance(Some(-59), -60, f64::NAN), None);

        assert!(estimate_distance(Some(-100), -60, 2.0).is_some());
        assert!(estimate_distance(Some(-10), -60, 2.0).is_some());
    }

    #[test]
    fn test_beacon_method_uses_measured_power() {
        let beacon = decode(&beacon_payload(1, 2, -59));
        let d = beacon.estimate_distance(-69, DEFAULT_PATH_LOSS_EXPONENT).unwrap();
        assert!((d - 3.162).abs() < 0.001);
    }
}
