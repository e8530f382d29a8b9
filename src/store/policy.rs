//! Change detection between two snapshots of the same device.

use crate::device::DeviceSnapshot;
use serde::Serialize;

/// Default RSSI delta, in dB, that counts as a significant change.
pub const DEFAULT_RSSI_THRESHOLD: u16 = 5;

/// What changed between a stored snapshot and its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeRecord {
    pub previous_rssi: i16,
    pub rssi: i16,
    /// Absolute RSSI difference in dB
    pub rssi_delta: u16,
    /// Name after the change
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub name_changed: bool,
    pub payload_changed: bool,
}

/// Decides which sightings of a known device are worth storing and announcing.
///
/// A candidate is significant when its RSSI moved by at least the threshold,
/// when it advertises a non-empty name different from the stored one, or
/// when its raw manufacturer data differs from the stored data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangePolicy {
    rssi_threshold: u16,
}

impl Default for ChangePolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RSSI_THRESHOLD)
    }
}

impl ChangePolicy {
    pub fn new(rssi_threshold: u16) -> Self {
        Self { rssi_threshold }
    }

    pub fn rssi_threshold(&self) -> u16 {
        self.rssi_threshold
    }

    /// Compare `old` against `candidate`. `None` means the change is not significant.
    pub fn evaluate(
        &self,
        old: &DeviceSnapshot,
        candidate: &DeviceSnapshot,
    ) -> Option<ChangeRecord> {
        let rssi_delta = old.rssi.abs_diff(candidate.rssi);
        let name_changed = candidate
            .display_name()
            .is_some_and(|name| old.name.as_deref() != Some(name));
        let payload_changed = old.manufacturer_data != candidate.manufacturer_data;

        if rssi_delta < self.rssi_threshold && !name_changed && !payload_changed {
            return None;
        }

        let name = if name_changed {
            candidate.name.clone()
        } else {
            old.name.clone()
        };

        Some(ChangeRecord {
            previous_rssi: old.rssi,
            rssi: candidate.rssi,
            rssi_delta,
            name,
            name_changed,
            payload_changed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(rssi: i16) -> DeviceSnapshot {
        DeviceSnapshot::new("AA:BB:CC:DD:EE:FF", rssi)
    }

    #[test]
    fn test_small_rssi_jitter_is_insignificant() {
        let policy = ChangePolicy::default();
        for rssi in -64..=-56 {
            assert_eq!(policy.evaluate(&snapshot(-60), &snapshot(rssi)), None);
        }
    }

    #[test]
    fn test_rssi_delta_at_threshold_is_significant() {
        let policy = ChangePolicy::default();
        let change = policy.evaluate(&snapshot(-60), &snapshot(-65)).unwrap();
        assert_eq!(change.previous_rssi, -60);
        assert_eq!(change.rssi, -65);
        assert_eq!(change.rssi_delta, 5);
        assert!(!change.name_changed);
        assert!(!change.payload_changed);

        let up = policy.evaluate(&snapshot(-60), &snapshot(-50)).unwrap();
        assert_eq!(up.rssi_delta, 10);
    }

    #[test]
    fn test_delta_uses_stored_rssi() {
        // The delta must be measured against the old reading, not the candidate itself
        let policy = ChangePolicy::new(5);
        let change = policy.evaluate(&snapshot(-90), &snapshot(-40)).unwrap();
        assert_eq!(change.rssi_delta, 50);
    }

    #[test]
    fn test_name_change_is_significant() {
        let policy = ChangePolicy::default();
        let mut old = snapshot(-60);
        old.name = Some("Old".into());
        let mut candidate = snapshot(-61);
        candidate.name = Some("New".into());

        let change = policy.evaluate(&old, &candidate).unwrap();
        assert!(change.name_changed);
        assert_eq!(change.name.as_deref(), Some("New"));
    }

    #[test]
    fn test_missing_or_blank_name_is_not_a_change() {
        let policy = ChangePolicy::default();
        let mut old = snapshot(-60);
        old.name = Some("Tag".into());

        let unnamed = snapshot(-60);
        assert_eq!(policy.evaluate(&old, &unnamed), None);

        let mut blank = snapshot(-60);
        blank.name = Some(String::new());
        assert_eq!(policy.evaluate(&old, &blank), None);
    }

    #[test]
    fn test_payload_change_is_significant() {
        let policy = ChangePolicy::default();
        let mut old = snapshot(-60);
        old.manufacturer_data.insert(0x004C, vec![1, 2, 3]);
        let mut candidate = snapshot(-60);
        candidate.manufacturer_data.insert(0x004C, vec![1, 2, 4]);

        let change = policy.evaluate(&old, &candidate).unwrap();
        assert!(change.payload_changed);
        assert_eq!(change.rssi_delta, 0);

        // Dropping a vendor entry is a change too
        assert!(policy.evaluate(&old, &snapshot(-60)).is_some());
    }

    #[test]
    fn test_custom_threshold() {
        let policy = ChangePolicy::new(10);
        assert_eq!(policy.evaluate(&snapshot(-60), &snapshot(-69)), None);
        assert!(policy.evaluate(&snapshot(-60), &snapshot(-70)).is_some());
    }
}
