//! Advertisement processor: the single consumer of the ingestion queue.

use crate::decoder::{DEFAULT_PATH_LOSS_EXPONENT, DecodedResult, DecoderRegistry};
use crate::device::{BeaconSummary, DeviceSnapshot};
use crate::ingest::{Detection, IngestQueue, stopped};
use crate::session::ScanRepository;
use crate::store::{DeviceStore, SaveOutcome};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

/// Decodes detections and saves the resulting snapshots, one at a time.
#[derive(Debug)]
pub struct Processor {
    registry: Arc<DecoderRegistry>,
    store: Arc<DeviceStore>,
    sessions: Arc<ScanRepository>,
    path_loss_exponent: f64,
}

impl Processor {
    pub fn new(
        registry: Arc<DecoderRegistry>,
        store: Arc<DeviceStore>,
        sessions: Arc<ScanRepository>,
    ) -> Self {
        Self {
            registry,
            store,
            sessions,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
        }
    }

    /// Path-loss exponent used for beacon distance estimates.
    pub fn with_path_loss_exponent(mut self, path_loss_exponent: f64) -> Self {
        self.path_loss_exponent = path_loss_exponent;
        self
    }

    pub fn store(&self) -> &Arc<DeviceStore> {
        &self.store
    }

    /// Build the snapshot candidate for one detection.
    ///
    /// The beacon summary comes from the first proximity beacon in vendor id
    /// order.
    pub fn snapshot(&self, detection: Detection) -> DeviceSnapshot {
        let Detection {
            address,
            name,
            rssi,
            manufacturer_data,
        } = detection;

        let mut snapshot = DeviceSnapshot::new(address, rssi);
        snapshot.name = name;

        for DecodedResult {
            vendor,
            advertisement,
        } in self.registry.decode(&manufacturer_data)
        {
            if snapshot.beacon.is_none()
                && let Some(beacon) = advertisement.as_proximity_beacon()
            {
                snapshot.beacon = Some(BeaconSummary::new(beacon, rssi, self.path_loss_exponent));
            }
            snapshot.decoded.insert(vendor.id, advertisement);
        }
        snapshot.manufacturer_data = manufacturer_data;
        snapshot
    }

    /// Decode one detection and save it to the store.
    pub async fn process(&self, detection: Detection) -> SaveOutcome {
        let snapshot = self.snapshot(detection);
        if self.sessions.record_discovery(&snapshot.address) {
            debug!(address = %snapshot.address, "new address discovered in this scan");
        }
        self.store.save(snapshot).await
    }

    /// Drain `queue` in arrival order until it closes or `shutdown` turns
    /// true. Shutdown is checked between items; whatever is still queued
    /// at that point is discarded. Returns the number of processed items.
    pub async fn run(&self, mut queue: IngestQueue, mut shutdown: watch::Receiver<bool>) -> usize {
        let mut processed = 0;
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                next = queue.recv() => match next {
                    Some(detection) => {
                        self.process(detection).await;
                        processed += 1;
                    }
                    None => break,
                },
            }
        }
        queue.discard_pending();
        info!(processed, dropped = queue.dropped(), "advertisement processor stopped");
        processed
    }
}
