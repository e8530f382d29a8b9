//! Bounded queue between the scanner callback and the processor.
//!
//! The producer side never waits: when the queue is full the newest
//! detection is dropped and counted. The consumer side is drained by a
//! single processing task in arrival order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One advertisement sighting reported by a scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Stable device identity (e.g., "AA:BB:CC:DD:EE:FF")
    pub address: String,
    /// Advertised display name
    pub name: Option<String>,
    /// Signal strength in dBm
    pub rssi: i16,
    /// Manufacturer data by vendor id, possibly empty
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl Detection {
    pub fn new(address: impl Into<String>, rssi: i16) -> Self {
        Self {
            address: address.into(),
            name: None,
            rssi,
            manufacturer_data: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_payload(mut self, vendor_id: u16, data: Vec<u8>) -> Self {
        self.manufacturer_data.insert(vendor_id, data);
        self
    }
}

/// Create a bounded ingestion queue. A capacity of 0 is raised to 1.
pub fn channel(capacity: usize) -> (DetectionSink, IngestQueue) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        DetectionSink {
            tx,
            dropped: dropped.clone(),
        },
        IngestQueue { rx, dropped },
    )
}

/// Producer handle handed to scanners. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DetectionSink {
    tx: mpsc::Sender<Detection>,
    dropped: Arc<AtomicU64>,
}

impl DetectionSink {
    /// Enqueue without waiting.
    ///
    /// Returns `false` when the detection was dropped, either because the
    /// queue is full or because the consumer has gone away.
    pub fn push(&self, detection: Detection) -> bool {
        match self.tx.try_send(detection) {
            Ok(()) => true,
            Err(TrySendError::Full(detection)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(
                    address = %detection.address,
                    dropped,
                    "ingestion queue is full, dropping advertisement"
                );
                false
            }
            Err(TrySendError::Closed(detection)) => {
                debug!(
                    address = %detection.address,
                    "ingestion queue closed, dropping advertisement"
                );
                false
            }
        }
    }

    /// Number of detections dropped on overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the ingestion queue.
#[derive(Debug)]
pub struct IngestQueue {
    rx: mpsc::Receiver<Detection>,
    dropped: Arc<AtomicU64>,
}

impl IngestQueue {
    /// Wait for the next detection. `None` once every sink is gone and the
    /// queue is empty.
    pub async fn recv(&mut self) -> Option<Detection> {
        self.rx.recv().await
    }

    /// Close the queue and throw away whatever is still buffered.
    pub fn discard_pending(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "discarded queued advertisements");
        }
        discarded
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Number of detections dropped on overflow so far.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Resolve once `shutdown` is set or its sender is gone.
///
/// The watch guard is dropped here, so the future can sit in a
/// `tokio::select!` whose other arms await without losing `Send`.
pub async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
