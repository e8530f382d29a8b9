//! Advertisement scanner abstraction.
//!
//! A [`Scanner`] runs a detection loop that pushes every sighting into a
//! [`DetectionSink`]. The loop itself is the future returned by
//! [`Scanner::start_scan`]; the scan manager drives it on a background task.

#[cfg(feature = "bluer")]
pub mod bluer;

use crate::ingest::DetectionSink;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Error type for scanner operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// Bluetooth/adapter related error
    #[error("Bluetooth error: {0}")]
    Bluetooth(String),
    /// Backend not available (not compiled in)
    #[error("Backend '{0}' not available (not compiled in)")]
    BackendNotAvailable(String),
}

/// Boxed future returned by scanner operations.
pub type ScanFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ScanError>> + Send + 'a>>;

/// Source of advertisement detections.
///
/// Implementations must not block inside the detection loop: the sink drops
/// rather than waits when the queue is full.
pub trait Scanner: Send + Sync {
    /// Run the detection loop, feeding `sink`, until [`Scanner::stop_scan`]
    /// is called or the backend runs out of events.
    fn start_scan(&self, sink: DetectionSink) -> ScanFuture<'_>;

    /// Stop emitting detections and release radio resources. Idempotent.
    fn stop_scan(&self) -> ScanFuture<'_>;
}

/// The scanner backend compiled into this build.
pub fn default_scanner() -> Result<Arc<dyn Scanner>, ScanError> {
    #[cfg(feature = "bluer")]
    return Ok(Arc::new(bluer::BluerScanner::new()));
    #[cfg(not(feature = "bluer"))]
    return Err(ScanError::BackendNotAvailable("bluer".into()));
}
