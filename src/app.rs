//! Core application runner for `adwatch`.
//!
//! This module is kept apart from process setup (logging, signals, exit
//! codes) so the whole pipeline can be tested with an injected scanner and
//! an in-memory output stream.

use crate::bus::{EventBus, HandlerError};
use crate::decoder::{DEFAULT_PATH_LOSS_EXPONENT, DecoderRegistry, VendorTable};
use crate::events::{DEVICE_CREATED, DEVICE_UPDATED, DomainEvent, SCAN_STARTED, SCAN_STOPPED};
use crate::ingest::DEFAULT_QUEUE_CAPACITY;
use crate::manager::{ScanManager, ScanManagerError};
use crate::observer::EventPublishingObserver;
use crate::output::EventFormatter;
use crate::output::json::JsonFormatter;
use crate::processor::Processor;
use crate::scanner::{ScanError, Scanner};
use crate::session::ScanRepository;
use crate::store::{ChangePolicy, DEFAULT_RSSI_THRESHOLD, DeviceStore};
use clap::Parser;
use std::future::Future;
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

/// Configuration for the core run loop.
#[derive(Parser, Debug, Clone)]
#[command(author, about, version)]
pub struct Options {
    /// Capacity of the advertisement queue; newer advertisements are
    /// dropped while it is full
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// RSSI change in dB that counts as a device update
    #[arg(long, default_value_t = DEFAULT_RSSI_THRESHOLD)]
    pub rssi_threshold: u16,

    /// Environmental path-loss exponent for beacon distance estimates
    #[arg(
        long,
        default_value_t = DEFAULT_PATH_LOSS_EXPONENT,
        value_parser = parse_path_loss_exponent
    )]
    pub path_loss_exponent: f64,

    /// JSON vendor table to use instead of the bundled one
    #[arg(long, value_name = "PATH")]
    pub vendor_table: Option<PathBuf>,

    /// Stop scanning after this long.
    /// Accepts duration with suffix: 3s, 1m, 500ms, 2h.
    /// Without suffix, value is interpreted as seconds.
    #[arg(long, value_parser = crate::duration::parse_duration)]
    pub duration: Option<Duration>,

    /// Verbose output, log every advertisement and decode step
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            rssi_threshold: DEFAULT_RSSI_THRESHOLD,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
            vendor_table: None,
            duration: None,
            verbose: false,
        }
    }
}

fn parse_path_loss_exponent(src: &str) -> Result<f64, String> {
    let n: f64 = src
        .trim()
        .parse()
        .map_err(|_| format!("invalid path-loss exponent: {src}"))?;
    if n.is_finite() && n > 0.0 {
        Ok(n)
    } else {
        Err(format!("path-loss exponent must be positive: {src}"))
    }
}

/// Errors returned by the core run loop.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Manager(#[from] ScanManagerError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Assemble the pipeline for `options` around `scanner`.
///
/// Returns the manager and the store it feeds; the store already has the
/// event-publishing observer subscribed.
pub fn build_pipeline(
    options: &Options,
    scanner: Arc<dyn Scanner>,
    bus: Arc<EventBus>,
) -> (ScanManager, Arc<DeviceStore>) {
    let vendors = match &options.vendor_table {
        Some(path) => VendorTable::load_or_bundled(path),
        None => VendorTable::bundled(),
    };
    let registry = Arc::new(DecoderRegistry::new(vendors));
    let store = Arc::new(DeviceStore::new(ChangePolicy::new(options.rssi_threshold)));
    store.subscribe(Arc::new(EventPublishingObserver::new(bus.clone())));

    let sessions = Arc::new(ScanRepository::new());
    let processor = Arc::new(
        Processor::new(registry, store.clone(), sessions.clone())
            .with_path_loss_exponent(options.path_loss_exponent),
    );
    let manager = ScanManager::new(scanner, processor, sessions, bus)
        .with_queue_capacity(options.queue_capacity);
    (manager, store)
}

/// Relay every event type to `lines` as formatted text.
fn relay_events(
    bus: &EventBus,
    formatter: Arc<dyn EventFormatter>,
    lines: mpsc::UnboundedSender<String>,
) {
    for type_name in [SCAN_STARTED, SCAN_STOPPED, DEVICE_CREATED, DEVICE_UPDATED] {
        let formatter = formatter.clone();
        let lines = lines.clone();
        bus.subscribe(type_name, move |event: Arc<DomainEvent>| {
            let formatter = formatter.clone();
            let lines = lines.clone();
            async move {
                let line = formatter
                    .format(&event)
                    .map_err(|e| HandlerError::new(e.to_string()))?;
                lines
                    .send(line)
                    .map_err(|_| HandlerError::new("output closed"))
            }
        });
    }
}

/// Run one scan, writing one JSON line per event to `out`.
///
/// The scan ends when the scanner runs out of detections, when
/// `options.duration` elapses, or when `shutdown` resolves, whichever comes
/// first. The scan is then stopped, so the output always ends with a
/// `scan_stopped` line.
pub async fn run_with_io(
    options: Options,
    scanner: Arc<dyn Scanner>,
    out: &mut dyn Write,
    shutdown: impl Future<Output = ()>,
) -> Result<(), RunError> {
    let bus = Arc::new(EventBus::new());
    let (tx, mut lines) = mpsc::unbounded_channel();
    relay_events(&bus, Arc::new(JsonFormatter::new()), tx);

    let (manager, store) = build_pipeline(&options, scanner, bus);
    let scan_id = manager.start_scan().await?;

    let duration = options.duration;
    let stop = async {
        tokio::select! {
            _ = manager.wait_idle() => info!(scan_id = %scan_id, "scanner finished"),
            _ = async {
                match duration {
                    Some(d) => tokio::time::sleep(d).await,
                    None => std::future::pending().await,
                }
            } => info!(scan_id = %scan_id, "scan duration elapsed"),
            _ = shutdown => info!(scan_id = %scan_id, "shutdown requested"),
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            Some(line) = lines.recv() => writeln!(out, "{line}")?,
            _ = &mut stop => break,
        }
    }

    manager.stop_scan().await?;
    while let Ok(line) = lines.try_recv() {
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    info!(devices = store.len().await, "scan complete");
    Ok(())
}
