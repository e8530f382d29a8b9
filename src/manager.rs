//! Scan lifecycle: starts and stops the scanner's background detection loop.

use crate::bus::EventBus;
use crate::events::DomainEvent;
use crate::ingest::{self, DEFAULT_QUEUE_CAPACITY};
use crate::processor::Processor;
use crate::scanner::Scanner;
use crate::session::{ScanRepository, ScanSession};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors returned by [`ScanManager`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanManagerError {
    #[error("a scan is already running")]
    AlreadyRunning,
    #[error("no scan is currently running")]
    NoActiveScan,
}

impl ScanManagerError {
    /// True for lifecycle misuse (start while scanning, stop while idle).
    pub fn is_invalid_state(&self) -> bool {
        match self {
            ScanManagerError::AlreadyRunning | ScanManagerError::NoActiveScan => true,
        }
    }
}

/// Background detection loop plus the processor draining its queue.
#[derive(Debug)]
struct ScanTask {
    shutdown: watch::Sender<bool>,
    finished: watch::Receiver<bool>,
    handle: JoinHandle<()>,
}

/// Orchestrates one scan at a time.
pub struct ScanManager {
    scanner: Arc<dyn Scanner>,
    processor: Arc<Processor>,
    sessions: Arc<ScanRepository>,
    bus: Arc<EventBus>,
    queue_capacity: usize,
    task: Mutex<Option<ScanTask>>,
}

impl std::fmt::Debug for ScanManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanManager")
            .field("sessions", &self.sessions)
            .field("queue_capacity", &self.queue_capacity)
            .finish_non_exhaustive()
    }
}

impl ScanManager {
    pub fn new(
        scanner: Arc<dyn Scanner>,
        processor: Arc<Processor>,
        sessions: Arc<ScanRepository>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            scanner,
            processor,
            sessions,
            bus,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            task: Mutex::new(None),
        }
    }

    /// Capacity of the ingestion queue created for each scan.
    pub fn with_queue_capacity(mut self, queue_capacity: usize) -> Self {
        self.queue_capacity = queue_capacity;
        self
    }

    /// Start a scan in the background and return its session id.
    pub async fn start_scan(&self) -> Result<String, ScanManagerError> {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Err(ScanManagerError::AlreadyRunning);
        }

        let mut session = self.sessions.get_current().unwrap_or_else(ScanSession::new);
        session.start();
        let scan_id = session.id.clone();
        self.sessions.save(session);

        self.publish(DomainEvent::scan_started(scan_id.clone())).await;

        let (sink, queue) = ingest::channel(self.queue_capacity);
        let (shutdown, shutdown_rx) = watch::channel(false);
        let (finished_tx, finished) = watch::channel(false);
        let scanner = self.scanner.clone();
        let processor = self.processor.clone();
        let task_scan_id = scan_id.clone();

        let handle = tokio::spawn(async move {
            let mut stop = shutdown_rx.clone();
            let detect = async {
                tokio::select! {
                    result = scanner.start_scan(sink) => match result {
                        Ok(()) => debug!(scan_id = %task_scan_id, "detection loop finished"),
                        Err(e) => {
                            error!(scan_id = %task_scan_id, error = %e, "detection loop failed")
                        }
                    },
                    _ = ingest::stopped(&mut stop) => {
                        debug!(scan_id = %task_scan_id, "detection loop cancelled");
                    }
                }
            };
            tokio::join!(detect, processor.run(queue, shutdown_rx));
            finished_tx.send_replace(true);
        });

        *task = Some(ScanTask {
            shutdown,
            finished,
            handle,
        });
        info!(scan_id = %scan_id, "scan started in background");
        Ok(scan_id)
    }

    /// Stop the current scan and wait for its background task.
    pub async fn stop_scan(&self) -> Result<(), ScanManagerError> {
        let Some(session) = self.sessions.stop_current() else {
            return Err(ScanManagerError::NoActiveScan);
        };
        let device_count = session.device_count();
        let scan_id = session.id;

        if let Err(e) = self.scanner.stop_scan().await {
            warn!(scan_id = %scan_id, error = %e, "scanner did not stop cleanly");
        }

        if let Some(task) = self.task.lock().await.take() {
            task.shutdown.send_replace(true);
            if let Err(e) = task.handle.await {
                error!(scan_id = %scan_id, error = %e, "scan task ended abnormally");
            }
        }

        // Late detections processed before shutdown may have grown the set
        let device_count = self
            .sessions
            .get_current()
            .filter(|s| s.id == scan_id)
            .map_or(device_count, |s| s.device_count());

        self.publish(DomainEvent::scan_stopped(scan_id.clone(), device_count))
            .await;
        info!(scan_id = %scan_id, device_count, "scan stopped");
        Ok(())
    }

    /// Whether a background scan task is still running.
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Resolve once the background task has finished on its own, or at once
    /// when there is none.
    pub async fn wait_idle(&self) {
        let finished = self.task.lock().await.as_ref().map(|t| t.finished.clone());
        if let Some(mut finished) = finished {
            // A dropped sender means the task is gone as well
            let _ = finished.wait_for(|done| *done).await;
        }
    }

    async fn publish(&self, event: DomainEvent) {
        let type_name = event.type_name();
        if let Err(e) = self.bus.publish(event).await {
            error!(event = type_name, error = %e, "lifecycle event handlers failed");
        }
    }
}
