//! Scan sessions and their in-memory repository.

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Idle,
    Scanning,
    Stopped,
}

/// One scan run and the addresses it discovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanSession {
    pub id: String,
    pub state: ScanState,
    pub discovered: BTreeSet<String>,
}

impl ScanSession {
    /// New idle session with a random id.
    pub fn new() -> Self {
        Self::with_id(Uuid::new_v4().to_string())
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            state: ScanState::Idle,
            discovered: BTreeSet::new(),
        }
    }

    /// Begin a run. A restarted session keeps its id but forgets the
    /// addresses of the previous run.
    pub fn start(&mut self) {
        if self.state == ScanState::Stopped {
            self.discovered.clear();
        }
        self.state = ScanState::Scanning;
    }

    pub fn stop(&mut self) {
        self.state = ScanState::Stopped;
    }

    pub fn is_scanning(&self) -> bool {
        self.state == ScanState::Scanning
    }

    pub fn device_count(&self) -> usize {
        self.discovered.len()
    }
}

impl Default for ScanSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the current scan session.
#[derive(Debug, Default)]
pub struct ScanRepository {
    current: Mutex<Option<ScanSession>>,
}

impl ScanRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_current(&self) -> Option<ScanSession> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn save(&self, session: ScanSession) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(session);
    }

    /// Stop the current session in place and return a copy of it.
    ///
    /// `None` when there is no session or it is not scanning. Discoveries
    /// recorded concurrently are never lost, unlike a `get_current` + `save`
    /// round trip.
    pub fn stop_current(&self) -> Option<ScanSession> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let session = current.as_mut().filter(|s| s.is_scanning())?;
        session.stop();
        Some(session.clone())
    }

    /// Add `address` to the current session. Returns `true` for a first sighting.
    pub fn record_discovery(&self, address: &str) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_mut() {
            Some(session) if !session.discovered.contains(address) => {
                session.discovered.insert(address.to_string())
            }
            _ => false,
        }
    }
}
