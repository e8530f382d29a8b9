//! Observable in-memory device store.
//!
//! The store keeps one [`DeviceSnapshot`] per address. `save` applies the
//! [`ChangePolicy`] to repeat sightings and notifies subscribed
//! [`DeviceObserver`]s of creations and significant updates. The map lock is
//! released before observers run, so slow observers never block readers.

mod fanout;
pub mod policy;

use crate::bus::PublishError;
use crate::device::DeviceSnapshot;
use fanout::{Notification, notify_all};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

pub use policy::{ChangePolicy, ChangeRecord, DEFAULT_RSSI_THRESHOLD};

/// Failure reported by an observer.
#[derive(Error, Debug)]
pub enum ObserverError {
    #[error("observer failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Boxed future returned by observer callbacks.
pub type ObserverFuture<'a> = Pin<Box<dyn Future<Output = Result<(), ObserverError>> + Send + 'a>>;

/// Receives store change notifications.
///
/// Each callback runs on its own task; errors are logged by the store and
/// never reach the caller of `save`/`delete`.
pub trait DeviceObserver: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_created(&self, device: DeviceSnapshot) -> ObserverFuture<'_>;

    fn on_updated(&self, device: DeviceSnapshot, changes: ChangeRecord) -> ObserverFuture<'_>;

    fn on_deleted(&self, _address: String) -> ObserverFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

/// What `save` did with a candidate snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// First sighting of the address
    Created,
    /// Significant change, stored snapshot replaced
    Updated(ChangeRecord),
    /// Insignificant change, candidate discarded
    Unchanged,
}

/// Concurrency-safe keyed map of last-known device state.
pub struct DeviceStore {
    devices: Mutex<HashMap<String, DeviceSnapshot>>,
    observers: RwLock<Vec<Arc<dyn DeviceObserver>>>,
    policy: ChangePolicy,
}

impl std::fmt::Debug for DeviceStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceStore")
            .field("policy", &self.policy)
            .field("observers", &self.observer_count())
            .finish_non_exhaustive()
    }
}

impl Default for DeviceStore {
    fn default() -> Self {
        Self::new(ChangePolicy::default())
    }
}

impl DeviceStore {
    pub fn new(policy: ChangePolicy) -> Self {
        Self {
            devices: Mutex::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            policy,
        }
    }

    pub fn policy(&self) -> ChangePolicy {
        self.policy
    }

    /// Store `candidate` and notify observers.
    ///
    /// A new address is inserted and announced with `on_created`. For a known
    /// address the candidate replaces the stored snapshot only when the
    /// policy deems the change significant; a candidate without a name keeps
    /// the stored name, and the stored connection state is preserved.
    /// Returns once every observer has finished.
    pub async fn save(&self, candidate: DeviceSnapshot) -> SaveOutcome {
        let (outcome, notification) = {
            let mut devices = self.devices.lock().await;
            match devices.entry(candidate.address.clone()) {
                Entry::Vacant(slot) => {
                    debug!(address = %candidate.address, rssi = candidate.rssi, "device created");
                    slot.insert(candidate.clone());
                    (SaveOutcome::Created, Notification::Created(candidate))
                }
                Entry::Occupied(mut slot) => {
                    let stored = slot.get_mut();
                    let Some(changes) = self.policy.evaluate(stored, &candidate) else {
                        return SaveOutcome::Unchanged;
                    };
                    let mut next = candidate;
                    if next.display_name().is_none() {
                        next.name = stored.name.clone();
                    }
                    next.state = stored.state;
                    debug!(
                        address = %next.address,
                        rssi = next.rssi,
                        rssi_delta = changes.rssi_delta,
                        name_changed = changes.name_changed,
                        payload_changed = changes.payload_changed,
                        "device updated"
                    );
                    *stored = next.clone();
                    (
                        SaveOutcome::Updated(changes.clone()),
                        Notification::Updated(next, changes),
                    )
                }
            }
        };

        notify_all(self.observers(), notification).await;
        outcome
    }

    /// Copy of the snapshot stored for `address`.
    pub async fn get(&self, address: &str) -> Option<DeviceSnapshot> {
        self.devices.lock().await.get(address).cloned()
    }

    /// Copies of all stored snapshots, ordered by address.
    pub async fn get_all(&self) -> Vec<DeviceSnapshot> {
        let mut all: Vec<DeviceSnapshot> = self.devices.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.address.cmp(&b.address));
        all
    }

    /// Remove `address`, notifying `on_deleted` if it was present.
    pub async fn delete(&self, address: &str) -> bool {
        let removed = self.devices.lock().await.remove(address).is_some();
        if removed {
            debug!(address, "device deleted");
            notify_all(self.observers(), Notification::Deleted(address.to_string())).await;
        }
        removed
    }

    /// Remove every device without notifying observers.
    pub async fn clear(&self) {
        self.devices.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.devices.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.lock().await.is_empty()
    }

    /// Add an observer. Subscribing the same observer twice is a no-op and
    /// returns `false`.
    pub fn subscribe(&self, observer: Arc<dyn DeviceObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        if observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        debug!(observer = observer.name(), "observer subscribed");
        observers.push(observer);
        true
    }

    /// Remove an observer. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, observer: &Arc<dyn DeviceObserver>) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        let removed = observers.len() != before;
        if removed {
            debug!(observer = observer.name(), "observer unsubscribed");
        }
        removed
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn observers(&self) -> Vec<Arc<dyn DeviceObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
