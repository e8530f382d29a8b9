//! Store observer that republishes device changes on the event bus.

use crate::bus::EventBus;
use crate::device::DeviceSnapshot;
use crate::events::DomainEvent;
use crate::store::{ChangeRecord, DeviceObserver, ObserverError, ObserverFuture};
use std::sync::Arc;
use tracing::debug;

/// Publishes `DeviceCreated` and `DeviceUpdated` for every store change.
///
/// The store only notifies significant updates, so every update becomes an
/// event. Handler failures come back as [`ObserverError::Publish`]; the store
/// logs them and `save` still succeeds.
#[derive(Debug, Clone)]
pub struct EventPublishingObserver {
    bus: Arc<EventBus>,
}

impl EventPublishingObserver {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    async fn publish(&self, event: DomainEvent, address: &str) -> Result<(), ObserverError> {
        let type_name = event.type_name();
        let handlers = self.bus.publish(event).await?;
        debug!(event = type_name, address, handlers, "published device event");
        Ok(())
    }
}

impl DeviceObserver for EventPublishingObserver {
    fn name(&self) -> &str {
        "event-publisher"
    }

    fn on_created(&self, device: DeviceSnapshot) -> ObserverFuture<'_> {
        Box::pin(async move {
            self.publish(DomainEvent::device_created(&device), &device.address)
                .await
        })
    }

    fn on_updated(&self, device: DeviceSnapshot, changes: ChangeRecord) -> ObserverFuture<'_> {
        Box::pin(async move {
            self.publish(
                DomainEvent::device_updated(device.address.clone(), changes),
                &device.address,
            )
            .await
        })
    }

    fn on_deleted(&self, address: String) -> ObserverFuture<'_> {
        Box::pin(async move {
            debug!(address = %address, "device deleted, no event published");
            Ok(())
        })
    }
}
