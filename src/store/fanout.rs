//! Concurrent delivery of store notifications to observers.

use super::{ChangeRecord, DeviceObserver};
use crate::device::DeviceSnapshot;
use futures::future::join_all;
use std::sync::Arc;
use tracing::error;

/// A store change to deliver.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    Created(DeviceSnapshot),
    Updated(DeviceSnapshot, ChangeRecord),
    Deleted(String),
}

impl Notification {
    fn kind(&self) -> &'static str {
        match self {
            Notification::Created(_) => "created",
            Notification::Updated(..) => "updated",
            Notification::Deleted(_) => "deleted",
        }
    }

    fn address(&self) -> &str {
        match self {
            Notification::Created(device) | Notification::Updated(device, _) => &device.address,
            Notification::Deleted(address) => address,
        }
    }
}

/// Deliver `notification` to every observer, each on its own task, and wait
/// for all of them. Returns the number of observers that failed.
///
/// A failing or panicking observer is logged and does not affect the others.
pub(crate) async fn notify_all(
    observers: Vec<Arc<dyn DeviceObserver>>,
    notification: Notification,
) -> usize {
    if observers.is_empty() {
        return 0;
    }

    let handles: Vec<_> = observers
        .into_iter()
        .map(|observer| {
            let notification = notification.clone();
            tokio::spawn(async move {
                let kind = notification.kind();
                let address = notification.address().to_string();
                let result = match notification {
                    Notification::Created(device) => observer.on_created(device).await,
                    Notification::Updated(device, changes) => {
                        observer.on_updated(device, changes).await
                    }
                    Notification::Deleted(address) => observer.on_deleted(address).await,
                };
                if let Err(e) = &result {
                    error!(
                        observer = observer.name(),
                        notification = kind,
                        address = %address,
                        error = %e,
                        "observer failed"
                    );
                }
                result.is_ok()
            })
        })
        .collect();

    join_all(handles)
        .await
        .into_iter()
        .filter(|joined| match joined {
            Ok(ok) => !ok,
            Err(e) => {
                error!(notification = notification.kind(), error = %e, "observer task aborted");
                true
            }
        })
        .count()
}
