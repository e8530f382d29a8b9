//! In-process publish/subscribe for [`DomainEvent`]s.
//!
//! Handlers subscribe by event type name. Publishing runs every handler for
//! that type on its own task and waits for all of them; a failing handler
//! is reported in the returned [`PublishError`] without stopping the rest.

use crate::events::DomainEvent;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::debug;

/// Error returned by an event handler.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Error returned by [`EventBus::publish`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// One or more handlers failed; the others still ran.
    #[error("{} of {total} handlers failed for {event}: {}", .errors.len(), .errors.join("; "))]
    HandlerExecution {
        event: &'static str,
        total: usize,
        errors: Vec<String>,
    },
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

type Handler = Arc<dyn Fn(Arc<DomainEvent>) -> HandlerFuture + Send + Sync>;

/// Subscription table keyed by event type name.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Handler>>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read().unwrap_or_else(PoisonError::into_inner);
        let counts: HashMap<&str, usize> =
            handlers.iter().map(|(k, v)| (k.as_str(), v.len())).collect();
        f.debug_struct("EventBus").field("handlers", &counts).finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events named `type_name` (e.g. `"DeviceCreated"`).
    pub fn subscribe<F, Fut>(&self, type_name: impl Into<String>, handler: F)
    where
        F: Fn(Arc<DomainEvent>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let type_name = type_name.into();
        let handler: Handler = Arc::new(move |event| -> HandlerFuture { Box::pin(handler(event)) });
        debug!(event = %type_name, "event handler subscribed");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(type_name)
            .or_default()
            .push(handler);
    }

    pub fn handler_count(&self, type_name: &str) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler subscribed to its type.
    ///
    /// Returns the number of handlers that ran. With no subscribers this is a
    /// no-op returning `Ok(0)`.
    pub async fn publish(&self, event: DomainEvent) -> Result<usize, PublishError> {
        let type_name = event.type_name();
        let handlers: Vec<Handler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(type_name)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            return Ok(0);
        }

        let total = handlers.len();
        let event = Arc::new(event);
        let tasks = handlers
            .into_iter()
            .map(|handler| {
                let event = event.clone();
                tokio::spawn(async move { handler(event).await })
            });

        let errors: Vec<String> = join_all(tasks)
            .await
            .into_iter()
            .filter_map(|joined| match joined {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(e) => Some(format!("handler panicked: {e}")),
            })
            .collect();

        debug!(event = type_name, handlers = total, failed = errors.len(), "event published");

        if errors.is_empty() {
            Ok(total)
        } else {
            Err(PublishError::HandlerExecution {
                event: type_name,
                total,
                errors,
            })
        }
    }
}
