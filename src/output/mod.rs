//! Output formatters for domain events.
//!
//! Formatters reshape [`DomainEvent`]s for an external transport. The core
//! event shape stays untouched; any renaming or nesting happens here.

pub mod json;

use crate::events::DomainEvent;
use thiserror::Error;

/// Error returned when an event cannot be formatted.
#[derive(Error, Debug)]
pub enum FormatError {
    #[error("cannot serialize event: {0}")]
    Json(#[from] serde_json::Error),
}

/// Trait for formatting events into output lines.
///
/// Implementations of this trait convert a `DomainEvent` into a single line
/// (without trailing newline) suitable for a specific transport.
pub trait EventFormatter: Send + Sync {
    fn format(&self, event: &DomainEvent) -> Result<String, FormatError>;
}
