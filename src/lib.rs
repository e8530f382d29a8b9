//! `adwatch` library.
//!
//! The binary (`src/main.rs`) is responsible for logging setup, signals and
//! process exit codes. The pipeline itself lives in the modules below and is
//! assembled by [`crate::app`], where it can be tested deterministically
//! with an injected scanner and output stream.
//!
//! Data flows one way: scanner → [`ingest`] queue → [`processor`] →
//! [`decoder`] → [`store`] → observers → [`bus`] → output.

pub mod app;
pub mod bus;
pub mod decoder;
pub mod device;
pub mod duration;
pub mod events;
pub mod hex;
pub mod ingest;
pub mod manager;
pub mod observer;
pub mod output;
pub mod processor;
pub mod scanner;
pub mod session;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used types at the crate root
pub use bus::{EventBus, HandlerError, PublishError};
pub use decoder::{
    DecodeError, DecodedAdvertisement, DecodedResult, DecoderRegistry, PayloadDecoder, VendorInfo,
    VendorTable,
};
pub use device::{ConnectionState, DeviceSnapshot};
pub use events::{DomainEvent, EventPayload};
pub use ingest::{Detection, DetectionSink, IngestQueue};
pub use manager::{ScanManager, ScanManagerError};
pub use output::EventFormatter;
pub use output::json::JsonFormatter;
pub use processor::Processor;
pub use scanner::{ScanError, Scanner};
pub use session::{ScanRepository, ScanSession, ScanState};
pub use store::{ChangePolicy, ChangeRecord, DeviceObserver, DeviceStore, SaveOutcome};
