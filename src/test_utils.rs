use crate::bus::EventBus;
use crate::device::DeviceSnapshot;
use crate::events::DomainEvent;
use crate::ingest::{Detection, DetectionSink};
use crate::scanner::{ScanFuture, Scanner};
use crate::store::{ChangeRecord, DeviceObserver, ObserverError, ObserverFuture};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

/// A stable beacon UUID for unit tests.
pub const TEST_BEACON_UUID: &str = "e2c56db5-dffb-48d2-b060-d0f5a71096e0";

/// Apple manufacturer payload for a proximity beacon with [`TEST_BEACON_UUID`].
pub fn beacon_payload(major: u16, minor: u16, measured_power: i8) -> Vec<u8> {
    let uuid = Uuid::parse_str(TEST_BEACON_UUID).unwrap();
    let mut data = vec![0x02, 0x15];
    data.extend_from_slice(uuid.as_bytes());
    data.extend_from_slice(&major.to_be_bytes());
    data.extend_from_slice(&minor.to_be_bytes());
    data.push(measured_power as u8);
    data
}

/// A disconnected device with no payloads.
pub fn snapshot(address: &str, rssi: i16) -> DeviceSnapshot {
    DeviceSnapshot::new(address, rssi)
}

/// Subscribe a handler that records every event of the given types.
pub fn collect_events(bus: &EventBus, type_names: &[&str]) -> Arc<Mutex<Vec<DomainEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for type_name in type_names {
        let events = events.clone();
        bus.subscribe(*type_name, move |event: Arc<DomainEvent>| {
            let events = events.clone();
            async move {
                events.lock().unwrap().push((*event).clone());
                Ok(())
            }
        });
    }
    events
}

/// Observer callback as seen by [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Created(String),
    Updated(String, ChangeRecord),
    Deleted(String),
}

/// Observer that records its callbacks, optionally sleeping first.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    calls: Mutex<Vec<Call>>,
    delay: Option<Duration>,
}

impl RecordingObserver {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            delay: Some(delay),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: Call) -> Result<(), ObserverError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(call);
        Ok(())
    }
}

impl DeviceObserver for RecordingObserver {
    fn on_created(&self, device: DeviceSnapshot) -> ObserverFuture<'_> {
        Box::pin(self.record(Call::Created(device.address)))
    }

    fn on_updated(&self, device: DeviceSnapshot, changes: ChangeRecord) -> ObserverFuture<'_> {
        Box::pin(self.record(Call::Updated(device.address, changes)))
    }

    fn on_deleted(&self, address: String) -> ObserverFuture<'_> {
        Box::pin(self.record(Call::Deleted(address)))
    }
}

/// Observer that fails every callback, either with an error or a panic.
#[derive(Debug)]
pub struct FailingObserver {
    pub panic: bool,
}

impl FailingObserver {
    fn fail(&self) -> ObserverFuture<'_> {
        let panic = self.panic;
        Box::pin(async move {
            if panic {
                panic!("observer bug");
            }
            Err::<(), _>(ObserverError::Failed("downstream unavailable".into()))
        })
    }
}

impl DeviceObserver for FailingObserver {
    fn on_created(&self, _device: DeviceSnapshot) -> ObserverFuture<'_> {
        self.fail()
    }

    fn on_updated(&self, _device: DeviceSnapshot, _changes: ChangeRecord) -> ObserverFuture<'_> {
        self.fail()
    }

    fn on_deleted(&self, _address: String) -> ObserverFuture<'_> {
        self.fail()
    }
}

/// Scanner that replays a fixed list of detections.
///
/// By default the detection loop ends after the replay. With
/// [`FakeScanner::hold_open`] it keeps running until `stop_scan`.
#[derive(Debug)]
pub struct FakeScanner {
    detections: Vec<Detection>,
    hold_open: bool,
    stopped: watch::Sender<bool>,
    starts: AtomicUsize,
    stops: AtomicUsize,
}

impl FakeScanner {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            hold_open: false,
            stopped: watch::Sender::new(false),
            starts: AtomicUsize::new(0),
            stops: AtomicUsize::new(0),
        }
    }

    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl Scanner for FakeScanner {
    fn start_scan(&self, sink: DetectionSink) -> ScanFuture<'_> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.stopped.send_replace(false);
        let mut stopped = self.stopped.subscribe();
        Box::pin(async move {
            for detection in self.detections.iter().cloned() {
                sink.push(detection);
            }
            if self.hold_open {
                let _ = stopped.wait_for(|stopped| *stopped).await;
            }
            Ok(())
        })
    }

    fn stop_scan(&self) -> ScanFuture<'_> {
        Box::pin(async move {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.stopped.send_replace(true);
            Ok(())
        })
    }
}
