//! BlueZ D-Bus scanner backend.
//!
//! This backend uses the `bluer` crate to communicate with the BlueZ daemon
//! via D-Bus. It requires the `bluetoothd` daemon to be running.

use super::{ScanError, ScanFuture, Scanner};
use crate::ingest::{Detection, DetectionSink, stopped};
use bluer::{Adapter, AdapterEvent, Address, DiscoveryFilter, DiscoveryTransport, Session};
use futures::{StreamExt, pin_mut};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info};

impl From<bluer::Error> for ScanError {
    fn from(err: bluer::Error) -> Self {
        ScanError::Bluetooth(err.to_string())
    }
}

/// LE discovery on the default adapter.
///
/// Every added or changed device becomes a [`Detection`]. Duplicate
/// advertisements are requested so RSSI updates keep flowing.
#[derive(Debug)]
pub struct BluerScanner {
    stop: watch::Sender<bool>,
}

impl BluerScanner {
    pub fn new() -> Self {
        Self {
            stop: watch::Sender::new(false),
        }
    }

    async fn discover(
        &self,
        sink: DetectionSink,
        mut stop: watch::Receiver<bool>,
    ) -> Result<(), ScanError> {
        let session = Session::new().await?;
        let adapter = session.default_adapter().await?;
        adapter.set_powered(true).await?;
        adapter
            .set_discovery_filter(DiscoveryFilter {
                transport: DiscoveryTransport::Le,
                duplicate_data: true,
                ..Default::default()
            })
            .await?;

        let events = adapter.discover_devices_with_changes().await?;
        pin_mut!(events);
        info!(adapter = adapter.name(), "discovery started");

        loop {
            tokio::select! {
                _ = stopped(&mut stop) => break,
                event = events.next() => match event {
                    Some(AdapterEvent::DeviceAdded(address)) => {
                        match read_detection(&adapter, address).await {
                            Ok(Some(detection)) => {
                                sink.push(detection);
                            }
                            Ok(None) => {}
                            Err(e) => {
                                debug!(%address, error = %e, "could not read device properties")
                            }
                        }
                    }
                    Some(_) => {}
                    None => break,
                },
            }
        }

        info!(adapter = adapter.name(), "discovery stopped");
        Ok(())
    }
}

impl Default for BluerScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner for BluerScanner {
    fn start_scan(&self, sink: DetectionSink) -> ScanFuture<'_> {
        self.stop.send_replace(false);
        let stop = self.stop.subscribe();
        Box::pin(self.discover(sink, stop))
    }

    fn stop_scan(&self) -> ScanFuture<'_> {
        self.stop.send_replace(true);
        Box::pin(async { Ok(()) })
    }
}

/// Read the properties of a discovered device. Devices BlueZ reports from
/// its cache without a live RSSI are skipped.
async fn read_detection(
    adapter: &Adapter,
    address: Address,
) -> Result<Option<Detection>, ScanError> {
    let device = adapter.device(address)?;
    let Some(rssi) = device.rssi().await? else {
        return Ok(None);
    };
    let name = device.name().await?;
    let manufacturer_data = device.manufacturer_data().await?.unwrap_or_default();
    Ok(Some(to_detection(address, name, rssi, manufacturer_data)))
}

fn to_detection(
    address: Address,
    name: Option<String>,
    rssi: i16,
    manufacturer_data: HashMap<u16, Vec<u8>>,
) -> Detection {
    let mut detection = Detection::new(address.to_string(), rssi);
    detection.name = name;
    detection.manufacturer_data = manufacturer_data.into_iter().collect();
    detection
}
