//! Benchmarks for the advertisement pipeline.
//!
//! Covers payload decoding on its own, the processor writing into the
//! device store, and the full application loop with a fake scanner feeding
//! detections through `run_with_io`.

use adwatch::app::{Options, run_with_io};
use adwatch::decoder::beacon::APPLE_VENDOR_ID;
use adwatch::scanner::ScanFuture;
use adwatch::{
    DecoderRegistry, Detection, DetectionSink, DeviceStore, Processor, ScanRepository, Scanner,
};
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Proximity beacon payload (major 1, minor 2, measured power -59 dBm)
fn beacon_payload() -> Vec<u8> {
    let mut data = vec![0x02, 0x15];
    data.extend_from_slice(&[
        0xE2, 0xC5, 0x6D, 0xB5, 0xDF, 0xFB, 0x48, 0xD2, 0xB0, 0x60, 0xD0, 0xF5, 0xA7, 0x10, 0x96,
        0xE0,
    ]);
    data.extend_from_slice(&[0x00, 0x01, 0x00, 0x02, 0xC5]);
    data
}

fn detection(i: usize, rssi: i16) -> Detection {
    Detection::new(format!("AA:BB:CC:DD:{:02X}:{:02X}", i / 256, i % 256), rssi)
        .with_payload(APPLE_VENDOR_ID, beacon_payload())
        .with_payload(0x0006, vec![0x01, 0x09, 0x20, 0x02])
}

/// A fake scanner that replays detections and returns, like the one in app.rs tests.
struct FakeScanner {
    detections: Vec<Detection>,
}

impl Scanner for FakeScanner {
    fn start_scan(&self, sink: DetectionSink) -> ScanFuture<'_> {
        Box::pin(async move {
            for d in self.detections.iter().cloned() {
                sink.push(d);
            }
            Ok(())
        })
    }

    fn stop_scan(&self) -> ScanFuture<'_> {
        Box::pin(async { Ok(()) })
    }
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let registry = DecoderRegistry::default();

    let beacon: BTreeMap<u16, Vec<u8>> = BTreeMap::from([(APPLE_VENDOR_ID, beacon_payload())]);
    let generic: BTreeMap<u16, Vec<u8>> = BTreeMap::from([(0x0006, vec![0x01, 0x09, 0x20, 0x02])]);
    let unknown: BTreeMap<u16, Vec<u8>> = BTreeMap::from([(0xFFFF, vec![0xAB; 24])]);

    group.throughput(Throughput::Elements(1));
    for (name, payloads) in [("beacon", &beacon), ("generic", &generic), ("unknown", &unknown)] {
        group.bench_function(name, |b| {
            b.iter(|| black_box(registry.decode(black_box(payloads))))
        });
    }

    group.finish();
}

/// Processor writing into the store: one new device, then repeat sightings
/// that the change policy discards.
fn bench_processor(c: &mut Criterion) {
    let mut group = c.benchmark_group("processor");
    let rt = Runtime::new().unwrap();

    group.throughput(Throughput::Elements(100));
    group.bench_function("100_sightings_same_device", |b| {
        b.iter(|| {
            let processor = Processor::new(
                Arc::new(DecoderRegistry::default()),
                Arc::new(DeviceStore::default()),
                Arc::new(ScanRepository::new()),
            );
            rt.block_on(async {
                for i in 0..100 {
                    processor.process(detection(0, -60 - (i % 3))).await;
                }
            });
            black_box(processor)
        })
    });

    group.finish();
}

/// Full application loop: scanner -> queue -> decode -> store -> bus -> NDJSON
fn bench_app_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("app_pipeline");
    let rt = Runtime::new().unwrap();

    for devices in [1, 10, 100] {
        group.throughput(Throughput::Elements(devices as u64));
        group.bench_with_input(BenchmarkId::from_parameter(devices), &devices, |b, &n| {
            let detections: Vec<Detection> = (0..n).map(|i| detection(i, -60)).collect();

            b.iter(|| {
                let scanner = Arc::new(FakeScanner {
                    detections: detections.clone(),
                });
                let options = Options {
                    queue_capacity: n.max(1),
                    ..Options::default()
                };
                let mut out = Vec::<u8>::with_capacity(1024 * (n + 2));

                rt.block_on(async {
                    run_with_io(options, scanner, &mut out, std::future::pending())
                        .await
                        .unwrap();
                });

                // scan_started + one device_created per device + scan_stopped
                debug_assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), n + 2);

                black_box(out)
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_decode, bench_processor, bench_app_pipeline);
criterion_main!(benches);
