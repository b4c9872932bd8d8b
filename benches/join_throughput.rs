//! Throughput benchmarks for the watermark join and the tracker operator.

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use std::num::NonZeroU64;
use tracksync::config::TrackerConfig;
use tracksync::operators::{CAMERA_STREAM, OBSTACLES_STREAM, ObjectTrackerOperator, Operator, TrackerInput};
use tracksync::stream::{BufferConfig, StreamOptions, WatermarkCoordinator};
use tracksync::temporal::{DataMessage, Timestamp};
use tracksync::tracking::{
    BoundingBox2D, DetectionBatch, Obstacle, TrackOutput, TrackedObstacleSet, Tracker, TrackerKind,
    TrackerRegistry,
};

const TICKS: u64 = 1000;

/// A tracker that echoes its last detections.
struct EchoTracker {
    obstacles: TrackedObstacleSet,
}

impl Tracker<u64> for EchoTracker {
    fn reinitialize(&mut self, _frame: &u64, detections: &DetectionBatch) {
        self.obstacles = TrackedObstacleSet::new(detections.obstacles.clone());
    }

    fn track(&mut self, _frame: &u64) -> TrackOutput {
        TrackOutput::ok(self.obstacles.clone())
    }
}

fn detections(count: usize) -> DetectionBatch {
    DetectionBatch::new(
        (0..count)
            .map(|i| Obstacle::new("car", 0.9, BoundingBox2D::new(i as f32, 0.0, i as f32 + 1.0, 1.0)))
            .collect(),
    )
}

fn bench_coordinator_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator_join");

    for streams in [1usize, 2, 4, 8].iter() {
        group.throughput(Throughput::Elements(TICKS));
        group.bench_with_input(BenchmarkId::from_parameter(streams), streams, |b, &streams| {
            let names: Vec<String> = (0..streams).map(|i| format!("s{}", i)).collect();
            b.iter(|| {
                let mut coordinator = WatermarkCoordinator::new("bench");
                for name in &names {
                    coordinator.register_stream(name.as_str(), true).unwrap();
                }
                let mut joined = 0u64;
                for t in 1..=TICKS {
                    for name in &names {
                        coordinator.on_data(name, DataMessage::new(t, t)).unwrap();
                    }
                    for name in &names {
                        if coordinator
                            .on_watermark(name, Timestamp::from(t))
                            .unwrap()
                            .is_some()
                        {
                            joined += 1;
                        }
                    }
                }
                black_box(joined)
            });
        });
    }

    group.finish();
}

fn bench_coordinator_lagging_stream(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinator_lagging_stream");

    // One stream holds back its watermarks until the end, then all ticks
    // drain through poll().
    for backlog in [16u64, 256, 4096].iter() {
        group.throughput(Throughput::Elements(*backlog));
        group.bench_with_input(BenchmarkId::from_parameter(backlog), backlog, |b, &backlog| {
            b.iter(|| {
                let mut coordinator = WatermarkCoordinator::new("bench");
                let buffer = BufferConfig::with_capacity(backlog as usize);
                for name in ["fast", "slow"] {
                    coordinator
                        .register_stream_with(name, StreamOptions::required().with_buffer(buffer))
                        .unwrap();
                }
                for t in 1..=backlog {
                    coordinator.on_data("fast", DataMessage::new(t, t)).unwrap();
                    coordinator.on_watermark("fast", Timestamp::from(t)).unwrap();
                    coordinator.on_data("slow", DataMessage::new(t, t)).unwrap();
                }
                let mut joined = 0u64;
                let mut next = coordinator
                    .on_watermark("slow", Timestamp::from(backlog))
                    .unwrap();
                while let Some(tick) = next {
                    black_box(tick);
                    joined += 1;
                    next = coordinator.poll().unwrap();
                }
                black_box(joined)
            });
        });
    }

    group.finish();
}

fn bench_tracker_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_tick");

    for obstacles in [0usize, 16, 128].iter() {
        group.throughput(Throughput::Elements(TICKS));
        group.bench_with_input(
            BenchmarkId::from_parameter(obstacles),
            obstacles,
            |b, &obstacles| {
                let mut registry: TrackerRegistry<u64> = TrackerRegistry::new();
                registry.register(TrackerKind::Sort, || {
                    Ok(Box::new(EchoTracker {
                        obstacles: TrackedObstacleSet::empty(),
                    }))
                });
                let batch = detections(obstacles);
                let config = TrackerConfig::new(TrackerKind::Sort)
                    .with_track_every_nth_detection(NonZeroU64::new(10).unwrap());

                b.iter(|| {
                    let mut op = ObjectTrackerOperator::new(config.clone(), &registry).unwrap();
                    for t in 1..=TICKS {
                        op.on_data(
                            OBSTACLES_STREAM,
                            DataMessage::new(t, TrackerInput::Obstacles(batch.clone())),
                        )
                        .unwrap();
                        op.on_watermark(OBSTACLES_STREAM, Timestamp::from(t)).unwrap();
                        op.on_data(CAMERA_STREAM, DataMessage::new(t, TrackerInput::Frame(t)))
                            .unwrap();
                        op.on_watermark(CAMERA_STREAM, Timestamp::from(t)).unwrap();
                    }
                    black_box(op.state().ticks())
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_coordinator_join,
    bench_coordinator_lagging_stream,
    bench_tracker_tick
);
criterion_main!(benches);
