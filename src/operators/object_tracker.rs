//! Object tracker operator.
//!
//! Joins camera frames with detector output by watermark and feeds each
//! joined tick to a [`TrackingStateMachine`]. The tracked obstacles of every
//! tick are emitted, followed by the tick's watermark.
//!
//! | Stream | Role | Payload |
//! |--------|------|---------|
//! | `camera` | required | [`TrackerInput::Frame`] |
//! | `obstacles` | optional, gates the join | [`TrackerInput::Obstacles`] |
//! | `time_to_decision` | side input, logged only | [`TrackerInput::TimeToDecision`] |

use super::{Lifecycle, Operator};
use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::observability::{OperatorMetrics, span_tick};
use crate::stream::{
    Emitter, JoinedTick, Progress, Stream, StreamId, StreamOptions, WatermarkCoordinator,
};
use crate::temporal::{DataMessage, StreamEvent, Timestamp};
use crate::tracking::{
    DetectionBatch, TickReport, TrackedObstacleSet, TrackerRegistry, TrackingStateMachine,
};

/// Camera frames (required).
pub const CAMERA_STREAM: &str = "camera";
/// Detector output (optional).
pub const OBSTACLES_STREAM: &str = "obstacles";
/// Remaining decision budget in milliseconds (logged only).
pub const TIME_TO_DECISION_STREAM: &str = "time_to_decision";

/// Payload of the object tracker's input streams.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackerInput<F> {
    /// A camera frame.
    Frame(F),
    /// Obstacles detected in the frame of the same tick.
    Obstacles(DetectionBatch),
    /// Time left to make a decision, in milliseconds.
    TimeToDecision(u64),
}

impl<F> TrackerInput<F> {
    fn into_frame(self, stream: &StreamId) -> Result<F> {
        match self {
            TrackerInput::Frame(frame) => Ok(frame),
            _ => Err(Error::PayloadMismatch {
                stream: stream.clone(),
                expected: "frame",
            }),
        }
    }

    fn into_obstacles(self, stream: &StreamId) -> Result<DetectionBatch> {
        match self {
            TrackerInput::Obstacles(batch) => Ok(batch),
            _ => Err(Error::PayloadMismatch {
                stream: stream.clone(),
                expected: "obstacles",
            }),
        }
    }
}

/// Tracks obstacles across camera frames.
///
/// # Example
///
/// ```rust
/// use tracksync::config::TrackerConfig;
/// use tracksync::operators::{CAMERA_STREAM, OBSTACLES_STREAM, ObjectTrackerOperator, Operator, TrackerInput};
/// use tracksync::temporal::{DataMessage, Timestamp};
/// use tracksync::tracking::{
///     DetectionBatch, TrackOutput, TrackedObstacleSet, Tracker, TrackerKind, TrackerRegistry,
/// };
///
/// struct NullTracker;
///
/// impl Tracker<String> for NullTracker {
///     fn reinitialize(&mut self, _frame: &String, _detections: &DetectionBatch) {}
///     fn track(&mut self, _frame: &String) -> TrackOutput {
///         TrackOutput::ok(TrackedObstacleSet::empty())
///     }
/// }
///
/// let mut registry: TrackerRegistry<String> = TrackerRegistry::new();
/// registry.register(TrackerKind::Sort, || Ok(Box::new(NullTracker)));
///
/// let mut op = ObjectTrackerOperator::new(TrackerConfig::new(TrackerKind::Sort), &registry).unwrap();
/// op.on_data(CAMERA_STREAM, DataMessage::new(1, TrackerInput::Frame("frame-1".to_string()))).unwrap();
/// op.on_watermark(CAMERA_STREAM, Timestamp::from(1)).unwrap();
/// op.on_watermark(OBSTACLES_STREAM, Timestamp::from(1)).unwrap();
///
/// assert_eq!(op.last_report().unwrap().timestamp, Timestamp::from(1));
/// ```
pub struct ObjectTrackerOperator<F> {
    config: TrackerConfig,
    coordinator: WatermarkCoordinator<TrackerInput<F>>,
    state: TrackingStateMachine<F>,
    emitter: Emitter<TrackedObstacleSet>,
    metrics: OperatorMetrics,
    lifecycle: Lifecycle,
    last_report: Option<TickReport>,
    last_time_to_decision: Option<u64>,
}

impl<F> ObjectTrackerOperator<F> {
    /// Build the operator, constructing its tracker from `registry`.
    ///
    /// Fails with [`Error::UnsupportedTrackerKind`] when the configured kind
    /// has no registered constructor.
    pub fn new(config: TrackerConfig, registry: &TrackerRegistry<F>) -> Result<Self> {
        config.validate()?;
        let tracker = registry.create(config.tracker_kind)?;
        let metrics = OperatorMetrics::new(&config.name);

        let mut coordinator = WatermarkCoordinator::new(config.name.clone());
        coordinator.register_stream_with(
            CAMERA_STREAM,
            StreamOptions::required().with_buffer(config.camera_buffer),
        )?;
        coordinator.register_stream_with(
            OBSTACLES_STREAM,
            StreamOptions::optional()
                .with_await_watermark(true)
                .with_buffer(config.obstacles_buffer),
        )?;

        let state = TrackingStateMachine::new(tracker, config.track_every_nth_detection)
            .with_categories(config.categories.clone())
            .with_failure_history(config.failure_history)
            .with_metrics(metrics.clone());
        let output = Stream::new(format!("{}/obstacles_tracking", config.name));

        tracing::info!(
            operator = %config.name,
            tracker = %config.tracker_kind,
            track_every_nth_detection = config.track_every_nth_detection.get(),
            "object tracker ready"
        );

        Ok(Self {
            lifecycle: Lifecycle::new(config.name.clone()),
            coordinator,
            state,
            emitter: Emitter::new(output),
            metrics,
            last_report: None,
            last_time_to_decision: None,
            config,
        })
    }

    /// Subscribe to the tracked obstacles output.
    pub fn subscribe<H>(&mut self, handler: H)
    where
        H: FnMut(StreamEvent<TrackedObstacleSet>) -> Result<()> + Send + 'static,
    {
        self.emitter.stream_mut().subscribe(handler);
    }

    /// The output stream.
    pub fn output(&self) -> &Stream<TrackedObstacleSet> {
        self.emitter.stream()
    }

    /// The operator's configuration.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The tracking state machine.
    pub fn state(&self) -> &TrackingStateMachine<F> {
        &self.state
    }

    /// The input coordinator.
    pub fn coordinator(&self) -> &WatermarkCoordinator<TrackerInput<F>> {
        &self.coordinator
    }

    /// Report of the most recently processed tick.
    pub fn last_report(&self) -> Option<&TickReport> {
        self.last_report.as_ref()
    }

    /// Most recent time-to-decision value received.
    pub fn last_time_to_decision(&self) -> Option<u64> {
        self.last_time_to_decision
    }

    /// Whether a fatal error halted the operator.
    pub fn is_halted(&self) -> bool {
        self.lifecycle.is_halted()
    }

    /// Discard all buffered input and refuse further calls.
    pub fn shutdown(&mut self) -> usize {
        let discarded = self.coordinator.shutdown();
        self.lifecycle.stop();
        tracing::info!(operator = %self.lifecycle.name(), discarded, "object tracker shut down");
        discarded
    }

    fn process(&mut self, mut tick: JoinedTick<TrackerInput<F>>) -> Result<()> {
        let timestamp = tick.timestamp().clone();
        let _span = span_tick(self.lifecycle.name(), &timestamp).entered();
        let _timer = self.metrics.start_timer();
        self.metrics.record_join();

        let camera = StreamId::from(CAMERA_STREAM);
        let frame = tick
            .take(&camera)
            .ok_or_else(|| Error::Desync {
                stream: camera.clone(),
                expected: timestamp.clone(),
                found: None,
            })?
            .into_payload()
            .into_frame(&camera)?;

        let obstacles = StreamId::from(OBSTACLES_STREAM);
        let detections = tick
            .take(&obstacles)
            .map(|msg| msg.into_payload().into_obstacles(&obstacles))
            .transpose()?;

        let report = self.state.on_tick(&timestamp, &frame, detections);
        tracing::debug!(
            operator = %self.lifecycle.name(),
            timestamp = %timestamp,
            obstacles = report.obstacles.len(),
            reinitialized = report.reinitialized,
            tracker_ok = report.tracker_ok,
            "tracked frame"
        );

        // Inputs are drained; a tick that cannot be closed halts.
        let emitted = self.emitter.emit_one(&timestamp, report.obstacles.clone());
        self.last_report = Some(report);
        if let Err(err) = &emitted {
            self.lifecycle.halt(err);
        }
        emitted
    }

    fn on_time_to_decision(&mut self, msg: DataMessage<TrackerInput<F>>) -> Result<()> {
        let (timestamp, payload) = msg.into_parts();
        match payload {
            TrackerInput::TimeToDecision(ms) => {
                tracing::debug!(
                    operator = %self.lifecycle.name(),
                    timestamp = %timestamp,
                    time_to_decision_ms = ms,
                    "time to decision"
                );
                self.last_time_to_decision = Some(ms);
                Ok(())
            }
            _ => Err(Error::PayloadMismatch {
                stream: StreamId::from(TIME_TO_DECISION_STREAM),
                expected: "time to decision",
            }),
        }
    }

    fn handle_data(
        &mut self,
        stream: &str,
        msg: DataMessage<TrackerInput<F>>,
    ) -> Result<Option<DataMessage<TrackerInput<F>>>> {
        if stream == TIME_TO_DECISION_STREAM {
            self.on_time_to_decision(msg)?;
            return Ok(None);
        }
        match self.coordinator.on_data(stream, msg)? {
            Progress::Pending => Ok(None),
            Progress::Joined(tick) => {
                self.process(tick)?;
                Ok(None)
            }
            Progress::Blocked(msg) => Ok(Some(msg)),
        }
    }

    fn handle_watermark(&mut self, stream: &str, timestamp: Timestamp) -> Result<()> {
        if stream == TIME_TO_DECISION_STREAM {
            return Ok(());
        }
        if let Some(tick) = self.coordinator.on_watermark(stream, timestamp)? {
            self.process(tick)?;
        }
        Ok(())
    }

    fn handle_poll(&mut self) -> Result<bool> {
        match self.coordinator.poll()? {
            Some(tick) => {
                self.process(tick)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<F: Send> Operator<TrackerInput<F>> for ObjectTrackerOperator<F> {
    fn on_data(
        &mut self,
        stream: &str,
        msg: DataMessage<TrackerInput<F>>,
    ) -> Result<Option<DataMessage<TrackerInput<F>>>> {
        let _span = self.lifecycle.enter();
        self.lifecycle.ensure_running()?;
        let result = self.handle_data(stream, msg);
        self.lifecycle.check(result)
    }

    fn on_watermark(&mut self, stream: &str, timestamp: Timestamp) -> Result<()> {
        let _span = self.lifecycle.enter();
        self.lifecycle.ensure_running()?;
        let result = self.handle_watermark(stream, timestamp);
        self.lifecycle.check(result)
    }

    fn poll(&mut self) -> Result<bool> {
        let _span = self.lifecycle.enter();
        self.lifecycle.ensure_running()?;
        let result = self.handle_poll();
        self.lifecycle.check(result)
    }

    fn name(&self) -> &str {
        self.lifecycle.name()
    }
}

impl<F> std::fmt::Debug for ObjectTrackerOperator<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTrackerOperator")
            .field("name", &self.lifecycle.name())
            .field("tracker_kind", &self.config.tracker_kind)
            .field("state", &self.state)
            .field("pending", &self.coordinator.total_pending())
            .field("halted", &self.lifecycle.is_halted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{BoundingBox2D, Obstacle, TrackOutput, Tracker, TrackerKind};
    use std::num::NonZeroU64;
    use std::sync::{Arc, Mutex};

    /// Echoes the last reinitialization's detections, tagged with ids.
    #[derive(Default)]
    struct EchoTracker {
        memory: Vec<Obstacle>,
        reinitialized_at: Arc<Mutex<Vec<u64>>>,
    }

    impl Tracker<u64> for EchoTracker {
        fn reinitialize(&mut self, frame: &u64, detections: &DetectionBatch) {
            self.memory = detections
                .obstacles
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, o)| o.with_id(i as u64))
                .collect();
            self.reinitialized_at.lock().unwrap().push(*frame);
        }

        fn track(&mut self, _frame: &u64) -> TrackOutput {
            TrackOutput::ok(TrackedObstacleSet::new(self.memory.clone()))
        }
    }

    fn batch() -> DetectionBatch {
        let b = BoundingBox2D::new(0.0, 0.0, 1.0, 1.0);
        DetectionBatch::new(vec![Obstacle::new("car", 0.9, b), Obstacle::new("stop sign", 0.9, b)])
    }

    fn operator(period: u64) -> (ObjectTrackerOperator<u64>, Arc<Mutex<Vec<u64>>>) {
        let reinitialized_at = Arc::new(Mutex::new(Vec::new()));
        let shared = reinitialized_at.clone();
        let mut registry: TrackerRegistry<u64> = TrackerRegistry::new();
        registry.register(TrackerKind::Sort, move || {
            Ok(Box::new(EchoTracker {
                memory: Vec::new(),
                reinitialized_at: shared.clone(),
            }))
        });
        let config = TrackerConfig::new(TrackerKind::Sort)
            .with_name("tracker")
            .with_track_every_nth_detection(NonZeroU64::new(period).unwrap());
        (ObjectTrackerOperator::new(config, &registry).unwrap(), reinitialized_at)
    }

    fn feed(op: &mut ObjectTrackerOperator<u64>, t: u64, detections: bool) {
        op.on_data(CAMERA_STREAM, DataMessage::new(t, TrackerInput::Frame(t)))
            .unwrap();
        if detections {
            op.on_data(OBSTACLES_STREAM, DataMessage::new(t, TrackerInput::Obstacles(batch())))
                .unwrap();
        }
        op.on_watermark(CAMERA_STREAM, Timestamp::from(t)).unwrap();
        op.on_watermark(OBSTACLES_STREAM, Timestamp::from(t)).unwrap();
    }

    #[test]
    fn test_unregistered_kind_fails_construction() {
        let registry: TrackerRegistry<u64> = TrackerRegistry::new();
        let err = ObjectTrackerOperator::new(TrackerConfig::new(TrackerKind::DeepSort), &registry)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedTrackerKind(kind) if kind == "deep_sort"));
    }

    #[test]
    fn test_emits_tracked_obstacles_then_watermark() {
        let (mut op, _) = operator(1);
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        op.subscribe(move |event| {
            sink.lock().unwrap().push(event);
            Ok(())
        });

        feed(&mut op, 1, true);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        match &events[0] {
            StreamEvent::Data(msg) => {
                assert_eq!(msg.timestamp(), &Timestamp::from(1));
                // Only the vehicle survives category filtering.
                assert_eq!(msg.payload().len(), 1);
                assert_eq!(msg.payload().obstacles[0].id, Some(0));
            }
            other => panic!("Expected data first, got {:?}", other),
        }
        assert_eq!(events[1], StreamEvent::watermark(1));
    }

    #[test]
    fn test_join_waits_for_obstacles_watermark() {
        let (mut op, _) = operator(1);

        op.on_data(CAMERA_STREAM, DataMessage::new(1, TrackerInput::Frame(1)))
            .unwrap();
        op.on_watermark(CAMERA_STREAM, Timestamp::from(1)).unwrap();
        assert!(op.last_report().is_none());

        op.on_watermark(OBSTACLES_STREAM, Timestamp::from(1)).unwrap();
        let report = op.last_report().unwrap();
        assert_eq!(report.timestamp, Timestamp::from(1));
        assert!(!report.reinitialized);
    }

    #[test]
    fn test_reinitializes_on_cadence() {
        let (mut op, reinitialized_at) = operator(3);
        for t in 1..=6 {
            feed(&mut op, t, true);
        }
        assert_eq!(*reinitialized_at.lock().unwrap(), vec![3, 6]);
        assert_eq!(op.state().ticks(), 6);
    }

    #[test]
    fn test_time_to_decision_is_logged_only() {
        let (mut op, _) = operator(1);
        op.on_data(
            TIME_TO_DECISION_STREAM,
            DataMessage::new(5, TrackerInput::TimeToDecision(120)),
        )
        .unwrap();
        op.on_watermark(TIME_TO_DECISION_STREAM, Timestamp::from(5)).unwrap();

        assert_eq!(op.last_time_to_decision(), Some(120));
        assert_eq!(op.coordinator().total_pending(), 0);
        assert!(op.last_report().is_none());
    }

    #[test]
    fn test_payload_mismatch_halts() {
        let (mut op, _) = operator(1);
        op.on_data(CAMERA_STREAM, DataMessage::new(1, TrackerInput::Obstacles(batch())))
            .unwrap();
        op.on_watermark(OBSTACLES_STREAM, Timestamp::from(1)).unwrap();

        let err = op.on_watermark(CAMERA_STREAM, Timestamp::from(1)).unwrap_err();
        assert!(matches!(err, Error::PayloadMismatch { expected: "frame", .. }));
        assert!(op.is_halted());
        assert!(matches!(op.poll(), Err(Error::Halted(_))));
    }

    #[test]
    fn test_out_of_order_camera_halts() {
        let (mut op, _) = operator(1);
        op.on_data(CAMERA_STREAM, DataMessage::new(5, TrackerInput::Frame(5)))
            .unwrap();
        let err = op
            .on_data(CAMERA_STREAM, DataMessage::new(3, TrackerInput::Frame(3)))
            .unwrap_err();

        assert!(matches!(err, Error::OutOfOrder { .. }));
        assert!(matches!(
            op.on_watermark(CAMERA_STREAM, Timestamp::from(5)),
            Err(Error::Halted(_))
        ));
    }

    #[test]
    fn test_downstream_failure_halts() {
        let (mut op, _) = operator(1);
        let delivered = Arc::new(Mutex::new(Vec::new()));
        let sink = delivered.clone();
        op.subscribe(move |event| {
            if event == StreamEvent::watermark(2) {
                return Err(Error::Io(std::io::Error::other("subscriber gone")));
            }
            sink.lock().unwrap().push(event);
            Ok(())
        });

        feed(&mut op, 1, true);
        op.on_data(CAMERA_STREAM, DataMessage::new(2, TrackerInput::Frame(2)))
            .unwrap();
        op.on_watermark(CAMERA_STREAM, Timestamp::from(2)).unwrap();

        let err = op.on_watermark(OBSTACLES_STREAM, Timestamp::from(2)).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
        assert!(op.is_halted());
        assert_eq!(op.last_report().unwrap().timestamp, Timestamp::from(2));
        assert_eq!(delivered.lock().unwrap().len(), 3);
        assert!(matches!(
            op.on_data(CAMERA_STREAM, DataMessage::new(3, TrackerInput::Frame(3))),
            Err(Error::Halted(_))
        ));
    }

    #[test]
    fn test_shutdown_discards_pending() {
        let (mut op, _) = operator(1);
        op.on_data(CAMERA_STREAM, DataMessage::new(1, TrackerInput::Frame(1)))
            .unwrap();
        assert_eq!(op.shutdown(), 1);
        assert!(op.is_halted());
    }
}
