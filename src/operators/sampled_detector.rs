//! Detector operator that runs only on sampled ticks.
//!
//! Joins N required input streams by watermark. Every joined tick counts
//! towards a [`SamplingGate`]; on ticks the gate skips, an empty detection
//! list is emitted so downstream watermarks keep flowing without running the
//! expensive [`Detector`].

use super::{Lifecycle, Operator};
use crate::config::DetectorConfig;
use crate::error::{Error, Result};
use crate::observability::{OperatorMetrics, span_tick};
use crate::sampling::SamplingGate;
use crate::stream::{
    Emitter, JoinedTick, Progress, Stream, StreamId, StreamOptions, WatermarkCoordinator,
};
use crate::temporal::{DataMessage, StreamEvent, Timestamp};
use std::path::Path;

/// Produces detections from the inputs joined for one tick.
pub trait Detector<T>: Send {
    /// One detected object.
    type Detection: Clone + Send + 'static;

    /// Run detection over a joined tick.
    fn detect(&mut self, tick: &JoinedTick<T>) -> Result<Vec<Self::Detection>>;

    /// Get the name of this detector (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Displays or saves a tick's detections.
pub trait DetectionRenderer<T, D>: Send {
    /// Show the detections, e.g. drawn over the tick's frame.
    fn visualize(&mut self, tick: &JoinedTick<T>, detections: &[D]) -> Result<()>;

    /// Save the detections under `data_path`.
    fn save(&mut self, tick: &JoinedTick<T>, detections: &[D], data_path: &Path) -> Result<()>;
}

type BoxedRenderer<T, D> = Box<dyn DetectionRenderer<T, D>>;

/// Joins N streams and runs a [`Detector`] on every Nth tick.
pub struct SampledDetectorOperator<T, D: Detector<T>> {
    config: DetectorConfig,
    coordinator: WatermarkCoordinator<T>,
    detector: D,
    renderer: Option<BoxedRenderer<T, D::Detection>>,
    gate: SamplingGate,
    emitter: Emitter<Vec<D::Detection>>,
    metrics: OperatorMetrics,
    lifecycle: Lifecycle,
    detections_run: u64,
    detector_failures: u64,
    render_failures: u64,
}

impl<T, D: Detector<T>> SampledDetectorOperator<T, D> {
    /// Build the operator over the given required streams.
    ///
    /// A renderer is required when the configuration visualizes or saves
    /// detections.
    pub fn new<I, S>(
        config: DetectorConfig,
        streams: I,
        detector: D,
        renderer: Option<Box<dyn DetectionRenderer<T, D::Detection>>>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<StreamId>,
    {
        config.validate()?;
        if config.renders() && renderer.is_none() {
            return Err(Error::InvalidConfig(format!(
                "{}: rendering enabled but no renderer given",
                config.name
            )));
        }

        let mut coordinator = WatermarkCoordinator::new(config.name.clone());
        for stream in streams {
            coordinator
                .register_stream_with(stream, StreamOptions::required().with_buffer(config.buffer))?;
        }
        if coordinator.stream_count() == 0 {
            return Err(Error::InvalidConfig(format!(
                "{}: at least one input stream is required",
                config.name
            )));
        }

        tracing::info!(
            operator = %config.name,
            detector = detector.name(),
            streams = coordinator.stream_count(),
            every_nth = config.log_every_nth_message.map(|n| n.get()),
            "detector ready"
        );

        Ok(Self {
            metrics: OperatorMetrics::new(&config.name),
            lifecycle: Lifecycle::new(config.name.clone()),
            emitter: Emitter::new(Stream::new(format!("{}/detections", config.name))),
            coordinator,
            detector,
            renderer,
            gate: SamplingGate::new(),
            detections_run: 0,
            detector_failures: 0,
            render_failures: 0,
            config,
        })
    }

    /// Subscribe to the detections output.
    pub fn subscribe<H>(&mut self, handler: H)
    where
        H: FnMut(StreamEvent<Vec<D::Detection>>) -> Result<()> + Send + 'static,
    {
        self.emitter.stream_mut().subscribe(handler);
    }

    /// The operator's configuration.
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// The detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Ticks joined so far.
    pub fn ticks(&self) -> u64 {
        self.gate.calls()
    }

    /// Ticks on which the detector ran.
    pub fn detections_run(&self) -> u64 {
        self.detections_run
    }

    /// Sampled ticks on which the detector failed recoverably.
    pub fn detector_failures(&self) -> u64 {
        self.detector_failures
    }

    /// Sampled ticks whose detections could not be visualized or saved.
    pub fn render_failures(&self) -> u64 {
        self.render_failures
    }

    /// Whether a fatal error halted the operator.
    pub fn is_halted(&self) -> bool {
        self.lifecycle.is_halted()
    }

    /// Discard all buffered input and refuse further calls.
    pub fn shutdown(&mut self) -> usize {
        let discarded = self.coordinator.shutdown();
        self.lifecycle.stop();
        discarded
    }

    fn sampled(&mut self) -> bool {
        match self.config.log_every_nth_message {
            Some(period) => self.gate.should_act(period),
            None => {
                self.gate.should_act(std::num::NonZeroU64::MIN);
                true
            }
        }
    }

    /// Run one joined tick to completion.
    ///
    /// The tick's inputs are already drained, so the tick is always closed
    /// on the output: a recoverable detector error yields an empty
    /// detection list, and a failure to emit halts the operator.
    fn process(&mut self, tick: JoinedTick<T>) -> Result<()> {
        let timestamp = tick.timestamp().clone();
        let _span = span_tick(self.lifecycle.name(), &timestamp).entered();
        self.metrics.record_join();

        let detections = if self.sampled() {
            self.run_detector(&tick)?
        } else {
            tracing::trace!(operator = %self.lifecycle.name(), timestamp = %timestamp, "skipping detection");
            Vec::new()
        };

        let emitted = self.emitter.emit_one(&timestamp, detections);
        if let Err(err) = &emitted {
            self.lifecycle.halt(err);
        }
        emitted
    }

    fn run_detector(&mut self, tick: &JoinedTick<T>) -> Result<Vec<D::Detection>> {
        let timestamp = tick.timestamp();
        let _timer = self.metrics.start_timer();
        let detections = match self.detector.detect(tick) {
            Ok(detections) => detections,
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => {
                self.detector_failures += 1;
                self.metrics.record_detector_failure();
                tracing::error!(
                    operator = %self.lifecycle.name(),
                    timestamp = %timestamp,
                    error = %err,
                    "detector failed, emitting no detections"
                );
                return Ok(Vec::new());
            }
        };
        self.detections_run += 1;
        tracing::debug!(
            operator = %self.lifecycle.name(),
            timestamp = %timestamp,
            detections = detections.len(),
            "ran detector"
        );

        if let Some(renderer) = self.renderer.as_mut() {
            let mut rendered = Ok(());
            if self.config.visualize_detections {
                rendered = renderer.visualize(tick, &detections);
            }
            if rendered.is_ok() && self.config.log_detector_output {
                rendered = renderer.save(tick, &detections, &self.config.data_path);
            }
            match rendered {
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => {
                    self.render_failures += 1;
                    self.metrics.record_render_failure();
                    tracing::error!(
                        operator = %self.lifecycle.name(),
                        timestamp = %timestamp,
                        error = %err,
                        "failed to render detections"
                    );
                }
                Ok(()) => {}
            }
        }
        Ok(detections)
    }

    fn handle_data(&mut self, stream: &str, msg: DataMessage<T>) -> Result<Option<DataMessage<T>>> {
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

impl<T: Send, D: Detector<T>> Operator<T> for SampledDetectorOperator<T, D> {
    fn on_data(&mut self, stream: &str, msg: DataMessage<T>) -> Result<Option<DataMessage<T>>> {
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

impl<T, D: Detector<T>> std::fmt::Debug for SampledDetectorOperator<T, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampledDetectorOperator")
            .field("name", &self.lifecycle.name())
            .field("detector", &self.detector.name())
            .field("ticks", &self.gate.calls())
            .field("detections_run", &self.detections_run)
            .field("halted", &self.lifecycle.is_halted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU64;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Sensor {
        Camera(u64),
        Depth(u64),
    }

    /// Reports one detection per camera frame: the frame number.
    #[derive(Default)]
    struct FrameDetector {
        calls: Vec<u64>,
        fail_on: Option<u64>,
    }

    impl Detector<Sensor> for FrameDetector {
        type Detection = u64;

        fn detect(&mut self, tick: &JoinedTick<Sensor>) -> Result<Vec<u64>> {
            let t = tick.timestamp().expect_single()?;
            self.calls.push(t);
            if self.fail_on == Some(t) {
                return Err(Error::Io(std::io::Error::other("model read failed")));
            }
            match tick.get("camera").map(|m| m.payload()) {
                Some(Sensor::Camera(frame)) => Ok(vec![*frame]),
                _ => Err(Error::PayloadMismatch {
                    stream: StreamId::from("camera"),
                    expected: "camera",
                }),
            }
        }
    }

    #[derive(Default)]
    struct Rendered {
        visualized: Vec<u64>,
        saved: Vec<u64>,
    }

    struct RecordingRenderer {
        rendered: Arc<Mutex<Rendered>>,
        fail_save: bool,
    }

    impl DetectionRenderer<Sensor, u64> for RecordingRenderer {
        fn visualize(&mut self, tick: &JoinedTick<Sensor>, _detections: &[u64]) -> Result<()> {
            let t = tick.timestamp().expect_single()?;
            self.rendered.lock().unwrap().visualized.push(t);
            Ok(())
        }

        fn save(&mut self, tick: &JoinedTick<Sensor>, _detections: &[u64], _data_path: &Path) -> Result<()> {
            if self.fail_save {
                return Err(Error::Io(std::io::Error::other("disk full")));
            }
            let t = tick.timestamp().expect_single()?;
            self.rendered.lock().unwrap().saved.push(t);
            Ok(())
        }
    }

    type Events = Arc<Mutex<Vec<StreamEvent<Vec<u64>>>>>;

    fn operator(
        config: DetectorConfig,
        renderer: Option<BoxedRenderer<Sensor, u64>>,
    ) -> (SampledDetectorOperator<Sensor, FrameDetector>, Events) {
        operator_with(config, FrameDetector::default(), renderer)
    }

    fn operator_with(
        config: DetectorConfig,
        detector: FrameDetector,
        renderer: Option<BoxedRenderer<Sensor, u64>>,
    ) -> (SampledDetectorOperator<Sensor, FrameDetector>, Events) {
        let mut op =
            SampledDetectorOperator::new(config, ["camera", "depth"], detector, renderer).unwrap();
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        op.subscribe(move |event| {
            sink.lock().unwrap().push(event);
            Ok(())
        });
        (op, events)
    }

    fn feed(op: &mut SampledDetectorOperator<Sensor, FrameDetector>, t: u64) {
        op.on_data("camera", DataMessage::new(t, Sensor::Camera(t))).unwrap();
        op.on_data("depth", DataMessage::new(t, Sensor::Depth(t))).unwrap();
        op.on_watermark("camera", Timestamp::from(t)).unwrap();
        op.on_watermark("depth", Timestamp::from(t)).unwrap();
    }

    fn payloads(events: &Events) -> Vec<Vec<u64>> {
        events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Data(msg) => Some(msg.payload().clone()),
                StreamEvent::Watermark(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_runs_detector_on_every_fourth_tick() {
        let config = DetectorConfig::default().with_log_every_nth_message(NonZeroU64::new(4).unwrap());
        let (mut op, events) = operator(config, None);

        for t in 1..=10 {
            feed(&mut op, t);
        }

        assert_eq!(op.detector().calls, vec![4, 8]);
        assert_eq!(op.ticks(), 10);
        let payloads = payloads(&events);
        assert_eq!(payloads.len(), 10);
        assert_eq!(payloads[3], vec![4]);
        assert_eq!(payloads[7], vec![8]);
        assert!(payloads[0].is_empty() && payloads[9].is_empty());
        // Every tick is closed by its watermark.
        assert_eq!(events.lock().unwrap().len(), 20);
    }

    #[test]
    fn test_without_period_runs_every_tick() {
        let (mut op, events) = operator(DetectorConfig::default(), None);
        for t in 1..=3 {
            feed(&mut op, t);
        }
        assert_eq!(op.detections_run(), 3);
        assert_eq!(payloads(&events), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_renderer_on_sampled_ticks_only() {
        let rendered = Arc::new(Mutex::new(Rendered::default()));
        let renderer = RecordingRenderer {
            rendered: rendered.clone(),
            fail_save: false,
        };
        let config = DetectorConfig::default()
            .with_log_every_nth_message(NonZeroU64::new(2).unwrap())
            .with_visualize_detections(true)
            .with_log_detector_output(true);
        let (mut op, _) = operator(config, Some(Box::new(renderer)));

        for t in 1..=4 {
            feed(&mut op, t);
        }

        let rendered = rendered.lock().unwrap();
        assert_eq!(rendered.visualized, vec![2, 4]);
        assert_eq!(rendered.saved, vec![2, 4]);
    }

    #[test]
    fn test_render_failure_still_emits() {
        let renderer = RecordingRenderer {
            rendered: Arc::new(Mutex::new(Rendered::default())),
            fail_save: true,
        };
        let config = DetectorConfig::default().with_log_detector_output(true);
        let (mut op, events) = operator(config, Some(Box::new(renderer)));

        feed(&mut op, 1);

        assert!(!op.is_halted());
        assert_eq!(payloads(&events), vec![vec![1]]);
        assert_eq!(op.render_failures(), 1);
        assert_eq!(op.detector_failures(), 0);
    }

    fn describe(events: &Events) -> Vec<String> {
        events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                StreamEvent::Data(msg) => format!("D{}={:?}", msg.timestamp(), msg.payload()),
                StreamEvent::Watermark(wm) => format!("W{}", wm.timestamp()),
            })
            .collect()
    }

    #[test]
    fn test_detector_error_still_closes_tick() {
        let detector = FrameDetector {
            fail_on: Some(2),
            ..Default::default()
        };
        let (mut op, events) = operator_with(DetectorConfig::default(), detector, None);

        for t in 1..=3 {
            feed(&mut op, t);
        }

        assert!(!op.is_halted());
        assert_eq!(op.detections_run(), 2);
        assert_eq!(op.detector_failures(), 1);
        assert_eq!(op.render_failures(), 0);
        assert_eq!(
            describe(&events),
            vec!["D[1]=[1]", "W[1]", "D[2]=[]", "W[2]", "D[3]=[3]", "W[3]"]
        );
    }

    #[test]
    fn test_emit_failure_halts() {
        let mut op = SampledDetectorOperator::<Sensor, _>::new(
            DetectorConfig::default(),
            ["camera"],
            FrameDetector::default(),
            None,
        )
        .unwrap();
        op.subscribe(|event| match event {
            StreamEvent::Data(msg) if msg.timestamp() == &Timestamp::from(2) => {
                Err(Error::Io(std::io::Error::other("downstream closed")))
            }
            _ => Ok(()),
        });

        op.on_data("camera", DataMessage::new(1, Sensor::Camera(1))).unwrap();
        op.on_watermark("camera", Timestamp::from(1)).unwrap();
        op.on_data("camera", DataMessage::new(2, Sensor::Camera(2))).unwrap();

        assert!(matches!(
            op.on_watermark("camera", Timestamp::from(2)),
            Err(Error::Io(_))
        ));
        assert!(op.is_halted());
        assert!(matches!(
            op.on_data("camera", DataMessage::new(3, Sensor::Camera(3))),
            Err(Error::Halted(_))
        ));
    }

    #[test]
    fn test_rendering_requires_renderer() {
        let config = DetectorConfig::default().with_visualize_detections(true);
        let result =
            SampledDetectorOperator::<Sensor, _>::new(config, ["camera"], FrameDetector::default(), None);
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_requires_a_stream() {
        let result = SampledDetectorOperator::<Sensor, _>::new(
            DetectorConfig::default(),
            Vec::<&str>::new(),
            FrameDetector::default(),
            None,
        );
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_required_message_is_desync() {
        let (mut op, _) = operator(DetectorConfig::default(), None);
        op.on_data("camera", DataMessage::new(1, Sensor::Camera(1))).unwrap();
        op.on_watermark("camera", Timestamp::from(1)).unwrap();
        op.on_data("depth", DataMessage::new(2, Sensor::Depth(2))).unwrap();

        let err = op.on_watermark("depth", Timestamp::from(2)).unwrap_err();
        assert!(matches!(err, Error::Desync { .. }));
        assert!(op.is_halted());
    }
}
