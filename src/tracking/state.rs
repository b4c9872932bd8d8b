//! Reinitialize-or-continue tracking state machine.

use super::obstacle::{DetectionBatch, ObstacleCategory, TrackedObstacleSet};
use super::tracker::Tracker;
use crate::observability::OperatorMetrics;
use crate::temporal::Timestamp;
use std::collections::VecDeque;
use std::num::NonZeroU64;

/// Categories kept from a detection batch before reinitialization.
pub const DEFAULT_CATEGORIES: [ObstacleCategory; 2] =
    [ObstacleCategory::Vehicle, ObstacleCategory::Person];

/// Number of most recent tracker failures kept for inspection.
pub const DEFAULT_FAILURE_HISTORY: usize = 16;

/// Whether the tracker holds memory yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    /// No reinitialization has happened.
    Idle,
    /// The tracker was reinitialized at least once.
    Tracking,
}

/// A tick on which `track` reported failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerFailure {
    /// One-based tick counter value.
    pub tick: u64,
    /// Logical time of the tick.
    pub timestamp: Timestamp,
}

/// What the state machine did for one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// The tick processed.
    pub timestamp: Timestamp,
    /// Tracker output for the tick (possibly empty).
    pub obstacles: TrackedObstacleSet,
    /// Whether the tracker was reinitialized on this tick.
    pub reinitialized: bool,
    /// Whether `track` succeeded.
    pub tracker_ok: bool,
}

/// Drives a [`Tracker`] across joined ticks.
///
/// Every tick increments a counter. When the tick carries detections and
/// the counter is a multiple of the reinitialization period, the detections
/// are filtered to the categories of interest and the tracker is
/// reinitialized from them. The tracker then tracks the frame, regardless.
/// A failed `track` is recorded and its (possibly empty) output is still
/// returned; tracker memory is left as is. Only the most recent failures
/// are kept, the total is counted.
pub struct TrackingStateMachine<F> {
    tracker: Box<dyn Tracker<F>>,
    state: TrackerState,
    tick_counter: u64,
    reinit_period: NonZeroU64,
    categories: Vec<ObstacleCategory>,
    reinitializations: u64,
    failures: VecDeque<TrackerFailure>,
    failure_history: usize,
    failure_count: u64,
    metrics: OperatorMetrics,
}

impl<F> TrackingStateMachine<F> {
    /// Create a state machine around `tracker`.
    pub fn new(tracker: Box<dyn Tracker<F>>, reinit_period: NonZeroU64) -> Self {
        Self {
            tracker,
            state: TrackerState::Idle,
            tick_counter: 0,
            reinit_period,
            categories: DEFAULT_CATEGORIES.to_vec(),
            reinitializations: 0,
            failures: VecDeque::new(),
            failure_history: DEFAULT_FAILURE_HISTORY,
            failure_count: 0,
            metrics: OperatorMetrics::new("tracking"),
        }
    }

    /// Set the categories kept before reinitialization.
    pub fn with_categories(mut self, categories: impl Into<Vec<ObstacleCategory>>) -> Self {
        self.categories = categories.into();
        self
    }

    /// Keep at most `limit` recent failures.
    pub fn with_failure_history(mut self, limit: usize) -> Self {
        self.failure_history = limit;
        self.failures.truncate(limit);
        self
    }

    /// Label metrics with the owning operator's name.
    pub fn with_metrics(mut self, metrics: OperatorMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Process one joined tick.
    pub fn on_tick(
        &mut self,
        timestamp: &Timestamp,
        frame: &F,
        detections: Option<DetectionBatch>,
    ) -> TickReport {
        self.tick_counter += 1;

        let mut reinitialized = false;
        if let Some(batch) = detections {
            if self.tick_counter % self.reinit_period.get() == 0 {
                let batch = batch.retain_categories(&self.categories);
                tracing::debug!(
                    timestamp = %timestamp,
                    tracker = self.tracker.name(),
                    detections = batch.len(),
                    "restarting tracker"
                );
                self.tracker.reinitialize(frame, &batch);
                self.state = TrackerState::Tracking;
                self.reinitializations += 1;
                self.metrics.record_reinitialization();
                reinitialized = true;
            }
        }

        let output = self.tracker.track(frame);
        if !output.ok {
            tracing::error!(
                timestamp = %timestamp,
                tracker = self.tracker.name(),
                "tracker failed"
            );
            self.metrics.record_tracker_failure();
            self.failure_count += 1;
            if self.failure_history > 0 {
                if self.failures.len() == self.failure_history {
                    self.failures.pop_front();
                }
                self.failures.push_back(TrackerFailure {
                    tick: self.tick_counter,
                    timestamp: timestamp.clone(),
                });
            }
        }

        TickReport {
            timestamp: timestamp.clone(),
            obstacles: output.obstacles,
            reinitialized,
            tracker_ok: output.ok,
        }
    }

    /// Current state.
    pub fn state(&self) -> TrackerState {
        self.state
    }

    /// Number of ticks processed.
    pub fn ticks(&self) -> u64 {
        self.tick_counter
    }

    /// Number of reinitializations performed.
    pub fn reinitializations(&self) -> u64 {
        self.reinitializations
    }

    /// The most recent ticks on which the tracker failed, oldest first.
    pub fn failures(&self) -> &VecDeque<TrackerFailure> {
        &self.failures
    }

    /// The latest tracker failure, if any is retained.
    pub fn last_failure(&self) -> Option<&TrackerFailure> {
        self.failures.back()
    }

    /// Total number of tracker failures, including those no longer retained.
    pub fn failure_count(&self) -> u64 {
        self.failure_count
    }

    /// The configured reinitialization period.
    pub fn reinit_period(&self) -> NonZeroU64 {
        self.reinit_period
    }
}

impl<F> std::fmt::Debug for TrackingStateMachine<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingStateMachine")
            .field("tracker", &self.tracker.name())
            .field("state", &self.state)
            .field("tick_counter", &self.tick_counter)
            .field("reinit_period", &self.reinit_period)
            .field("failures", &self.failure_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{BoundingBox2D, Obstacle, TrackOutput};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Default)]
    struct Calls {
        reinitialized_with: Vec<(u32, Vec<String>)>,
        tracked: Vec<u32>,
    }

    /// Records calls; fails `track` on the listed frames.
    struct ScriptedTracker {
        calls: Arc<Mutex<Calls>>,
        fail_on: Vec<u32>,
    }

    impl Tracker<u32> for ScriptedTracker {
        fn reinitialize(&mut self, frame: &u32, detections: &DetectionBatch) {
            let labels = detections.obstacles.iter().map(|o| o.label.clone()).collect();
            self.calls
                .lock()
                .unwrap()
                .reinitialized_with
                .push((*frame, labels));
        }

        fn track(&mut self, frame: &u32) -> TrackOutput {
            self.calls.lock().unwrap().tracked.push(*frame);
            let set = TrackedObstacleSet::new(vec![
                Obstacle::new("car", 1.0, BoundingBox2D::new(0.0, 0.0, 1.0, 1.0)).with_id(1),
            ]);
            if self.fail_on.contains(frame) {
                TrackOutput::failed(TrackedObstacleSet::empty())
            } else {
                TrackOutput::ok(set)
            }
        }
    }

    fn machine(period: u64, fail_on: Vec<u32>) -> (TrackingStateMachine<u32>, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let tracker = ScriptedTracker {
            calls: calls.clone(),
            fail_on,
        };
        let sm = TrackingStateMachine::new(Box::new(tracker), NonZeroU64::new(period).unwrap());
        (sm, calls)
    }

    fn batch() -> DetectionBatch {
        let b = BoundingBox2D::new(0.0, 0.0, 1.0, 1.0);
        DetectionBatch::new(vec![
            Obstacle::new("car", 0.9, b),
            Obstacle::new("traffic light", 0.9, b),
            Obstacle::new("person", 0.9, b),
        ])
    }

    #[test]
    fn test_reinitialize_every_third_tick() {
        let (mut sm, calls) = machine(3, vec![]);
        for t in 1..=6u32 {
            sm.on_tick(&Timestamp::from(t as u64), &t, Some(batch()));
        }

        let calls = calls.lock().unwrap();
        let frames: Vec<u32> = calls.reinitialized_with.iter().map(|(f, _)| *f).collect();
        assert_eq!(frames, vec![3, 6]);
        assert_eq!(calls.tracked, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(sm.reinitializations(), 2);
    }

    #[test]
    fn test_reinitialize_filters_categories() {
        let (mut sm, calls) = machine(1, vec![]);
        let report = sm.on_tick(&Timestamp::from(1), &1, Some(batch()));

        assert!(report.reinitialized);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.reinitialized_with[0].1, vec!["car", "person"]);
    }

    #[test]
    fn test_counter_advances_without_detections() {
        let (mut sm, calls) = machine(2, vec![]);

        // Tick 2 has no detections, so the period boundary passes unused.
        sm.on_tick(&Timestamp::from(1), &1, Some(batch()));
        sm.on_tick(&Timestamp::from(2), &2, None);
        sm.on_tick(&Timestamp::from(3), &3, Some(batch()));
        sm.on_tick(&Timestamp::from(4), &4, Some(batch()));

        let frames: Vec<u32> = calls
            .lock()
            .unwrap()
            .reinitialized_with
            .iter()
            .map(|(f, _)| *f)
            .collect();
        assert_eq!(frames, vec![4]);
        assert_eq!(sm.ticks(), 4);
    }

    #[test]
    fn test_track_called_while_idle() {
        let (mut sm, calls) = machine(5, vec![]);
        let report = sm.on_tick(&Timestamp::from(1), &1, None);

        assert_eq!(sm.state(), TrackerState::Idle);
        assert!(!report.reinitialized);
        assert_eq!(calls.lock().unwrap().tracked, vec![1]);
    }

    #[test]
    fn test_failure_recorded_and_processing_continues() {
        let (mut sm, _calls) = machine(1, vec![2]);

        sm.on_tick(&Timestamp::from(1), &1, Some(batch()));
        let failed = sm.on_tick(&Timestamp::from(2), &2, None);
        let next = sm.on_tick(&Timestamp::from(3), &3, None);

        assert!(!failed.tracker_ok);
        assert!(failed.obstacles.is_empty());
        assert!(next.tracker_ok);
        assert_eq!(next.obstacles.len(), 1);
        assert_eq!(sm.state(), TrackerState::Tracking);
        assert_eq!(sm.failure_count(), 1);
        assert_eq!(
            sm.last_failure(),
            Some(&TrackerFailure {
                tick: 2,
                timestamp: Timestamp::from(2)
            })
        );
        // No reinitialization was triggered by the failure.
        assert_eq!(sm.reinitializations(), 1);
    }

    #[test]
    fn test_failure_history_is_bounded() {
        let (sm, _calls) = machine(1, (1..=10).collect());
        let mut sm = sm.with_failure_history(3);

        for t in 1..=10u32 {
            let report = sm.on_tick(&Timestamp::from(t as u64), &t, None);
            assert!(!report.tracker_ok);
        }

        assert_eq!(sm.failure_count(), 10);
        let ticks: Vec<u64> = sm.failures().iter().map(|f| f.tick).collect();
        assert_eq!(ticks, vec![8, 9, 10]);
        assert_eq!(sm.last_failure().map(|f| f.tick), Some(10));
    }

    #[test]
    fn test_zero_failure_history_only_counts() {
        let (sm, _calls) = machine(1, vec![1, 2]);
        let mut sm = sm.with_failure_history(0);

        sm.on_tick(&Timestamp::from(1), &1, None);
        sm.on_tick(&Timestamp::from(2), &2, None);

        assert!(sm.failures().is_empty());
        assert_eq!(sm.failure_count(), 2);
    }
}
