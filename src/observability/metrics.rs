//! Metrics collection using metrics-rs.

use metrics::{Counter, Histogram, Unit, counter, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Whether metrics have been initialized.
static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

// Metric names as constants for consistency
const JOINS_FIRED: &str = "tracksync_joins_fired";
const MESSAGES_BUFFERED: &str = "tracksync_messages_buffered";
const MESSAGES_DROPPED: &str = "tracksync_messages_dropped";
const MESSAGES_BLOCKED: &str = "tracksync_messages_blocked";
const BUFFER_DEPTH: &str = "tracksync_buffer_depth";
const TRACKER_FAILURES: &str = "tracksync_tracker_failures";
const TRACKER_REINITIALIZATIONS: &str = "tracksync_tracker_reinitializations";
const RECORDS_PERSISTED: &str = "tracksync_records_persisted";
const PERSIST_FAILURES: &str = "tracksync_persist_failures";
const DETECTOR_FAILURES: &str = "tracksync_detector_failures";
const RENDER_FAILURES: &str = "tracksync_render_failures";
const TICK_TIME_NS: &str = "tracksync_tick_time_ns";

/// Initialize metrics descriptions.
///
/// Call this once at application startup before using any metrics.
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    metrics::describe_counter!(
        JOINS_FIRED,
        Unit::Count,
        "Ticks joined across all required input streams"
    );
    metrics::describe_counter!(
        MESSAGES_BUFFERED,
        Unit::Count,
        "Data messages accepted into an input buffer"
    );
    metrics::describe_counter!(
        MESSAGES_DROPPED,
        Unit::Count,
        "Data messages evicted or discarded without being joined"
    );
    metrics::describe_counter!(
        MESSAGES_BLOCKED,
        Unit::Count,
        "Data messages handed back because an input buffer was full"
    );
    metrics::describe_gauge!(
        BUFFER_DEPTH,
        Unit::Count,
        "Messages pending in an input buffer"
    );
    metrics::describe_counter!(
        TRACKER_FAILURES,
        Unit::Count,
        "Ticks on which the tracker reported failure"
    );
    metrics::describe_counter!(
        TRACKER_REINITIALIZATIONS,
        Unit::Count,
        "Tracker reinitializations from fresh detections"
    );
    metrics::describe_counter!(
        RECORDS_PERSISTED,
        Unit::Count,
        "Trace records handed to the persistence sink"
    );
    metrics::describe_counter!(
        PERSIST_FAILURES,
        Unit::Count,
        "Trace records the persistence sink failed to write"
    );
    metrics::describe_counter!(
        DETECTOR_FAILURES,
        Unit::Count,
        "Sampled ticks on which the detector failed"
    );
    metrics::describe_counter!(
        RENDER_FAILURES,
        Unit::Count,
        "Detections that could not be visualized or saved"
    );
    metrics::describe_histogram!(
        TICK_TIME_NS,
        Unit::Nanoseconds,
        "Time to process one joined tick"
    );
}

/// Record a message accepted into an input buffer.
#[inline]
pub fn record_message_buffered(operator: &str, stream: &str) {
    counter!(MESSAGES_BUFFERED, "operator" => operator.to_string(), "stream" => stream.to_string())
        .increment(1);
}

/// Record a message dropped from an input buffer.
#[inline]
pub fn record_message_dropped(operator: &str, stream: &str) {
    counter!(MESSAGES_DROPPED, "operator" => operator.to_string(), "stream" => stream.to_string())
        .increment(1);
}

/// Record a message handed back by a full input buffer.
#[inline]
pub fn record_message_blocked(operator: &str, stream: &str) {
    counter!(MESSAGES_BLOCKED, "operator" => operator.to_string(), "stream" => stream.to_string())
        .increment(1);
}

/// Record the number of messages pending in an input buffer.
#[inline]
pub fn record_buffer_depth(operator: &str, stream: &str, depth: usize) {
    gauge!(BUFFER_DEPTH, "operator" => operator.to_string(), "stream" => stream.to_string())
        .set(depth as f64);
}

/// Metrics collector for a specific operator.
///
/// Provides a convenient way to record metrics with pre-configured labels.
#[derive(Clone)]
pub struct OperatorMetrics {
    operator: String,
    joins: Counter,
    tracker_failures: Counter,
    reinitializations: Counter,
    persisted: Counter,
    persist_failures: Counter,
    detector_failures: Counter,
    render_failures: Counter,
    tick_time: Histogram,
}

impl OperatorMetrics {
    /// Create a new operator metrics collector.
    pub fn new(operator: &str) -> Self {
        Self {
            operator: operator.to_string(),
            joins: counter!(JOINS_FIRED, "operator" => operator.to_string()),
            tracker_failures: counter!(TRACKER_FAILURES, "operator" => operator.to_string()),
            reinitializations: counter!(
                TRACKER_REINITIALIZATIONS,
                "operator" => operator.to_string()
            ),
            persisted: counter!(RECORDS_PERSISTED, "operator" => operator.to_string()),
            persist_failures: counter!(PERSIST_FAILURES, "operator" => operator.to_string()),
            detector_failures: counter!(DETECTOR_FAILURES, "operator" => operator.to_string()),
            render_failures: counter!(RENDER_FAILURES, "operator" => operator.to_string()),
            tick_time: histogram!(TICK_TIME_NS, "operator" => operator.to_string()),
        }
    }

    /// Record a fired join.
    #[inline]
    pub fn record_join(&self) {
        self.joins.increment(1);
    }

    /// Record a tracker failure.
    #[inline]
    pub fn record_tracker_failure(&self) {
        self.tracker_failures.increment(1);
    }

    /// Record a tracker reinitialization.
    #[inline]
    pub fn record_reinitialization(&self) {
        self.reinitializations.increment(1);
    }

    /// Record a trace record written.
    #[inline]
    pub fn record_persisted(&self) {
        self.persisted.increment(1);
    }

    /// Record a trace record that could not be written.
    #[inline]
    pub fn record_persist_failure(&self) {
        self.persist_failures.increment(1);
    }

    /// Record a detector failure.
    #[inline]
    pub fn record_detector_failure(&self) {
        self.detector_failures.increment(1);
    }

    /// Record detections that could not be rendered.
    #[inline]
    pub fn record_render_failure(&self) {
        self.render_failures.increment(1);
    }

    /// Record processing time for one tick.
    #[inline]
    pub fn record_tick_time(&self, duration: Duration) {
        self.tick_time.record(duration.as_nanos() as f64);
    }

    /// Start a timer and return a guard that records on drop.
    pub fn start_timer(&self) -> TimerGuard<'_> {
        TimerGuard {
            start: Instant::now(),
            metrics: self,
        }
    }

    /// Get the operator name.
    pub fn operator(&self) -> &str {
        &self.operator
    }
}

impl std::fmt::Debug for OperatorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorMetrics")
            .field("operator", &self.operator)
            .finish_non_exhaustive()
    }
}

/// Guard that records tick processing time when dropped.
pub struct TimerGuard<'a> {
    start: Instant,
    metrics: &'a OperatorMetrics,
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        self.metrics.record_tick_time(self.start.elapsed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_metrics() {
        // Should not panic
        init_metrics();
        // Should be idempotent
        init_metrics();
    }

    #[test]
    fn test_operator_metrics() {
        let metrics = OperatorMetrics::new("object-tracker");

        metrics.record_join();
        metrics.record_tracker_failure();
        metrics.record_reinitialization();
        metrics.record_persisted();
        metrics.record_persist_failure();
        metrics.record_detector_failure();
        metrics.record_render_failure();
        {
            let _timer = metrics.start_timer();
        }

        assert_eq!(metrics.operator(), "object-tracker");
    }

    #[test]
    fn test_global_recording_functions() {
        // These should not panic even without a recorder installed
        record_message_buffered("op", "camera");
        record_message_dropped("op", "obstacles");
        record_message_blocked("op", "camera");
        record_buffer_depth("op", "camera", 3);
    }
}
