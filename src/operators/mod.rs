//! Operators built from the coordination primitives.
//!
//! An operator is driven by an external scheduler through the [`Operator`]
//! trait: one call per data message or watermark, never concurrently for the
//! same operator. Each call runs to completion; a tick is either fully
//! processed inside one call or not started.
//!
//! - [`ObjectTrackerOperator`]: joins camera frames with detections and runs
//!   a [`TrackingStateMachine`](crate::tracking::TrackingStateMachine)
//! - [`TrajectoryLoggerOperator`]: persists every Nth set of trajectories
//! - [`ImuLoggerOperator`]: persists every Nth IMU reading
//! - [`SampledDetectorOperator`]: joins N streams and runs an expensive
//!   [`Detector`] only on sampled ticks
//!
//! After a fatal error an operator halts and every later call returns
//! [`Error::Halted`](crate::Error::Halted).

mod imu_logger;
mod object_tracker;
mod recorder;
mod sampled_detector;
mod trajectory_logger;

pub use imu_logger::{IMU_STREAM, ImuLoggerOperator, ImuMeasurement, Rotation, Transform, Vector3};
pub use object_tracker::{
    CAMERA_STREAM, OBSTACLES_STREAM, ObjectTrackerOperator, TIME_TO_DECISION_STREAM, TrackerInput,
};
pub use sampled_detector::{DetectionRenderer, Detector, SampledDetectorOperator};
pub use trajectory_logger::{TRAJECTORIES_STREAM, TrajectoryLoggerOperator};

use crate::error::{Error, Result};
use crate::observability::{span_operator, trace_fatal};
use crate::temporal::{DataMessage, StreamEvent, Timestamp};

// ============================================================================
// Operator Trait
// ============================================================================

/// A stream operator driven by an external scheduler.
///
/// # Lifecycle
///
/// - `on_data()` is called for every data message on an input stream
/// - `on_watermark()` is called for every watermark on an input stream
/// - `poll()` may be called to process ticks that became ready together
/// - Return `Err(...)` to signal an error; fatal errors halt the operator
///
/// `on_data` returns `Ok(Some(msg))` when the input's buffer is full and
/// configured to block: the scheduler keeps the message and redelivers it
/// before any newer data on that stream. Watermarks may keep flowing in the
/// meantime.
pub trait Operator<In>: Send {
    /// Deliver a data message on `stream`.
    fn on_data(&mut self, stream: &str, msg: DataMessage<In>) -> Result<Option<DataMessage<In>>>;

    /// Deliver a watermark on `stream`.
    fn on_watermark(&mut self, stream: &str, timestamp: Timestamp) -> Result<()>;

    /// Process at most one tick that is ready without new input.
    ///
    /// Returns whether a tick was processed.
    fn poll(&mut self) -> Result<bool> {
        Ok(false)
    }

    /// Get the name of this operator (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Dispatch one stream event to an operator.
///
/// Returns a data message handed back by a blocking buffer, as
/// [`Operator::on_data`] does.
pub fn deliver<In, O>(
    operator: &mut O,
    stream: &str,
    event: StreamEvent<In>,
) -> Result<Option<DataMessage<In>>>
where
    O: Operator<In> + ?Sized,
{
    match event {
        StreamEvent::Data(msg) => operator.on_data(stream, msg),
        StreamEvent::Watermark(wm) => {
            operator.on_watermark(stream, wm.into_timestamp())?;
            Ok(None)
        }
    }
}

// ============================================================================
// Halt Tracking
// ============================================================================

/// Running/halted state shared by all operators.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    name: String,
    halted: bool,
    span: tracing::Span,
}

impl Lifecycle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            span: span_operator(&name),
            name,
            halted: false,
        }
    }

    /// Enter the operator's span for the duration of one callback.
    pub(crate) fn enter(&self) -> tracing::span::EnteredSpan {
        self.span.clone().entered()
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.halted
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.halted {
            return Err(Error::Halted(self.name.clone()));
        }
        Ok(())
    }

    /// Halt on fatal errors, pass the result through.
    pub(crate) fn check<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            if err.is_fatal() {
                self.halt(err);
            }
        }
        result
    }

    /// Refuse further calls without reporting an error.
    pub(crate) fn stop(&mut self) {
        self.halted = true;
    }

    /// Halt regardless of the error kind.
    pub(crate) fn halt(&mut self, err: &Error) {
        if !self.halted {
            trace_fatal(&self.name, err);
            self.halted = true;
        }
    }
}
