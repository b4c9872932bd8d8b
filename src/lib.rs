//! # tracksync
//!
//! Watermark-synchronized multi-stream joins and a periodic-reinitialization
//! tracking coordinator.
//!
//! Operators consume several independently paced, timestamped input streams
//! (camera frames, detections, sensor readings), align them by logical time
//! before acting, and publish a derived output stream. Correctness rests on
//! two guarantees: a tick is joined exactly once, and ticks are joined in
//! strictly increasing order.
//!
//! ## Features
//!
//! - **Explicit buffering**: per-stream capacity with reject, drop-oldest or
//!   block overflow policies
//! - **Watermark join**: one join per tick, draining exactly one message from
//!   every required stream; optional streams contribute when present
//! - **Tracking state machine**: reinitialize a pluggable tracker from fresh
//!   detections every Nth tick, track on every tick
//! - **Sampling**: every-Nth gates for expensive side effects such as
//!   persistence and visualization
//! - **Ordered output**: data for a tick, then its watermark
//!
//! ## Quick Start
//!
//! ```rust
//! use tracksync::prelude::*;
//!
//! let mut join: WatermarkCoordinator<&str> = WatermarkCoordinator::new("fusion");
//! join.register_stream("camera", true)?;
//! join.register_stream("lidar", true)?;
//!
//! join.on_data("camera", DataMessage::new(1, "frame"))?;
//! join.on_data("lidar", DataMessage::new(1, "cloud"))?;
//! join.on_watermark("camera", Timestamp::from(1))?;
//! let tick = join.on_watermark("lidar", Timestamp::from(1))?.expect("tick 1 is complete");
//!
//! assert_eq!(tick.get("lidar").map(|m| *m.payload()), Some("cloud"));
//! # Ok::<(), tracksync::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod observability;
pub mod operators;
pub mod persist;
pub mod sampling;
pub mod stream;
pub mod temporal;
pub mod tracking;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{DetectorConfig, LoggerConfig, PersistFailurePolicy, TrackerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::operators::{Operator, deliver};
    pub use crate::persist::{PersistenceSink, TraceRecord};
    pub use crate::sampling::SamplingGate;
    pub use crate::stream::{
        BufferConfig, Emitter, JoinedTick, OverflowPolicy, Progress, Stream, StreamId,
        StreamOptions, WatermarkCoordinator,
    };
    pub use crate::temporal::{DataMessage, LogicalClock, StreamEvent, Timestamp, Watermark};
    pub use crate::tracking::{
        DetectionBatch, Obstacle, TrackOutput, TrackedObstacleSet, Tracker, TrackerKind,
        TrackerRegistry, TrackingStateMachine,
    };
}

pub use error::{Error, Result};
