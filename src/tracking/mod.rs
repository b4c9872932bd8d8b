//! Obstacle tracking around a pluggable tracker.
//!
//! - [`Obstacle`], [`DetectionBatch`], [`TrackedObstacleSet`],
//!   [`ObstacleTrajectory`]: the obstacle data model
//! - [`Tracker`]: capability implemented by external tracking algorithms
//! - [`TrackerKind`] / [`TrackerRegistry`]: kind-keyed tracker construction
//! - [`TrackingStateMachine`]: alternates reinitialization and tracking on
//!   a fixed cadence

mod obstacle;
mod state;
mod tracker;

pub use obstacle::{
    BoundingBox2D, DetectionBatch, Obstacle, ObstacleCategory, ObstacleTrajectory,
    TrackedObstacleSet, TrajectoryPoint,
};
pub use state::{
    DEFAULT_CATEGORIES, DEFAULT_FAILURE_HISTORY, TickReport, TrackerFailure, TrackerState,
    TrackingStateMachine,
};
pub use tracker::{TrackOutput, Tracker, TrackerKind, TrackerRegistry};
