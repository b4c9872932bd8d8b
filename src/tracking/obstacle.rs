//! Obstacle data model.

use crate::temporal::Timestamp;
use serde::{Deserialize, Serialize};

/// Broad class of an obstacle, derived from its label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObstacleCategory {
    /// Cars, trucks, buses, motorcycles, bicycles.
    Vehicle,
    /// People and pedestrians.
    Person,
    /// Anything else (traffic signs, lights, animals, ...).
    Other,
}

const VEHICLE_LABELS: &[&str] = &["car", "truck", "bus", "motorcycle", "bicycle", "vehicle"];
const PERSON_LABELS: &[&str] = &["person", "pedestrian"];

impl ObstacleCategory {
    /// Categorize a detector label.
    pub fn from_label(label: &str) -> Self {
        if VEHICLE_LABELS.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            ObstacleCategory::Vehicle
        } else if PERSON_LABELS.iter().any(|l| l.eq_ignore_ascii_case(label)) {
            ObstacleCategory::Person
        } else {
            ObstacleCategory::Other
        }
    }
}

/// Axis-aligned 2D bounding box in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox2D {
    /// Left edge.
    pub x_min: f32,
    /// Top edge.
    pub y_min: f32,
    /// Right edge.
    pub x_max: f32,
    /// Bottom edge.
    pub y_max: f32,
}

impl BoundingBox2D {
    /// Create a bounding box from its corners.
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Width of the box (zero if degenerate).
    pub fn width(&self) -> f32 {
        (self.x_max - self.x_min).max(0.0)
    }

    /// Height of the box (zero if degenerate).
    pub fn height(&self) -> f32 {
        (self.y_max - self.y_min).max(0.0)
    }

    /// Area of the box.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// A single-frame obstacle: geometry plus class label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Obstacle {
    /// Identity assigned by a tracker; `None` for raw detections.
    pub id: Option<u64>,
    /// Detector class label.
    pub label: String,
    /// Detector confidence in `[0, 1]`.
    pub confidence: f32,
    /// Image-space bounding box.
    pub bbox: BoundingBox2D,
}

impl Obstacle {
    /// Create an untracked obstacle.
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox2D) -> Self {
        Self {
            id: None,
            label: label.into(),
            confidence,
            bbox,
        }
    }

    /// Attach a tracker identity.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    /// Category of this obstacle's label.
    pub fn category(&self) -> ObstacleCategory {
        ObstacleCategory::from_label(&self.label)
    }

    /// Whether the obstacle is a vehicle.
    pub fn is_vehicle(&self) -> bool {
        self.category() == ObstacleCategory::Vehicle
    }

    /// Whether the obstacle is a person.
    pub fn is_person(&self) -> bool {
        self.category() == ObstacleCategory::Person
    }
}

/// Obstacles reported by a detector for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionBatch {
    /// Detected obstacles.
    pub obstacles: Vec<Obstacle>,
}

impl DetectionBatch {
    /// Wrap a list of detections.
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }

    /// Keep only obstacles whose category is in `categories`.
    pub fn retain_categories(mut self, categories: &[ObstacleCategory]) -> Self {
        self.obstacles
            .retain(|o| categories.contains(&o.category()));
        self
    }

    /// Number of detections.
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    /// Whether the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}

/// Tracked obstacles for the current tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackedObstacleSet {
    /// Obstacles with tracker identities.
    pub obstacles: Vec<Obstacle>,
}

impl TrackedObstacleSet {
    /// Wrap a list of tracked obstacles.
    pub fn new(obstacles: Vec<Obstacle>) -> Self {
        Self { obstacles }
    }

    /// An empty set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of tracked obstacles.
    pub fn len(&self) -> usize {
        self.obstacles.len()
    }

    /// Whether no obstacle is tracked.
    pub fn is_empty(&self) -> bool {
        self.obstacles.is_empty()
    }
}

/// One recorded state of a trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    /// Tick the state was observed at.
    pub timestamp: Timestamp,
    /// Bounding box at that tick.
    pub bbox: BoundingBox2D,
}

/// The history of one obstacle across prior ticks.
///
/// Append-only: owned and extended by the tracker, read by loggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObstacleTrajectory {
    id: u64,
    label: String,
    points: Vec<TrajectoryPoint>,
}

impl ObstacleTrajectory {
    /// Start an empty trajectory.
    pub fn new(id: u64, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            points: Vec::new(),
        }
    }

    /// Append the obstacle's state at `timestamp`.
    pub fn push(&mut self, timestamp: Timestamp, bbox: BoundingBox2D) {
        self.points.push(TrajectoryPoint { timestamp, bbox });
    }

    /// Tracker identity.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Class label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recorded states, oldest first.
    pub fn points(&self) -> &[TrajectoryPoint] {
        &self.points
    }
}
