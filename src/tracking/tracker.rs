//! Tracker capability and kind-keyed construction.

use super::obstacle::{DetectionBatch, TrackedObstacleSet};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Result of one `track` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackOutput {
    /// Whether the tracker considers this result valid.
    pub ok: bool,
    /// Obstacles tracked in the frame (may be empty, also on failure).
    pub obstacles: TrackedObstacleSet,
}

impl TrackOutput {
    /// A successful result.
    pub fn ok(obstacles: TrackedObstacleSet) -> Self {
        Self {
            ok: true,
            obstacles,
        }
    }

    /// A failed result carrying whatever the tracker still produced.
    pub fn failed(obstacles: TrackedObstacleSet) -> Self {
        Self {
            ok: false,
            obstacles,
        }
    }
}

/// A multi-object tracking algorithm over frames of type `F`.
///
/// Implementations keep cross-tick identity in their own memory. `track`
/// must tolerate being called before any `reinitialize`, returning an
/// empty set or a failure.
pub trait Tracker<F>: Send {
    /// Discard internal memory and restart from fresh detections.
    fn reinitialize(&mut self, frame: &F, detections: &DetectionBatch);

    /// Advance tracking to `frame`.
    fn track(&mut self, frame: &F) -> TrackOutput;

    /// Get the name of this tracker (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// The interchangeable tracking algorithms an operator can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    /// Siamese region-proposal single-object trackers, one per obstacle.
    DaSiamRpn,
    /// SORT with a deep appearance descriptor.
    DeepSort,
    /// Simple online realtime tracking (Kalman filter + IoU matching).
    Sort,
}

impl TrackerKind {
    /// All supported kinds.
    pub const ALL: [TrackerKind; 3] = [TrackerKind::DaSiamRpn, TrackerKind::DeepSort, TrackerKind::Sort];

    /// Configuration name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackerKind::DaSiamRpn => "da_siam_rpn",
            TrackerKind::DeepSort => "deep_sort",
            TrackerKind::Sort => "sort",
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TrackerKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| Error::UnsupportedTrackerKind(s.to_string()))
    }
}

type TrackerConstructor<F> = Box<dyn Fn() -> Result<Box<dyn Tracker<F>>> + Send + Sync>;

/// Factory of trackers keyed by [`TrackerKind`].
///
/// The algorithms themselves live outside this crate; the host registers a
/// constructor for each kind it links in. Creating a kind with no
/// registered constructor fails with [`Error::UnsupportedTrackerKind`].
///
/// # Example
///
/// ```rust
/// use tracksync::tracking::{
///     DetectionBatch, TrackOutput, TrackedObstacleSet, Tracker, TrackerKind, TrackerRegistry,
/// };
///
/// struct NullTracker;
///
/// impl Tracker<()> for NullTracker {
///     fn reinitialize(&mut self, _frame: &(), _detections: &DetectionBatch) {}
///     fn track(&mut self, _frame: &()) -> TrackOutput {
///         TrackOutput::ok(TrackedObstacleSet::empty())
///     }
/// }
///
/// let mut registry: TrackerRegistry<()> = TrackerRegistry::new();
/// registry.register(TrackerKind::Sort, || Ok(Box::new(NullTracker)));
///
/// assert!(registry.create(TrackerKind::Sort).is_ok());
/// assert!(registry.create(TrackerKind::DeepSort).is_err());
/// ```
pub struct TrackerRegistry<F> {
    constructors: HashMap<TrackerKind, TrackerConstructor<F>>,
}

impl<F> TrackerRegistry<F> {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// Register (or replace) the constructor for `kind`.
    pub fn register<C>(&mut self, kind: TrackerKind, constructor: C) -> &mut Self
    where
        C: Fn() -> Result<Box<dyn Tracker<F>>> + Send + Sync + 'static,
    {
        self.constructors.insert(kind, Box::new(constructor));
        self
    }

    /// Whether a constructor is registered for `kind`.
    pub fn supports(&self, kind: TrackerKind) -> bool {
        self.constructors.contains_key(&kind)
    }

    /// Construct a tracker of the given kind.
    pub fn create(&self, kind: TrackerKind) -> Result<Box<dyn Tracker<F>>> {
        let constructor = self
            .constructors
            .get(&kind)
            .ok_or_else(|| Error::UnsupportedTrackerKind(kind.to_string()))?;
        let tracker = constructor()?;
        tracing::debug!(kind = %kind, tracker = tracker.name(), "created tracker");
        Ok(tracker)
    }

    /// Construct a tracker from its configuration name.
    pub fn create_named(&self, name: &str) -> Result<Box<dyn Tracker<F>>> {
        self.create(name.parse()?)
    }
}

impl<F> Default for TrackerRegistry<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F> fmt::Debug for TrackerRegistry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<&str> = self.constructors.keys().map(TrackerKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("TrackerRegistry").field("kinds", &kinds).finish()
    }
}
