//! Operator configuration.
//!
//! One immutable struct per operator, fixed at construction. Every struct
//! derives serde with `#[serde(default)]`, so a JSON document only needs the
//! fields that differ from the defaults. Sampling periods are `NonZeroU64`:
//! a period of zero fails to parse.
//!
//! ```rust
//! use tracksync::config::TrackerConfig;
//! use tracksync::tracking::TrackerKind;
//!
//! let config = TrackerConfig::from_json_str(
//!     r#"{ "name": "tracker", "tracker_kind": "deep_sort", "track_every_nth_detection": 3 }"#,
//! )
//! .unwrap();
//!
//! assert_eq!(config.tracker_kind, TrackerKind::DeepSort);
//! assert_eq!(config.track_every_nth_detection.get(), 3);
//! ```

use crate::error::{Error, Result};
use crate::stream::BufferConfig;
use crate::tracking::{DEFAULT_CATEGORIES, DEFAULT_FAILURE_HISTORY, ObstacleCategory, TrackerKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU64;
use std::path::{Path, PathBuf};

fn parse_json<C: DeserializeOwned>(json: &str, validate: fn(&C) -> Result<()>) -> Result<C> {
    let config: C = serde_json::from_str(json)?;
    validate(&config)?;
    Ok(config)
}

fn read_json<C: DeserializeOwned>(
    path: &Path,
    validate: fn(&C) -> Result<()>,
) -> Result<C> {
    let json = std::fs::read_to_string(path)?;
    parse_json(&json, validate)
}

fn require_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidConfig("operator name must not be empty".to_string()));
    }
    Ok(())
}

fn require_data_path(name: &str, data_path: &Path) -> Result<()> {
    if data_path.as_os_str().is_empty() {
        return Err(Error::InvalidConfig(format!(
            "{name}: data_path must not be empty"
        )));
    }
    Ok(())
}

// ============================================================================
// Tracker
// ============================================================================

/// Configuration of the object tracker operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Operator name, used in logs and metrics.
    pub name: String,
    /// Reinitialize the tracker on every Nth tick that carries detections.
    pub track_every_nth_detection: NonZeroU64,
    /// Tracking algorithm to construct.
    pub tracker_kind: TrackerKind,
    /// Obstacle categories kept when reinitializing.
    pub categories: Vec<ObstacleCategory>,
    /// Number of recent tracker failures kept for inspection.
    pub failure_history: usize,
    /// Buffer of the camera stream.
    pub camera_buffer: BufferConfig,
    /// Buffer of the obstacles stream.
    pub obstacles_buffer: BufferConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            name: "object_tracker".to_string(),
            track_every_nth_detection: NonZeroU64::MIN,
            tracker_kind: TrackerKind::Sort,
            categories: DEFAULT_CATEGORIES.to_vec(),
            failure_history: DEFAULT_FAILURE_HISTORY,
            camera_buffer: BufferConfig::default(),
            obstacles_buffer: BufferConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Default configuration for the given tracker kind.
    pub fn new(tracker_kind: TrackerKind) -> Self {
        Self {
            tracker_kind,
            ..Default::default()
        }
    }

    /// Set the operator name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the reinitialization period.
    pub fn with_track_every_nth_detection(mut self, period: NonZeroU64) -> Self {
        self.track_every_nth_detection = period;
        self
    }

    /// Set the categories kept when reinitializing.
    pub fn with_categories(mut self, categories: impl Into<Vec<ObstacleCategory>>) -> Self {
        self.categories = categories.into();
        self
    }

    /// Set how many recent tracker failures are kept.
    pub fn with_failure_history(mut self, limit: usize) -> Self {
        self.failure_history = limit;
        self
    }

    /// Set the buffer configuration of both input streams.
    pub fn with_buffers(mut self, buffer: BufferConfig) -> Self {
        self.camera_buffer = buffer;
        self.obstacles_buffer = buffer;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name)?;
        if self.categories.is_empty() {
            return Err(Error::InvalidConfig(format!(
                "{}: at least one obstacle category is required",
                self.name
            )));
        }
        self.camera_buffer.validate()?;
        self.obstacles_buffer.validate()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, Self::validate)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref(), Self::validate)
    }
}

// ============================================================================
// Loggers
// ============================================================================

/// What a logger does when its sink fails to persist a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistFailurePolicy {
    /// Return the error; the operator halts.
    #[default]
    Fatal,
    /// Log the error, count it, and keep going.
    SkipAndLog,
}

/// Configuration of the trajectory and IMU logger operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Operator name, used in logs and metrics.
    pub name: String,
    /// Persist every Nth received message.
    pub log_every_nth_message: NonZeroU64,
    /// Directory records are written to.
    pub data_path: PathBuf,
    /// Behavior on persistence failure.
    pub on_persist_failure: PersistFailurePolicy,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            name: "logger".to_string(),
            log_every_nth_message: NonZeroU64::MIN,
            data_path: PathBuf::from("data"),
            on_persist_failure: PersistFailurePolicy::default(),
        }
    }
}

impl LoggerConfig {
    /// Default configuration writing into `data_path`.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Default::default()
        }
    }

    /// Set the operator name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the sampling period.
    pub fn with_log_every_nth_message(mut self, period: NonZeroU64) -> Self {
        self.log_every_nth_message = period;
        self
    }

    /// Set the persistence failure policy.
    pub fn with_on_persist_failure(mut self, policy: PersistFailurePolicy) -> Self {
        self.on_persist_failure = policy;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name)?;
        require_data_path(&self.name, &self.data_path)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, Self::validate)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref(), Self::validate)
    }
}

// ============================================================================
// Detector
// ============================================================================

/// Configuration of the sampled detector operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Operator name, used in logs and metrics.
    pub name: String,
    /// Run the detector on every Nth tick; `None` runs it on every tick.
    pub log_every_nth_message: Option<NonZeroU64>,
    /// Directory detector output is saved to.
    pub data_path: PathBuf,
    /// Display detections.
    pub visualize_detections: bool,
    /// Save detections under `data_path`.
    pub log_detector_output: bool,
    /// Buffer of every input stream.
    pub buffer: BufferConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            name: "detector".to_string(),
            log_every_nth_message: None,
            data_path: PathBuf::from("data"),
            visualize_detections: false,
            log_detector_output: false,
            buffer: BufferConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Set the operator name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Run the detector only on every Nth tick.
    pub fn with_log_every_nth_message(mut self, period: NonZeroU64) -> Self {
        self.log_every_nth_message = Some(period);
        self
    }

    /// Set the output directory.
    pub fn with_data_path(mut self, data_path: impl Into<PathBuf>) -> Self {
        self.data_path = data_path.into();
        self
    }

    /// Enable or disable visualization.
    pub fn with_visualize_detections(mut self, enabled: bool) -> Self {
        self.visualize_detections = enabled;
        self
    }

    /// Enable or disable saving detector output.
    pub fn with_log_detector_output(mut self, enabled: bool) -> Self {
        self.log_detector_output = enabled;
        self
    }

    /// Set the buffer configuration of every input stream.
    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    /// Whether detections are handed to a renderer.
    pub fn renders(&self) -> bool {
        self.visualize_detections || self.log_detector_output
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        require_name(&self.name)?;
        if self.log_detector_output {
            require_data_path(&self.name, &self.data_path)?;
        }
        self.buffer.validate()
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        parse_json(json, Self::validate)
    }

    /// Read, parse and validate a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref(), Self::validate)
    }
}
