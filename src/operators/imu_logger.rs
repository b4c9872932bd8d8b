//! Persists IMU readings.

use super::Operator;
use super::recorder::Recorder;
use crate::config::LoggerConfig;
use crate::error::Result;
use crate::persist::{ImuRecord, JsonFileSink, PersistenceSink, TraceRecord};
use crate::temporal::{DataMessage, Timestamp};
use serde::{Deserialize, Serialize};

/// Input stream of the IMU logger.
pub const IMU_STREAM: &str = "imu";

/// A 3-component vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

impl Vector3 {
    /// Create a vector.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rotation {
    /// Rotation around the lateral axis.
    pub pitch: f64,
    /// Rotation around the vertical axis.
    pub yaw: f64,
    /// Rotation around the longitudinal axis.
    pub roll: f64,
}

/// Pose of the sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Position.
    pub location: Vector3,
    /// Orientation.
    pub rotation: Rotation,
}

impl Transform {
    /// Create a transform.
    pub fn new(location: Vector3, rotation: Rotation) -> Self {
        Self { location, rotation }
    }
}

/// One IMU reading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImuMeasurement {
    /// Sensor pose.
    pub transform: Transform,
    /// Linear acceleration (m/s^2).
    pub acceleration: Vector3,
    /// Angular velocity (rad/s).
    pub gyro: Vector3,
    /// Heading relative to north (rad).
    pub compass: f64,
}

/// Writes every Nth IMU reading as `imu-<t>.json`.
///
/// With a period of 1 every reading is kept, which preserves the sampling
/// needed to approximate jerk offline.
#[derive(Debug)]
pub struct ImuLoggerOperator<S = JsonFileSink> {
    recorder: Recorder<S>,
}

impl ImuLoggerOperator<JsonFileSink> {
    /// Create a logger writing JSON files under `config.data_path`.
    pub fn from_config(config: LoggerConfig) -> Result<Self> {
        let sink = JsonFileSink::create(&config.data_path)?;
        Self::new(config, sink)
    }
}

impl<S: PersistenceSink> ImuLoggerOperator<S> {
    /// Create a logger writing to `sink`.
    pub fn new(config: LoggerConfig, sink: S) -> Result<Self> {
        Ok(Self {
            recorder: Recorder::new(config, IMU_STREAM, "imu", sink)?,
        })
    }

    /// The logger's configuration.
    pub fn config(&self) -> &LoggerConfig {
        self.recorder.config()
    }

    /// The sink records are written to.
    pub fn sink(&self) -> &S {
        self.recorder.sink()
    }

    /// Records successfully written.
    pub fn written(&self) -> u64 {
        self.recorder.written()
    }

    /// Whether a fatal error halted the logger.
    pub fn is_halted(&self) -> bool {
        self.recorder.is_halted()
    }
}

impl<S: PersistenceSink> Operator<ImuMeasurement> for ImuLoggerOperator<S> {
    fn on_data(
        &mut self,
        stream: &str,
        msg: DataMessage<ImuMeasurement>,
    ) -> Result<Option<DataMessage<ImuMeasurement>>> {
        let (timestamp, measurement) = msg.into_parts();
        self.recorder.record(stream, &timestamp, |coordinate| {
            TraceRecord::Imu(ImuRecord {
                measurement,
                timestamp: coordinate,
            })
        })?;
        Ok(None)
    }

    fn on_watermark(&mut self, stream: &str, timestamp: Timestamp) -> Result<()> {
        self.recorder.observe_watermark(stream, &timestamp)
    }

    fn name(&self) -> &str {
        self.recorder.name()
    }
}
