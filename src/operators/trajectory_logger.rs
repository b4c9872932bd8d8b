//! Persists obstacle trajectories.

use super::Operator;
use super::recorder::Recorder;
use crate::config::LoggerConfig;
use crate::error::Result;
use crate::persist::{JsonFileSink, PersistenceSink, TraceRecord};
use crate::temporal::{DataMessage, Timestamp};
use crate::tracking::ObstacleTrajectory;

/// Input stream of the trajectory logger.
pub const TRAJECTORIES_STREAM: &str = "obstacle_trajectories";

/// Writes every Nth set of trajectories as `trajectories-<t>.json`.
#[derive(Debug)]
pub struct TrajectoryLoggerOperator<S = JsonFileSink> {
    recorder: Recorder<S>,
}

impl TrajectoryLoggerOperator<JsonFileSink> {
    /// Create a logger writing JSON files under `config.data_path`.
    pub fn from_config(config: LoggerConfig) -> Result<Self> {
        let sink = JsonFileSink::create(&config.data_path)?;
        Self::new(config, sink)
    }
}

impl<S: PersistenceSink> TrajectoryLoggerOperator<S> {
    /// Create a logger writing to `sink`.
    pub fn new(config: LoggerConfig, sink: S) -> Result<Self> {
        Ok(Self {
            recorder: Recorder::new(config, TRAJECTORIES_STREAM, "trajectories", sink)?,
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

    /// Messages received.
    pub fn received(&self) -> u64 {
        self.recorder.received()
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

impl<S: PersistenceSink> Operator<Vec<ObstacleTrajectory>> for TrajectoryLoggerOperator<S> {
    fn on_data(
        &mut self,
        stream: &str,
        msg: DataMessage<Vec<ObstacleTrajectory>>,
    ) -> Result<Option<DataMessage<Vec<ObstacleTrajectory>>>> {
        let (timestamp, trajectories) = msg.into_parts();
        self.recorder
            .record(stream, &timestamp, |_| TraceRecord::Trajectories(trajectories))?;
        Ok(None)
    }

    fn on_watermark(&mut self, stream: &str, timestamp: Timestamp) -> Result<()> {
        self.recorder.observe_watermark(stream, &timestamp)
    }

    fn name(&self) -> &str {
        self.recorder.name()
    }
}
