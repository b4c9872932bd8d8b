//! Persistence of per-tick trace records.
//!
//! Loggers hand a [`TraceRecord`] and a key to a [`PersistenceSink`]. Once
//! handed off, the record is owned by the sink. Two sinks ship with the
//! crate:
//!
//! - [`JsonFileSink`]: one JSON file per key under a data directory
//! - [`MemorySink`]: keeps records in memory, for tests and embedding

use crate::error::{Error, Result};
use crate::operators::ImuMeasurement;
use crate::temporal::Timestamp;
use crate::tracking::ObstacleTrajectory;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// An IMU reading as persisted, stamped with its tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuRecord {
    /// The measurement.
    #[serde(flatten)]
    pub measurement: ImuMeasurement,
    /// Single-coordinate tick of the reading.
    pub timestamp: u64,
}

/// Serialized form of one tick's trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TraceRecord {
    /// Obstacle trajectories known at the tick.
    Trajectories(Vec<ObstacleTrajectory>),
    /// An IMU reading.
    Imu(ImuRecord),
}

/// Build the record key `<prefix>-<coordinate>.json` for a tick.
///
/// Keys are derived from the tick's single coordinate; multi-coordinate
/// timestamps are rejected with [`Error::InvalidTimestamp`].
pub fn trace_key(prefix: &str, timestamp: &Timestamp) -> Result<String> {
    let coordinate = timestamp.expect_single()?;
    Ok(format!("{prefix}-{coordinate}.json"))
}

/// Destination for trace records.
pub trait PersistenceSink: Send {
    /// Write `record` under `key`, replacing any previous record.
    fn write(&mut self, key: &str, record: &TraceRecord) -> Result<()>;
}

// ============================================================================
// JSON files
// ============================================================================

/// Writes each record as a JSON file named by its key.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    data_path: PathBuf,
}

impl JsonFileSink {
    /// Write into an existing directory.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
        }
    }

    /// Create `data_path` (and parents) if needed, then write into it.
    pub fn create(data_path: impl Into<PathBuf>) -> Result<Self> {
        let data_path = data_path.into();
        fs::create_dir_all(&data_path)?;
        Ok(Self { data_path })
    }

    /// Directory records are written to.
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Full path of the file for `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.data_path.join(key)
    }
}

impl PersistenceSink for JsonFileSink {
    fn write(&mut self, key: &str, record: &TraceRecord) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        let path = self.path_for(key);
        fs::write(&path, bytes).map_err(|source| Error::Persistence {
            key: key.to_string(),
            source,
        })?;
        tracing::trace!(path = %path.display(), "wrote trace record");
        Ok(())
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Keeps written records in memory, in write order.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Vec<(String, TraceRecord)>,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written so far.
    pub fn records(&self) -> &[(String, TraceRecord)] {
        &self.records
    }

    /// Keys written so far.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|(key, _)| key.as_str())
    }

    /// The most recent record written under `key`.
    pub fn get(&self, key: &str) -> Option<&TraceRecord> {
        self.records
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, record)| record)
    }

    /// Number of writes.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was written.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PersistenceSink for MemorySink {
    fn write(&mut self, key: &str, record: &TraceRecord) -> Result<()> {
        self.records.push((key.to_string(), record.clone()));
        Ok(())
    }
}
