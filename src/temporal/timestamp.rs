//! Logical timestamps and a tick clock.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;

/// A logical timestamp made of one or more integer coordinates.
///
/// Timestamps are totally ordered by lexicographic comparison of their
/// coordinates, which supports hierarchical time (e.g. `[epoch, step]`).
/// Most operators use single-coordinate timestamps, one coordinate per tick.
///
/// # Examples
///
/// ```rust
/// use tracksync::temporal::Timestamp;
///
/// let t1 = Timestamp::from(1);
/// let t2 = Timestamp::new([1, 5]).unwrap();
///
/// assert!(t1 < t2);
/// assert_eq!(format!("{}", t2), "[1, 5]");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u64>", into = "Vec<u64>")]
pub struct Timestamp {
    coordinates: SmallVec<[u64; 2]>,
}

impl Timestamp {
    /// Create a timestamp from its coordinates.
    ///
    /// Fails with [`Error::InvalidTimestamp`] if no coordinate is given.
    pub fn new(coordinates: impl IntoIterator<Item = u64>) -> Result<Self> {
        let coordinates: SmallVec<[u64; 2]> = coordinates.into_iter().collect();
        if coordinates.is_empty() {
            return Err(Error::InvalidTimestamp(
                "a timestamp needs at least one coordinate".to_string(),
            ));
        }
        Ok(Self { coordinates })
    }

    /// Create a single-coordinate timestamp.
    pub fn from_coordinate(coordinate: u64) -> Self {
        let mut coordinates = SmallVec::new();
        coordinates.push(coordinate);
        Self { coordinates }
    }

    /// Get the coordinates.
    pub fn coordinates(&self) -> &[u64] {
        &self.coordinates
    }

    /// Get the coordinate of a single-coordinate timestamp.
    ///
    /// Returns `None` for hierarchical timestamps.
    pub fn single(&self) -> Option<u64> {
        match self.coordinates.as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    /// Like [`single`](Self::single), but failing with a typed error.
    ///
    /// Used wherever a key or file name is derived from the tick.
    pub fn expect_single(&self) -> Result<u64> {
        self.single().ok_or_else(|| {
            Error::InvalidTimestamp(format!("expected one coordinate, got {}", self))
        })
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.coordinates.as_slice().cmp(other.coordinates.as_slice())
    }
}

impl From<u64> for Timestamp {
    fn from(coordinate: u64) -> Self {
        Self::from_coordinate(coordinate)
    }
}

impl TryFrom<Vec<u64>> for Timestamp {
    type Error = Error;

    fn try_from(coordinates: Vec<u64>) -> Result<Self> {
        Self::new(coordinates)
    }
}

impl From<Timestamp> for Vec<u64> {
    fn from(ts: Timestamp) -> Self {
        ts.coordinates.into_vec()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, c) in self.coordinates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", c)?;
        }
        write!(f, "]")
    }
}

/// Source of successive single-coordinate ticks.
///
/// Producers use this to stamp the messages of one tick with the same
/// timestamp and to advance to the next tick afterwards.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    current: u64,
}

impl LogicalClock {
    /// Create a clock whose first tick is `[1]`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock whose first tick is `[origin + 1]`.
    pub fn starting_after(origin: u64) -> Self {
        Self { current: origin }
    }

    /// Advance and return the new tick.
    pub fn tick(&mut self) -> Timestamp {
        self.current += 1;
        Timestamp::from_coordinate(self.current)
    }

    /// The last tick handed out, if any.
    pub fn now(&self) -> Option<Timestamp> {
        (self.current > 0).then(|| Timestamp::from_coordinate(self.current))
    }
}
