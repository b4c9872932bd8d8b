//! Streams, input buffering and the watermark join.
//!
//! - [`StreamBuffer`]: Pending messages and watermark of one input stream
//! - [`WatermarkCoordinator`]: Aligns N input streams and fires one join per tick
//! - [`Stream`]: Output stream capability with explicit `subscribe`
//! - [`Emitter`]: Sends a tick's data followed by its watermark
//!
//! # Design
//!
//! Everything here is synchronous and non-blocking. A host scheduler delivers
//! input events one at a time; when a tick is not complete yet the
//! coordinator simply returns and waits to be invoked again. Backpressure is
//! the explicit capacity of each input buffer.

mod buffer;
mod coordinator;
mod emitter;
mod handle;

pub use buffer::{
    BufferConfig, BufferStats, DEFAULT_CAPACITY, OverflowPolicy, PushOutcome, StreamBuffer,
};
pub use coordinator::{JoinedTick, Progress, StreamOptions, StreamRole, WatermarkCoordinator};
pub use emitter::Emitter;
pub use handle::{Stream, StreamHandler};

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

/// Name of a stream.
///
/// Cheap to clone; compared by content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(Arc<str>);

impl StreamId {
    /// Create a stream id.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// The stream name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StreamId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StreamId {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<&StreamId> for StreamId {
    fn from(id: &StreamId) -> Self {
        id.clone()
    }
}

impl Borrow<str> for StreamId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for StreamId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for StreamId {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for StreamId {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}
