//! Temporal types for watermark-synchronized stream processing.
//!
//! This module provides the vocabulary every stream speaks:
//!
//! - [`Timestamp`]: Multi-coordinate logical time, lexicographically ordered
//! - [`LogicalClock`]: Hands out successive ticks to producers
//! - [`DataMessage`]: Immutable timestamped payload
//! - [`Watermark`]: Completeness signal for a stream
//! - [`StreamEvent`]: Either of the two, in stream order
//!
//! # Watermarks
//!
//! A stream carries data messages in non-decreasing timestamp order, and a
//! watermark at `t` after all of its data for `t`. Downstream operators use
//! the watermarks of all their inputs to decide when a tick is complete.

mod message;
mod timestamp;

pub use message::{DataMessage, StreamEvent, Watermark};
pub use timestamp::{LogicalClock, Timestamp};
