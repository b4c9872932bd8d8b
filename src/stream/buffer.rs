//! Per-stream buffer of pending messages.
//!
//! A [`StreamBuffer`] holds the data messages of one input stream that have
//! not been consumed by a join yet, together with the highest watermark seen
//! on that stream. Capacity is explicit: when the buffer is full the
//! configured [`OverflowPolicy`] decides what happens to new input.
//!
//! Under [`OverflowPolicy::Block`] a handed-back message stays owed to the
//! buffer: newer messages are handed back too until the owed ones are
//! redelivered, and a watermark that covers an owed message is deferred
//! until that message has been accepted.

use super::StreamId;
use crate::error::{Error, Result};
use crate::temporal::{DataMessage, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of pending messages per stream.
pub const DEFAULT_CAPACITY: usize = 64;

/// What happens when a message arrives at a full buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Fail with [`Error::BufferOverflow`] (default).
    #[default]
    Reject,
    /// Evict the oldest pending message to make room.
    DropOldest,
    /// Hand the message back to the caller for redelivery later.
    Block,
}

/// Capacity and overflow behavior of a stream buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Maximum number of pending messages.
    pub capacity: usize,
    /// Policy applied when `capacity` is reached.
    pub overflow: OverflowPolicy,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

impl BufferConfig {
    /// Create a config with the given capacity and the default policy.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Default::default()
        }
    }

    /// Set the overflow policy.
    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    /// Check that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::InvalidConfig(
                "buffer capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result of pushing a message into a buffer.
#[derive(Debug, PartialEq)]
pub enum PushOutcome<T> {
    /// The message was enqueued.
    Accepted,
    /// The message was enqueued after evicting the returned one.
    DroppedOldest(DataMessage<T>),
    /// The buffer is full; the message was not enqueued.
    Blocked(DataMessage<T>),
}

/// Counters describing a buffer's history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Messages enqueued.
    pub pushed: u64,
    /// Messages removed by `pop_front`.
    pub popped: u64,
    /// Messages evicted or discarded without being consumed.
    pub dropped: u64,
    /// Messages handed back because the buffer was full.
    pub blocked: u64,
}

/// Messages handed back under `Block` and not yet redelivered.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Held {
    /// Oldest owed timestamp.
    first: Timestamp,
    /// Newest owed timestamp.
    last: Timestamp,
    count: usize,
}

/// FIFO of pending messages for one input stream.
#[derive(Debug)]
pub struct StreamBuffer<T> {
    stream: StreamId,
    pending: VecDeque<DataMessage<T>>,
    last_pushed: Option<Timestamp>,
    watermark: Option<Timestamp>,
    held: Option<Held>,
    deferred_watermark: Option<Timestamp>,
    config: BufferConfig,
    stats: BufferStats,
}

impl<T> StreamBuffer<T> {
    /// Create an empty buffer with the default configuration.
    pub fn new(stream: impl Into<StreamId>) -> Self {
        Self::with_config(stream, BufferConfig::default())
    }

    /// Create an empty buffer with an explicit configuration.
    pub fn with_config(stream: impl Into<StreamId>, config: BufferConfig) -> Self {
        Self {
            stream: stream.into(),
            pending: VecDeque::with_capacity(config.capacity.min(1024)),
            last_pushed: None,
            watermark: None,
            held: None,
            deferred_watermark: None,
            config,
            stats: BufferStats::default(),
        }
    }

    /// Append a message to the tail.
    ///
    /// The message must not be older than any message pushed before it, and
    /// must be newer than the stream's watermark. While handed-back messages
    /// are owed, anything newer than them is handed back as well.
    pub fn push(&mut self, msg: DataMessage<T>) -> Result<PushOutcome<T>> {
        if let Some(previous) = &self.last_pushed {
            if msg.timestamp() < previous {
                return Err(Error::OutOfOrder {
                    stream: self.stream.clone(),
                    timestamp: msg.timestamp().clone(),
                    previous: previous.clone(),
                });
            }
        }
        if let Some(watermark) = &self.watermark {
            if msg.timestamp() <= watermark {
                return Err(Error::LateMessage {
                    stream: self.stream.clone(),
                    timestamp: msg.timestamp().clone(),
                    watermark: watermark.clone(),
                });
            }
        }

        let redelivery = match &mut self.held {
            Some(held) if msg.timestamp() > &held.last => {
                held.last = msg.timestamp().clone();
                held.count += 1;
                self.stats.blocked += 1;
                return Ok(PushOutcome::Blocked(msg));
            }
            Some(_) => true,
            None => false,
        };

        let mut outcome = PushOutcome::Accepted;
        if self.pending.len() >= self.config.capacity {
            match self.config.overflow {
                OverflowPolicy::Reject => {
                    return Err(Error::BufferOverflow {
                        stream: self.stream.clone(),
                        capacity: self.config.capacity,
                    });
                }
                OverflowPolicy::Block => {
                    if !redelivery {
                        self.held = Some(Held {
                            first: msg.timestamp().clone(),
                            last: msg.timestamp().clone(),
                            count: 1,
                        });
                    }
                    self.stats.blocked += 1;
                    return Ok(PushOutcome::Blocked(msg));
                }
                OverflowPolicy::DropOldest => {
                    if let Some(evicted) = self.pending.pop_front() {
                        self.stats.dropped += 1;
                        outcome = PushOutcome::DroppedOldest(evicted);
                    }
                }
            }
        }

        if redelivery {
            self.settle(msg.timestamp());
        }
        self.last_pushed = Some(msg.timestamp().clone());
        self.pending.push_back(msg);
        self.stats.pushed += 1;
        Ok(outcome)
    }

    /// Account for an owed message that was just accepted.
    fn settle(&mut self, timestamp: &Timestamp) {
        let Some(held) = &mut self.held else {
            return;
        };
        held.count = held.count.saturating_sub(1);
        if held.count > 0 && timestamp < &held.last {
            held.first = timestamp.clone();
            return;
        }
        self.held = None;
        if let Some(deferred) = self.deferred_watermark.take() {
            self.watermark = Some(deferred);
        }
    }

    /// Record a watermark. Watermarks never move backwards.
    ///
    /// A watermark at or past an owed message is deferred until the message
    /// is redelivered; ticks before the owed message are closed by it
    /// immediately.
    pub fn observe_watermark(&mut self, timestamp: Timestamp) -> Result<()> {
        if let Some(previous) = self.deferred_watermark.as_ref().or(self.watermark.as_ref()) {
            if &timestamp < previous {
                return Err(Error::WatermarkRegression {
                    stream: self.stream.clone(),
                    watermark: timestamp,
                    previous: previous.clone(),
                });
            }
        }
        match &self.held {
            Some(held) if timestamp >= held.first => self.deferred_watermark = Some(timestamp),
            _ => self.watermark = Some(timestamp),
        }
        Ok(())
    }

    /// Remove and return the oldest pending message.
    pub fn pop_front(&mut self) -> Result<DataMessage<T>> {
        let msg = self.pending.pop_front().ok_or_else(|| Error::EmptyBuffer {
            stream: self.stream.clone(),
        })?;
        self.stats.popped += 1;
        Ok(msg)
    }

    /// Remove the oldest pending message without counting it as consumed.
    pub(crate) fn discard_front(&mut self) -> Option<DataMessage<T>> {
        let msg = self.pending.pop_front()?;
        self.stats.dropped += 1;
        Some(msg)
    }

    /// Peek at the oldest pending message.
    pub fn front(&self) -> Option<&DataMessage<T>> {
        self.pending.front()
    }

    /// Whether the stream is complete up to `timestamp`.
    ///
    /// A deferred watermark only counts for ticks before the oldest owed
    /// message.
    pub fn is_watermarked(&self, timestamp: &Timestamp) -> bool {
        if self.watermark.as_ref().is_some_and(|wm| wm >= timestamp) {
            return true;
        }
        match (&self.held, &self.deferred_watermark) {
            (Some(held), Some(deferred)) => deferred >= timestamp && timestamp < &held.first,
            _ => false,
        }
    }

    /// Highest watermark applied so far.
    pub fn watermark(&self) -> Option<&Timestamp> {
        self.watermark.as_ref()
    }

    /// Watermark waiting for handed-back messages to be redelivered.
    pub fn deferred_watermark(&self) -> Option<&Timestamp> {
        self.deferred_watermark.as_ref()
    }

    /// Number of handed-back messages not yet redelivered.
    pub fn owed(&self) -> usize {
        self.held.as_ref().map_or(0, |held| held.count)
    }

    /// The stream this buffer belongs to.
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Number of pending messages.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no message is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// The buffer's configuration.
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Counters for this buffer.
    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    /// Discard all pending messages and forget the watermark.
    ///
    /// Returns the number of messages discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.pending.len();
        self.pending.clear();
        self.stats.dropped += discarded as u64;
        self.last_pushed = None;
        self.watermark = None;
        self.held = None;
        self.deferred_watermark = None;
        discarded
    }
}
