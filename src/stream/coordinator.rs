//! Watermark-driven join across several input streams.
//!
//! The coordinator owns one [`StreamBuffer`] per registered input. Each
//! input is either *required* (must deliver exactly one message for every
//! tick it is watermarked for) or *optional* (may deliver zero or one).
//!
//! A tick `t` is ready once every required stream is watermarked at `>= t`
//! and holds a message at exactly `t`. Optional streams registered with
//! `await_watermark` must additionally be watermarked at `>= t`, so that
//! their data for `t` is in the buffer before the join fires.
//!
//! Each call to [`on_data`](WatermarkCoordinator::on_data),
//! [`on_watermark`](WatermarkCoordinator::on_watermark) or
//! [`poll`](WatermarkCoordinator::poll) fires at most one join. Nothing
//! blocks: an incomplete tick simply waits for the next call.

use super::StreamId;
use super::buffer::{BufferConfig, PushOutcome, StreamBuffer};
use crate::error::{Error, Result};
use crate::observability::{
    record_buffer_depth, record_message_blocked, record_message_buffered, record_message_dropped,
    trace_data_received, trace_fatal, trace_watermark_received,
};
use crate::temporal::{DataMessage, Timestamp};

/// Whether a stream must contribute a message to every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamRole {
    /// Exactly one message per watermarked tick.
    Required,
    /// Zero or one message per tick.
    Optional,
}

/// Registration options for one input stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Required or optional participation.
    pub role: StreamRole,
    /// For optional streams: hold the join until this stream's watermark
    /// reaches the tick. Ignored for required streams, which always gate.
    pub await_watermark: bool,
    /// Capacity and overflow policy of the stream's buffer.
    pub buffer: BufferConfig,
}

impl StreamOptions {
    /// Options for a required stream.
    pub fn required() -> Self {
        Self {
            role: StreamRole::Required,
            await_watermark: true,
            buffer: BufferConfig::default(),
        }
    }

    /// Options for an optional stream that does not gate the join.
    pub fn optional() -> Self {
        Self {
            role: StreamRole::Optional,
            await_watermark: false,
            buffer: BufferConfig::default(),
        }
    }

    /// Make an optional stream gate the join on its watermark.
    pub fn with_await_watermark(mut self, await_watermark: bool) -> Self {
        self.await_watermark = await_watermark;
        self
    }

    /// Set the buffer configuration.
    pub fn with_buffer(mut self, buffer: BufferConfig) -> Self {
        self.buffer = buffer;
        self
    }

    fn gates(&self) -> bool {
        self.role == StreamRole::Required || self.await_watermark
    }
}

/// The messages drained for one tick.
///
/// Holds one entry per registered stream, in registration order. Required
/// streams always carry `Some`; optional streams carry `None` when they had
/// nothing for the tick.
#[derive(Debug)]
pub struct JoinedTick<T> {
    timestamp: Timestamp,
    inputs: Vec<(StreamId, Option<DataMessage<T>>)>,
}

impl<T> JoinedTick<T> {
    /// The tick that was joined.
    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// Borrow the message drained from `stream`, if any.
    pub fn get(&self, stream: impl AsRef<str>) -> Option<&DataMessage<T>> {
        let stream = stream.as_ref();
        self.inputs
            .iter()
            .find(|(id, _)| id.as_str() == stream)
            .and_then(|(_, msg)| msg.as_ref())
    }

    /// Take ownership of the message drained from `stream`, if any.
    ///
    /// A second `take` for the same stream returns `None`.
    pub fn take(&mut self, stream: impl AsRef<str>) -> Option<DataMessage<T>> {
        let stream = stream.as_ref();
        self.inputs
            .iter_mut()
            .find(|(id, _)| id.as_str() == stream)
            .and_then(|(_, msg)| msg.take())
    }

    /// Iterate over stream ids and their (remaining) messages.
    pub fn iter(&self) -> impl Iterator<Item = (&StreamId, Option<&DataMessage<T>>)> {
        self.inputs.iter().map(|(id, msg)| (id, msg.as_ref()))
    }

    /// Number of streams that contributed a message.
    pub fn present(&self) -> usize {
        self.inputs.iter().filter(|(_, msg)| msg.is_some()).count()
    }

    /// Consume the tick, returning its timestamp and per-stream messages.
    pub fn into_inputs(self) -> (Timestamp, Vec<(StreamId, Option<DataMessage<T>>)>) {
        (self.timestamp, self.inputs)
    }
}

/// What happened to a delivered data message.
#[derive(Debug)]
pub enum Progress<T> {
    /// Buffered; no tick became ready.
    Pending,
    /// Buffered, and a tick was joined.
    Joined(JoinedTick<T>),
    /// The stream's buffer is full and blocks producers.
    ///
    /// Redeliver the message before any newer data on the same stream.
    /// Watermarks delivered in the meantime are held back until it has been
    /// accepted.
    Blocked(DataMessage<T>),
}

impl<T> Progress<T> {
    /// Return the joined tick, if one fired.
    pub fn into_joined(self) -> Option<JoinedTick<T>> {
        match self {
            Progress::Joined(tick) => Some(tick),
            _ => None,
        }
    }

    /// Whether a tick was joined.
    pub fn is_joined(&self) -> bool {
        matches!(self, Progress::Joined(_))
    }
}

#[derive(Debug)]
struct Input<T> {
    options: StreamOptions,
    buffer: StreamBuffer<T>,
}

/// Aligns N input streams by watermark and fires one join per tick.
///
/// # Example
///
/// ```rust
/// use tracksync::stream::WatermarkCoordinator;
/// use tracksync::temporal::{DataMessage, Timestamp};
///
/// let mut coordinator = WatermarkCoordinator::new("fusion");
/// coordinator.register_stream("camera", true).unwrap();
/// coordinator.register_stream("lidar", true).unwrap();
///
/// coordinator.on_data("camera", DataMessage::new(1, "frame")).unwrap();
/// coordinator.on_data("lidar", DataMessage::new(1, "cloud")).unwrap();
/// assert!(coordinator.on_watermark("camera", Timestamp::from(1)).unwrap().is_none());
///
/// let tick = coordinator.on_watermark("lidar", Timestamp::from(1)).unwrap().unwrap();
/// assert_eq!(tick.timestamp(), &Timestamp::from(1));
/// assert_eq!(tick.present(), 2);
/// ```
#[derive(Debug)]
pub struct WatermarkCoordinator<T> {
    name: String,
    inputs: Vec<Input<T>>,
    last_fired: Option<Timestamp>,
    joins_fired: u64,
    halted: bool,
}

impl<T> WatermarkCoordinator<T> {
    /// Create a coordinator with no streams.
    ///
    /// `name` labels logs and metrics; it is usually the owning operator's
    /// name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            last_fired: None,
            joins_fired: 0,
            halted: false,
        }
    }

    /// Register a stream with the default buffer configuration.
    pub fn register_stream(&mut self, stream: impl Into<StreamId>, required: bool) -> Result<()> {
        let options = if required {
            StreamOptions::required()
        } else {
            StreamOptions::optional()
        };
        self.register_stream_with(stream, options)
    }

    /// Register a stream with explicit options.
    pub fn register_stream_with(
        &mut self,
        stream: impl Into<StreamId>,
        options: StreamOptions,
    ) -> Result<()> {
        let stream = stream.into();
        options.buffer.validate()?;
        if self.inputs.iter().any(|i| i.buffer.stream() == &stream) {
            return Err(Error::DuplicateStream(stream));
        }
        tracing::debug!(
            operator = %self.name,
            stream = %stream,
            role = ?options.role,
            capacity = options.buffer.capacity,
            "registered input stream"
        );
        self.inputs.push(Input {
            options,
            buffer: StreamBuffer::with_config(stream, options.buffer),
        });
        Ok(())
    }

    /// Deliver a data message, then evaluate readiness once.
    pub fn on_data(&mut self, stream: impl AsRef<str>, msg: DataMessage<T>) -> Result<Progress<T>> {
        self.ensure_running()?;
        let result = self.deliver_data(stream.as_ref(), msg);
        self.poison_on_fatal(result)
    }

    /// Deliver a watermark, then evaluate readiness once.
    pub fn on_watermark(
        &mut self,
        stream: impl AsRef<str>,
        timestamp: Timestamp,
    ) -> Result<Option<JoinedTick<T>>> {
        self.ensure_running()?;
        let result = self.deliver_watermark(stream.as_ref(), timestamp);
        self.poison_on_fatal(result)
    }

    /// Evaluate readiness once without new input.
    ///
    /// Hosts that deliver several watermarks at once can call this until it
    /// returns `None` to catch up on ticks that became ready together.
    pub fn poll(&mut self) -> Result<Option<JoinedTick<T>>> {
        self.ensure_running()?;
        let result = self.try_join();
        self.poison_on_fatal(result)
    }

    fn deliver_data(&mut self, stream: &str, msg: DataMessage<T>) -> Result<Progress<T>> {
        let idx = self.index_of(stream)?;
        trace_data_received(&self.name, stream, msg.timestamp());

        match self.inputs[idx].buffer.push(msg)? {
            PushOutcome::Accepted => {}
            PushOutcome::DroppedOldest(evicted) => {
                tracing::warn!(
                    operator = %self.name,
                    stream = %stream,
                    timestamp = %evicted.timestamp(),
                    "buffer full, dropped oldest message"
                );
                record_message_dropped(&self.name, stream);
            }
            PushOutcome::Blocked(msg) => {
                tracing::debug!(
                    operator = %self.name,
                    stream = %stream,
                    timestamp = %msg.timestamp(),
                    "buffer full, blocking producer"
                );
                record_message_blocked(&self.name, stream);
                return Ok(Progress::Blocked(msg));
            }
        }
        record_message_buffered(&self.name, stream);
        record_buffer_depth(&self.name, stream, self.inputs[idx].buffer.len());

        Ok(match self.try_join()? {
            Some(tick) => Progress::Joined(tick),
            None => Progress::Pending,
        })
    }

    fn deliver_watermark(
        &mut self,
        stream: &str,
        timestamp: Timestamp,
    ) -> Result<Option<JoinedTick<T>>> {
        let idx = self.index_of(stream)?;
        trace_watermark_received(&self.name, stream, &timestamp);
        self.inputs[idx].buffer.observe_watermark(timestamp)?;
        self.try_join()
    }

    /// Smallest head timestamp over the required streams.
    fn candidate(&self) -> Option<Timestamp> {
        self.inputs
            .iter()
            .filter(|i| i.options.role == StreamRole::Required)
            .filter_map(|i| i.buffer.front().map(|m| m.timestamp()))
            .min()
            .cloned()
    }

    fn try_join(&mut self) -> Result<Option<JoinedTick<T>>> {
        let Some(tick) = self.candidate() else {
            return Ok(None);
        };

        // A required head at or below the last joined tick is a second
        // message for a tick that already fired.
        if let Some(last) = &self.last_fired {
            if &tick <= last {
                let stream = self.required_head_at(&tick);
                return Err(Error::Desync {
                    stream,
                    expected: last.clone(),
                    found: Some(tick),
                });
            }
        }

        // A required stream that is complete up to the tick must hold it.
        for input in self.required() {
            if !input.buffer.is_watermarked(&tick) {
                continue;
            }
            let head = input.buffer.front().map(|m| m.timestamp());
            if head != Some(&tick) {
                return Err(Error::Desync {
                    stream: input.buffer.stream().clone(),
                    expected: tick,
                    found: head.cloned(),
                });
            }
        }

        let ready = self
            .inputs
            .iter()
            .filter(|i| i.options.gates())
            .all(|i| i.buffer.is_watermarked(&tick));
        if !ready {
            return Ok(None);
        }

        self.fire(tick).map(Some)
    }

    fn fire(&mut self, tick: Timestamp) -> Result<JoinedTick<T>> {
        let mut inputs = Vec::with_capacity(self.inputs.len());

        for input in &mut self.inputs {
            let stream = input.buffer.stream().clone();
            match input.options.role {
                StreamRole::Required => {
                    let msg = input.buffer.pop_front()?;
                    if msg.timestamp() != &tick {
                        return Err(Error::Desync {
                            stream,
                            expected: tick,
                            found: Some(msg.timestamp().clone()),
                        });
                    }
                    inputs.push((stream, Some(msg)));
                }
                StreamRole::Optional => {
                    while input.buffer.front().is_some_and(|m| m.timestamp() < &tick) {
                        if let Some(stale) = input.buffer.discard_front() {
                            tracing::warn!(
                                operator = %self.name,
                                stream = %stream,
                                timestamp = %stale.timestamp(),
                                tick = %tick,
                                "discarding optional message with no matching tick"
                            );
                            record_message_dropped(&self.name, stream.as_str());
                        }
                    }
                    let msg = if input.buffer.front().is_some_and(|m| m.timestamp() == &tick) {
                        Some(input.buffer.pop_front()?)
                    } else {
                        None
                    };
                    inputs.push((stream, msg));
                }
            }
            record_buffer_depth(&self.name, input.buffer.stream().as_str(), input.buffer.len());
        }

        tracing::debug!(operator = %self.name, timestamp = %tick, "join fired");
        self.last_fired = Some(tick.clone());
        self.joins_fired += 1;

        Ok(JoinedTick {
            timestamp: tick,
            inputs,
        })
    }

    fn required(&self) -> impl Iterator<Item = &Input<T>> {
        self.inputs
            .iter()
            .filter(|i| i.options.role == StreamRole::Required)
    }

    fn required_head_at(&self, tick: &Timestamp) -> StreamId {
        self.required()
            .find(|i| i.buffer.front().is_some_and(|m| m.timestamp() == tick))
            .or_else(|| self.required().next())
            .map(|i| i.buffer.stream().clone())
            .unwrap_or_else(|| StreamId::from(self.name.as_str()))
    }

    fn index_of(&self, stream: &str) -> Result<usize> {
        self.inputs
            .iter()
            .position(|i| i.buffer.stream().as_str() == stream)
            .ok_or_else(|| Error::UnknownStream(StreamId::from(stream)))
    }

    fn ensure_running(&self) -> Result<()> {
        if self.halted {
            return Err(Error::Halted(self.name.clone()));
        }
        Ok(())
    }

    fn poison_on_fatal<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(err) = &result {
            if err.is_fatal() {
                trace_fatal(&self.name, err);
                self.halted = true;
            }
        }
        result
    }

    /// The coordinator's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The last tick joined, if any.
    pub fn last_fired(&self) -> Option<&Timestamp> {
        self.last_fired.as_ref()
    }

    /// Number of joins fired so far.
    pub fn joins_fired(&self) -> u64 {
        self.joins_fired
    }

    /// Whether a fatal error has halted the coordinator.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Number of registered streams.
    pub fn stream_count(&self) -> usize {
        self.inputs.len()
    }

    /// Borrow the buffer of a registered stream.
    pub fn buffer(&self, stream: impl AsRef<str>) -> Option<&StreamBuffer<T>> {
        let stream = stream.as_ref();
        self.inputs
            .iter()
            .find(|i| i.buffer.stream().as_str() == stream)
            .map(|i| &i.buffer)
    }

    /// Number of messages pending on a stream.
    pub fn pending(&self, stream: impl AsRef<str>) -> Result<usize> {
        let stream = stream.as_ref();
        self.buffer(stream)
            .map(StreamBuffer::len)
            .ok_or_else(|| Error::UnknownStream(StreamId::from(stream)))
    }

    /// Total number of messages pending across all streams.
    pub fn total_pending(&self) -> usize {
        self.inputs.iter().map(|i| i.buffer.len()).sum()
    }

    /// Discard all buffered state.
    ///
    /// Returns the number of pending messages that were dropped. The
    /// coordinator keeps its registrations but refuses further input.
    pub fn shutdown(&mut self) -> usize {
        let discarded: usize = self.inputs.iter_mut().map(|i| i.buffer.clear()).sum();
        if discarded > 0 {
            tracing::debug!(operator = %self.name, discarded, "discarded pending messages");
        }
        self.halted = true;
        discarded
    }
}
