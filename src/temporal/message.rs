//! Messages that travel on a stream.

use super::timestamp::Timestamp;

/// A timestamped data message.
///
/// Immutable once created: the payload is only reachable by reference or by
/// consuming the message.
#[derive(Debug, Clone, PartialEq)]
pub struct DataMessage<T> {
    timestamp: Timestamp,
    payload: T,
}

impl<T> DataMessage<T> {
    /// Create a new data message.
    pub fn new(timestamp: impl Into<Timestamp>, payload: T) -> Self {
        Self {
            timestamp: timestamp.into(),
            payload,
        }
    }

    /// The logical time of this message.
    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// Borrow the payload.
    pub fn payload(&self) -> &T {
        &self.payload
    }

    /// Consume the message, returning the payload.
    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Consume the message, returning timestamp and payload.
    pub fn into_parts(self) -> (Timestamp, T) {
        (self.timestamp, self.payload)
    }
}

/// Completeness signal for a stream.
///
/// A watermark at `t` asserts that no further data message with a timestamp
/// `<= t` will arrive on the stream that carried it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Watermark {
    timestamp: Timestamp,
}

impl Watermark {
    /// Create a watermark.
    pub fn new(timestamp: impl Into<Timestamp>) -> Self {
        Self {
            timestamp: timestamp.into(),
        }
    }

    /// The timestamp up to which the stream is complete.
    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }

    /// Consume the watermark, returning its timestamp.
    pub fn into_timestamp(self) -> Timestamp {
        self.timestamp
    }
}

/// One item on a stream: either data or a watermark.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent<T> {
    /// A data message.
    Data(DataMessage<T>),
    /// A watermark.
    Watermark(Watermark),
}

impl<T> StreamEvent<T> {
    /// Convenience constructor for a data event.
    pub fn data(timestamp: impl Into<Timestamp>, payload: T) -> Self {
        Self::Data(DataMessage::new(timestamp, payload))
    }

    /// Convenience constructor for a watermark event.
    pub fn watermark(timestamp: impl Into<Timestamp>) -> Self {
        Self::Watermark(Watermark::new(timestamp))
    }

    /// The timestamp carried by this event.
    pub fn timestamp(&self) -> &Timestamp {
        match self {
            Self::Data(msg) => msg.timestamp(),
            Self::Watermark(wm) => wm.timestamp(),
        }
    }

    /// Whether this event is a watermark.
    pub fn is_watermark(&self) -> bool {
        matches!(self, Self::Watermark(_))
    }
}
