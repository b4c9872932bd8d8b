//! Error types for tracksync.

use crate::stream::StreamId;
use crate::temporal::Timestamp;
use thiserror::Error;

/// Result type alias using tracksync's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tracksync operations.
///
/// Most variants are protocol violations that leave an operator in an
/// unrecoverable state; see [`Error::is_fatal`]. Tracker failures are not
/// errors at all: they are recorded on the tick report and processing
/// continues.
#[derive(Error, Debug)]
pub enum Error {
    /// A stream delivered a message older than one it already delivered.
    #[error("stream {stream}: message at {timestamp} arrived after {previous}")]
    OutOfOrder {
        /// Offending stream.
        stream: StreamId,
        /// Timestamp of the rejected message.
        timestamp: Timestamp,
        /// Highest timestamp pushed before it.
        previous: Timestamp,
    },

    /// A stream delivered a message at or below its own watermark.
    #[error("stream {stream}: message at {timestamp} arrived after watermark {watermark}")]
    LateMessage {
        /// Offending stream.
        stream: StreamId,
        /// Timestamp of the rejected message.
        timestamp: Timestamp,
        /// Watermark already observed on the stream.
        watermark: Timestamp,
    },

    /// A watermark moved backwards.
    #[error("stream {stream}: watermark {watermark} is below previous watermark {previous}")]
    WatermarkRegression {
        /// Offending stream.
        stream: StreamId,
        /// The rejected watermark.
        watermark: Timestamp,
        /// Watermark already observed on the stream.
        previous: Timestamp,
    },

    /// Pop from a buffer with no pending messages.
    #[error("stream {stream}: buffer is empty")]
    EmptyBuffer {
        /// Stream whose buffer was empty.
        stream: StreamId,
    },

    /// A full buffer configured to reject new input received a message.
    #[error("stream {stream}: buffer full ({capacity} pending messages)")]
    BufferOverflow {
        /// Stream whose buffer overflowed.
        stream: StreamId,
        /// Configured capacity.
        capacity: usize,
    },

    /// A required stream does not hold exactly one message for a tick.
    #[error("stream {stream}: desynchronized at {expected} (found {})", found_display(.found))]
    Desync {
        /// Stream that broke the one-message-per-tick contract.
        stream: StreamId,
        /// The tick being joined.
        expected: Timestamp,
        /// Head of the stream's buffer, if any.
        found: Option<Timestamp>,
    },

    /// Delivery to a stream that was never registered.
    #[error("unknown stream: {0}")]
    UnknownStream(StreamId),

    /// A stream id registered twice on one coordinator.
    #[error("stream registered twice: {0}")]
    DuplicateStream(StreamId),

    /// A joined message carried a payload the operator cannot use.
    #[error("stream {stream}: expected {expected} payload")]
    PayloadMismatch {
        /// Stream that carried the payload.
        stream: StreamId,
        /// Payload kind the operator expected.
        expected: &'static str,
    },

    /// Output emitted out of tick order.
    #[error("emit at {timestamp} does not follow last emitted tick {last}")]
    EmitOrder {
        /// Tick being emitted.
        timestamp: Timestamp,
        /// Last tick already emitted.
        last: Timestamp,
    },

    /// Tracker kind unknown or not registered.
    #[error("unsupported tracker kind: {0}")]
    UnsupportedTrackerKind(String),

    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Timestamp unusable for the requested operation.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Writing a trace record failed.
    #[error("failed to persist {key}: {source}")]
    Persistence {
        /// Record key.
        key: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operator already hit a fatal error and refuses further input.
    #[error("operator {0} halted after a fatal error")]
    Halted(String),
}

impl Error {
    /// Whether this error leaves the operator unable to continue.
    ///
    /// Persistence and I/O errors are not fatal by kind; the operator's
    /// configured policy decides what to do with them.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::Persistence { .. } | Error::Serialization(_) | Error::Io(_)
        )
    }
}

fn found_display(found: &Option<Timestamp>) -> String {
    match found {
        Some(ts) => ts.to_string(),
        None => "nothing".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desync_display() {
        let err = Error::Desync {
            stream: StreamId::from("camera"),
            expected: Timestamp::from(3),
            found: None,
        };
        assert_eq!(
            err.to_string(),
            "stream camera: desynchronized at [3] (found nothing)"
        );

        let err = Error::Desync {
            stream: StreamId::from("camera"),
            expected: Timestamp::from(3),
            found: Some(Timestamp::from(4)),
        };
        assert!(err.to_string().ends_with("(found [4])"));
    }

    #[test]
    fn test_fatality() {
        assert!(Error::UnsupportedTrackerKind("kcf".into()).is_fatal());
        assert!(Error::Halted("tracker".into()).is_fatal());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = Error::Persistence {
            key: "trajectories-1.json".into(),
            source: io,
        };
        assert!(!err.is_fatal());
    }
}
