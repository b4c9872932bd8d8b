//! Tracing integration for structured logging and spans.

use crate::temporal::Timestamp;
use tracing::{Level, Span, span};

/// Create a span covering an operator's lifetime.
///
/// # Example
///
/// ```rust,ignore
/// use tracksync::observability::span_operator;
///
/// let span = span_operator("object-tracker");
/// let _guard = span.enter();
/// ```
#[inline]
pub fn span_operator(name: &str) -> Span {
    span!(Level::INFO, "operator", name = %name)
}

/// Create a span for the processing of one joined tick.
#[inline]
pub fn span_tick(operator: &str, timestamp: &Timestamp) -> Span {
    span!(
        Level::DEBUG,
        "tick",
        operator = %operator,
        timestamp = %timestamp
    )
}

/// Log a data message arriving on an input stream.
#[inline]
pub fn trace_data_received(operator: &str, stream: &str, timestamp: &Timestamp) {
    tracing::debug!(
        operator = %operator,
        stream = %stream,
        timestamp = %timestamp,
        "received data"
    );
}

/// Log a watermark arriving on an input stream.
#[inline]
pub fn trace_watermark_received(operator: &str, stream: &str, timestamp: &Timestamp) {
    tracing::debug!(
        operator = %operator,
        stream = %stream,
        timestamp = %timestamp,
        "received watermark"
    );
}

/// Log a fatal error that halts an operator.
#[inline]
pub fn trace_fatal(operator: &str, error: &dyn std::error::Error) {
    tracing::error!(
        operator = %operator,
        error = %error,
        "operator halted"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_creation() {
        // These should not panic
        let _span = span_operator("tracker");
        let _span = span_tick("tracker", &Timestamp::from(1));
    }

    #[test]
    fn test_trace_functions() {
        // These should not panic even without a subscriber
        let ts = Timestamp::from(3);
        trace_data_received("tracker", "camera", &ts);
        trace_watermark_received("tracker", "camera", &ts);
        let err = crate::Error::Halted("tracker".into());
        trace_fatal("tracker", &err);
    }
}
