//! Observability features: metrics and tracing.
//!
//! - **Metrics**: Counters, gauges, and histograms via `metrics-rs`
//! - **Tracing**: Structured logging and spans via `tracing`
//!
//! Both are no-ops until the host installs a recorder or subscriber, so
//! tests and embedded uses pay nothing for them.
//!
//! ## Metrics
//!
//! | Metric | Type | Description |
//! |--------|------|-------------|
//! | `tracksync_joins_fired` | Counter | Ticks joined |
//! | `tracksync_messages_buffered` | Counter | Messages accepted into input buffers |
//! | `tracksync_messages_dropped` | Counter | Messages evicted or discarded unjoined |
//! | `tracksync_messages_blocked` | Counter | Messages handed back by full buffers |
//! | `tracksync_buffer_depth` | Gauge | Pending messages per input buffer |
//! | `tracksync_tracker_failures` | Counter | Ticks where the tracker failed |
//! | `tracksync_tracker_reinitializations` | Counter | Tracker reinitializations |
//! | `tracksync_records_persisted` | Counter | Trace records written |
//! | `tracksync_persist_failures` | Counter | Trace records that failed to write |
//! | `tracksync_detector_failures` | Counter | Sampled ticks where the detector failed |
//! | `tracksync_render_failures` | Counter | Detections that failed to render or save |
//! | `tracksync_tick_time_ns` | Histogram | Processing time per tick |

mod metrics;
mod tracing_support;

pub use self::metrics::{
    OperatorMetrics, TimerGuard, init_metrics, record_buffer_depth, record_message_blocked,
    record_message_buffered, record_message_dropped,
};
pub use tracing_support::{
    span_operator, span_tick, trace_data_received, trace_fatal, trace_watermark_received,
};
