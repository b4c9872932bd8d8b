//! Sampled persistence shared by the logger operators.

use super::Lifecycle;
use crate::config::{LoggerConfig, PersistFailurePolicy};
use crate::error::{Error, Result};
use crate::observability::{OperatorMetrics, trace_data_received};
use crate::persist::{PersistenceSink, TraceRecord, trace_key};
use crate::sampling::SamplingGate;
use crate::stream::StreamId;
use crate::temporal::Timestamp;

/// Counts messages on one input and persists every Nth as a trace record.
#[derive(Debug)]
pub(crate) struct Recorder<S> {
    config: LoggerConfig,
    input: StreamId,
    key_prefix: &'static str,
    gate: SamplingGate,
    sink: S,
    metrics: OperatorMetrics,
    lifecycle: Lifecycle,
    written: u64,
}

impl<S: PersistenceSink> Recorder<S> {
    pub(crate) fn new(
        config: LoggerConfig,
        input: &'static str,
        key_prefix: &'static str,
        sink: S,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            metrics: OperatorMetrics::new(&config.name),
            lifecycle: Lifecycle::new(config.name.clone()),
            input: StreamId::from(input),
            key_prefix,
            gate: SamplingGate::new(),
            sink,
            written: 0,
            config,
        })
    }

    /// Count one message and persist it if sampled.
    ///
    /// `build` turns the tick's single coordinate into the record; it only
    /// runs for sampled messages.
    pub(crate) fn record<B>(&mut self, stream: &str, timestamp: &Timestamp, build: B) -> Result<()>
    where
        B: FnOnce(u64) -> TraceRecord,
    {
        let _span = self.lifecycle.enter();
        self.lifecycle.ensure_running()?;
        let result = self.try_record(stream, timestamp, build);
        self.lifecycle.check(result)
    }

    fn try_record<B>(&mut self, stream: &str, timestamp: &Timestamp, build: B) -> Result<()>
    where
        B: FnOnce(u64) -> TraceRecord,
    {
        self.check_stream(stream)?;
        trace_data_received(self.lifecycle.name(), stream, timestamp);
        if !self.gate.should_act(self.config.log_every_nth_message) {
            return Ok(());
        }

        let coordinate = timestamp.expect_single()?;
        let key = trace_key(self.key_prefix, timestamp)?;
        let record = build(coordinate);

        match self.sink.write(&key, &record) {
            Ok(()) => {
                self.written += 1;
                self.metrics.record_persisted();
                tracing::debug!(operator = %self.lifecycle.name(), key = %key, "persisted trace record");
                Ok(())
            }
            Err(err) => {
                self.metrics.record_persist_failure();
                match self.config.on_persist_failure {
                    PersistFailurePolicy::Fatal => {
                        self.lifecycle.halt(&err);
                        Err(err)
                    }
                    PersistFailurePolicy::SkipAndLog => {
                        tracing::error!(
                            operator = %self.lifecycle.name(),
                            key = %key,
                            error = %err,
                            "failed to persist trace record, skipping"
                        );
                        Ok(())
                    }
                }
            }
        }
    }

    /// Watermarks carry nothing to persist; only the stream is checked.
    pub(crate) fn observe_watermark(&mut self, stream: &str, timestamp: &Timestamp) -> Result<()> {
        let _span = self.lifecycle.enter();
        self.lifecycle.ensure_running()?;
        let result = self.check_stream(stream);
        self.lifecycle.check(result)?;
        tracing::trace!(operator = %self.lifecycle.name(), timestamp = %timestamp, "watermark");
        Ok(())
    }

    fn check_stream(&self, stream: &str) -> Result<()> {
        if self.input != stream {
            return Err(Error::UnknownStream(StreamId::from(stream)));
        }
        Ok(())
    }

    pub(crate) fn name(&self) -> &str {
        self.lifecycle.name()
    }

    pub(crate) fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub(crate) fn sink(&self) -> &S {
        &self.sink
    }

    pub(crate) fn received(&self) -> u64 {
        self.gate.calls()
    }

    pub(crate) fn written(&self) -> u64 {
        self.written
    }

    pub(crate) fn is_halted(&self) -> bool {
        self.lifecycle.is_halted()
    }
}
