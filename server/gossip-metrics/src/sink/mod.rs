//! Metric sinks: where derived records go once the engine is done with them.
//!
//! The engine calls `publish` synchronously, once per record. Backends own
//! their connection bookkeeping; decorators add retries or a bounded queue.

mod influx;
mod json_lines;
mod pushgateway;
mod queue;
mod retry;

pub use influx::{measurement_for, InfluxPoint, InfluxSink};
pub use json_lines::JsonLinesSink;
pub use pushgateway::{render_exposition, PushgatewaySink};
pub use queue::{EmitterReport, QueuedSink};
pub use retry::{RetryPolicy, Retrying};

use tracing::info;

use crate::config::{SinkConfig, SinkKind};
use crate::error::SinkError;
use crate::types::MetricRecord;

pub trait MetricSink {
  /// Hand one record to the backend. Failures are reported, not retried here.
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError>;

  fn flush(&mut self) -> Result<(), SinkError> {
    Ok(())
  }
}

impl<S: MetricSink + ?Sized> MetricSink for Box<S> {
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError> {
    (**self).publish(record)
  }

  fn flush(&mut self) -> Result<(), SinkError> {
    (**self).flush()
  }
}

pub type BoxedSink = Box<dyn MetricSink + Send>;

/// Connect the configured backend, wrapped with the per-publish retry policy.
///
/// Network backends check their endpoint under the init retry policy and fail
/// with `SinkError::Init` once it is exhausted.
pub fn connect(config: &SinkConfig) -> Result<BoxedSink, SinkError> {
  let backend: BoxedSink = match config.kind {
    SinkKind::Pushgateway => Box::new(PushgatewaySink::connect(config)?),
    SinkKind::Influx => Box::new(InfluxSink::connect(config)?),
    SinkKind::Stdout => Box::new(JsonLinesSink::stdout()),
  };
  info!(kind = ?config.kind, publish_attempts = config.publish_attempts, "metric sink ready");

  let retry = config.publish_retry();
  if retry.attempts > 1 {
    Ok(Box::new(Retrying::new(backend, retry)))
  } else {
    Ok(backend)
  }
}
