//! Fixed-delay bounded retries, shared by sink init and per-record publish.

use std::thread;
use std::time::Duration;

use tracing::warn;

use super::MetricSink;
use crate::error::SinkError;
use crate::types::MetricRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Total tries, including the first. Never below 1.
  pub attempts: u32,
  pub delay: Duration,
}

impl RetryPolicy {
  pub fn new(attempts: u32, delay: Duration) -> Self {
    Self {
      attempts: attempts.max(1),
      delay,
    }
  }

  /// Run `op` until it succeeds or attempts run out; returns the last error.
  pub fn run<T>(
    &self,
    what: &str,
    mut op: impl FnMut() -> Result<T, SinkError>,
  ) -> Result<T, SinkError> {
    let mut attempt = 1;
    loop {
      match op() {
        Ok(v) => return Ok(v),
        Err(e) if attempt < self.attempts => {
          warn!(
            attempt,
            max_attempts = self.attempts,
            delay_ms = self.delay.as_millis() as u64,
            error = %e,
            "{} failed, retrying",
            what
          );
          thread::sleep(self.delay);
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }

  /// Like `run`, but exhaustion becomes `SinkError::Init`.
  pub fn connect<T>(
    &self,
    what: &str,
    op: impl FnMut() -> Result<T, SinkError>,
  ) -> Result<T, SinkError> {
    self.run(what, op).map_err(|last| SinkError::Init {
      attempts: self.attempts,
      last: Box::new(last),
    })
  }
}

/// Sink decorator that retries each publish under a `RetryPolicy`.
pub struct Retrying<S> {
  inner: S,
  policy: RetryPolicy,
}

impl<S: MetricSink> Retrying<S> {
  pub fn new(inner: S, policy: RetryPolicy) -> Self {
    Self { inner, policy }
  }

  pub fn into_inner(self) -> S {
    self.inner
  }
}

impl<S: MetricSink> MetricSink for Retrying<S> {
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError> {
    let inner = &mut self.inner;
    self.policy.run("publish", || inner.publish(record.clone()))
  }

  fn flush(&mut self) -> Result<(), SinkError> {
    self.inner.flush()
  }
}
