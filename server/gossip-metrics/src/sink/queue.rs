//! Bounded queue between the processing loop and a slow backend.
//!
//! A single emitter thread drains one FIFO channel, so records reach the
//! backend in exactly the order they were derived. A full queue blocks the
//! producer.

use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Sender};
use tracing::{error, info};

use super::{BoxedSink, MetricSink};
use crate::error::SinkError;
use crate::types::MetricRecord;

/// What the emitter thread did before it stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitterReport {
  pub published: u64,
  pub failures: u64,
}

pub struct QueuedSink {
  tx: Option<Sender<MetricRecord>>,
  handle: Option<JoinHandle<EmitterReport>>,
}

impl QueuedSink {
  pub fn spawn(mut inner: BoxedSink, depth: usize) -> Result<Self, SinkError> {
    let (tx, rx) = bounded::<MetricRecord>(depth);

    let handle = thread::Builder::new()
      .name("metric-emitter".into())
      .spawn(move || {
        let mut report = EmitterReport::default();
        for record in rx {
          let name = record.name.clone();
          match inner.publish(record) {
            Ok(()) => report.published += 1,
            Err(e) => {
              report.failures += 1;
              error!(metric = %name, error = %e, "failed to publish metric");
            }
          }
        }
        if let Err(e) = inner.flush() {
          error!(error = %e, "failed to flush sink");
        }
        report
      })?;

    info!(depth, "emission queue started");
    Ok(Self {
      tx: Some(tx),
      handle: Some(handle),
    })
  }

  /// Close the queue, wait for the emitter to drain it, and report.
  pub fn finish(mut self) -> EmitterReport {
    self.shutdown()
  }

  fn shutdown(&mut self) -> EmitterReport {
    drop(self.tx.take());
    match self.handle.take().map(JoinHandle::join) {
      Some(Ok(report)) => report,
      Some(Err(_)) => {
        error!("metric emitter panicked");
        EmitterReport::default()
      }
      None => EmitterReport::default(),
    }
  }
}

impl MetricSink for QueuedSink {
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError> {
    match &self.tx {
      Some(tx) => tx.send(record).map_err(|_| SinkError::Closed),
      None => Err(SinkError::Closed),
    }
  }
}

impl Drop for QueuedSink {
  fn drop(&mut self) {
    if self.handle.is_some() {
      self.shutdown();
    }
  }
}
