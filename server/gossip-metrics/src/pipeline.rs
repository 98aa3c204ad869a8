//! The sequential processing loop: lines in, metrics out.
//!
//! One line is decoded, classified, correlated and emitted before the next is
//! read. Bad lines and failed publishes are logged and counted; neither stops
//! the stream.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::engine::Engine;
use crate::sink::MetricSink;
use crate::types::{ProtocolEvent, RunSummary};

pub fn run<R, S>(mut input: R, engine: &mut Engine, sink: &mut S) -> RunSummary
where
  R: BufRead,
  S: MetricSink + ?Sized,
{
  let mut summary = RunSummary::default();

  let mut buf = Vec::new();
  let mut lineno = 0usize;

  loop {
    buf.clear();
    match input.read_until(b'\n', &mut buf) {
      Ok(0) => break,
      Ok(_) => lineno += 1,
      Err(e) => {
        error!(line = lineno + 1, error = %e, "read error, stopping");
        summary.read_error = Some(e.to_string());
        break;
      }
    }

    let line = match std::str::from_utf8(&buf) {
      Ok(l) => l,
      Err(e) => {
        summary.lines += 1;
        summary.decode_errors += 1;
        warn!(line = lineno, error = %e, "skipping line with invalid UTF-8");
        continue;
      }
    };

    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }
    summary.lines += 1;

    let record: Value = match serde_json::from_str(trimmed) {
      Ok(v) => v,
      Err(e) => {
        summary.decode_errors += 1;
        warn!(line = lineno, error = %e, "skipping invalid JSON line");
        continue;
      }
    };

    let (event, metrics) = engine.process(&record);
    if event == ProtocolEvent::Unrecognized {
      summary.unrecognized += 1;
      continue;
    }
    summary.events += 1;

    for metric in metrics {
      debug!(%metric, "derived");
      let name = metric.name.clone();
      match sink.publish(metric) {
        Ok(()) => summary.metrics_emitted += 1,
        Err(e) => {
          summary.publish_failures += 1;
          error!(line = lineno, metric = %name, error = %e, "failed to publish metric");
        }
      }
    }
  }

  if let Err(e) = sink.flush() {
    error!(error = %e, "failed to flush sink");
  }
  summary
}

/// Emit the end-of-run dissemination gauge and count the outcome in `summary`.
pub fn publish_dissemination<S>(
  engine: &Engine,
  sink: &mut S,
  at: DateTime<Utc>,
  summary: &mut RunSummary,
) where
  S: MetricSink + ?Sized,
{
  match sink.publish(engine.dissemination_record(at)) {
    Ok(()) => summary.metrics_emitted += 1,
    Err(e) => {
      summary.publish_failures += 1;
      error!(error = %e, "failed to publish dissemination rate");
    }
  }
}
