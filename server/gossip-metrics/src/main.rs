//! Binary entrypoint: read JSON lines from stdin, push derived metrics to the
//! configured sink.
//!
//! Logs go to stderr so the stdout sink can be piped. Exit codes: 0 on a
//! clean run, 1 when the sink cannot be initialized or stdin breaks, 2 on
//! invalid configuration.

use std::io;
use std::process;

use chrono::Utc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gossip_metrics::sink::{self, QueuedSink};
use gossip_metrics::{pipeline, Config, Engine, MetricSink};

fn main() {
  tracing_subscriber::fmt()
    .with_writer(io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(tracing::Level::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let config = match Config::from_env() {
    Ok(c) => c,
    Err(e) => {
      error!(error = %e, "invalid configuration");
      process::exit(2);
    }
  };
  info!(
    cache_capacity = config.cache_capacity.get(),
    total_nodes = config.total_nodes.get(),
    emit_queue_depth = config.emit_queue_depth,
    "initializing metric params"
  );

  let mut backend = match sink::connect(&config.sink) {
    Ok(s) => s,
    Err(e) => {
      error!(error = %e, "failed to initialize metric sink");
      process::exit(1);
    }
  };

  let mut engine = Engine::new(config.clone());
  let stdin = io::stdin();

  let summary = if config.emit_queue_depth > 0 {
    let mut queue = match QueuedSink::spawn(backend, config.emit_queue_depth) {
      Ok(q) => q,
      Err(e) => {
        error!(error = %e, "failed to start emission queue");
        process::exit(1);
      }
    };
    let mut summary = pipeline::run(stdin.lock(), &mut engine, &mut queue);
    pipeline::publish_dissemination(&engine, &mut queue, Utc::now(), &mut summary);
    let report = queue.finish();
    summary.publish_failures += report.failures;
    summary.metrics_emitted = report.published;
    summary
  } else {
    let mut summary = pipeline::run(stdin.lock(), &mut engine, &mut backend);
    pipeline::publish_dissemination(&engine, &mut backend, Utc::now(), &mut summary);
    if let Err(e) = backend.flush() {
      error!(error = %e, "failed to flush sink");
    }
    summary
  };

  let stats = engine.store_stats();
  info!(
    lines = summary.lines,
    events = summary.events,
    unrecognized = summary.unrecognized,
    decode_errors = summary.decode_errors,
    metrics_emitted = summary.metrics_emitted,
    publish_failures = summary.publish_failures,
    publish_evictions = stats.publish_evictions,
    duplicate_evictions = stats.duplicate_evictions,
    dissemination_rate = engine.dissemination_rate(),
    "input stream finished"
  );

  if summary.read_error.is_some() {
    process::exit(1);
  }
}

