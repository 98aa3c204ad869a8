//! Core engine: owns correlation state, processes decoded records.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::Config;
use crate::derive::{self, Dissemination};
use crate::extract;
use crate::store::{CorrelationStore, StoreStats};
use crate::types::*;

/// The correlation engine. Holds in-memory state across records for the
/// lifetime of one run.
pub struct Engine {
  config: Config,
  store: CorrelationStore,
  dissemination: Dissemination,
}

impl Engine {
  pub fn new(config: Config) -> Self {
    let store = CorrelationStore::new(config.cache_capacity);
    let dissemination = Dissemination::new(config.total_nodes);
    Self {
      config,
      store,
      dissemination,
    }
  }

  pub fn with_defaults() -> Self {
    Self::new(Config::default())
  }

  /// Classify one decoded record and derive its metrics.
  ///
  /// Unrecognized records produce no metrics and leave the state untouched.
  pub fn process(&mut self, record: &Value) -> (ProtocolEvent, Vec<MetricRecord>) {
    let event = extract::extract(record);
    let metrics = self.apply(&event);
    (event, metrics)
  }

  /// Apply an already classified event.
  pub fn apply(&mut self, event: &ProtocolEvent) -> Vec<MetricRecord> {
    derive::derive(event, &mut self.store, &mut self.dissemination)
  }

  /// Percentage of `total_nodes` that have observed delivery so far.
  pub fn dissemination_rate(&self) -> f64 {
    self.dissemination.rate()
  }

  pub fn nodes_reached(&self) -> u64 {
    self.dissemination.nodes_reached
  }

  /// Snapshot gauge of the dissemination rate, stamped with `at`.
  pub fn dissemination_record(&self, at: DateTime<Utc>) -> MetricRecord {
    MetricRecord::new(MESSAGE_DISSEMINATION_RATE, self.dissemination_rate(), at)
      .with_label("event", "summary")
      .with_label("total_nodes", self.config.total_nodes.to_string())
  }

  pub fn store_stats(&self) -> StoreStats {
    self.store.stats()
  }
}
