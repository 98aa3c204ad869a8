//! Derive metric records from classified events.

use std::num::NonZeroU64;

use tracing::{debug, warn};

use crate::store::CorrelationStore;
use crate::types::*;

/// Running count of nodes that have taken delivery, against a fixed total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dissemination {
  /// Starts at 1: the publisher already holds the message.
  pub nodes_reached: u64,
  pub total_nodes: NonZeroU64,
}

impl Dissemination {
  pub fn new(total_nodes: NonZeroU64) -> Self {
    Self {
      nodes_reached: 1,
      total_nodes,
    }
  }

  pub fn record_delivery(&mut self) {
    self.nodes_reached += 1;
  }

  /// Percentage of the configured node total reached so far.
  pub fn rate(&self) -> f64 {
    self.nodes_reached as f64 / self.total_nodes.get() as f64 * 100.0
  }
}

/// Apply one event to the correlation state and return the metrics it yields.
///
/// - Published: remember the publish time, emit `published_message_event` = 1.
/// - DuplicateReceived: bump the counter, emit `duplicate_message_event` = count.
/// - DeliveryObserved: advance dissemination; if the publish is still resident
///   emit `message_delivery_time` in milliseconds, otherwise nothing.
pub fn derive(
  event: &ProtocolEvent,
  store: &mut CorrelationStore,
  dissemination: &mut Dissemination,
) -> Vec<MetricRecord> {
  match event {
    ProtocolEvent::Published(info) => {
      store.record_publish(&info.message_id, info.timestamp);
      vec![gauge(PUBLISHED_MESSAGE_EVENT, "published", info, 1.0)]
    }
    ProtocolEvent::DuplicateReceived(info) => {
      let count = store.increment_duplicate(&info.message_id);
      vec![gauge(DUPLICATE_MESSAGE_EVENT, "received", info, count as f64)]
    }
    ProtocolEvent::DeliveryObserved(info) => {
      dissemination.record_delivery();
      debug!(
        nodes_reached = dissemination.nodes_reached,
        rate = dissemination.rate(),
        "delivery observed"
      );

      let published = match store.lookup_publish(&info.message_id) {
        Some(t) => t,
        None => return Vec::new(),
      };

      // Microsecond resolution keeps sub-millisecond latency; fall back to
      // whole milliseconds when the span overflows.
      let elapsed = info.timestamp - published;
      let elapsed_ms = match elapsed.num_microseconds() {
        Some(us) => us as f64 / 1000.0,
        None => elapsed.num_milliseconds() as f64,
      };
      if elapsed_ms < 0.0 {
        warn!(
          msg_id = %info.message_id,
          node = info.node_id,
          elapsed_ms,
          "delivery observed before publish"
        );
      }
      vec![gauge(MESSAGE_DELIVERY_TIME, "received", info, elapsed_ms)]
    }
    ProtocolEvent::Unrecognized => Vec::new(),
  }
}

fn gauge(name: &str, event: &str, info: &EventInfo, value: f64) -> MetricRecord {
  MetricRecord::new(name, value, info.timestamp)
    .with_label("node", info.node_id.to_string())
    .with_label("event", event)
    .with_label("msg_id", info.message_id.clone())
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::{DateTime, Duration, TimeZone, Utc};
  use std::num::NonZeroUsize;

  fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap()
  }

  fn info(id: &str, node: i64, offset_ms: i64) -> EventInfo {
    EventInfo {
      message_id: id.into(),
      node_id: node,
      timestamp: t0() + Duration::milliseconds(offset_ms),
    }
  }

  fn state(capacity: usize) -> (CorrelationStore, Dissemination) {
    (
      CorrelationStore::new(NonZeroUsize::new(capacity).unwrap()),
      Dissemination::new(NonZeroU64::new(100).unwrap()),
    )
  }

  #[test]
  fn publish_emits_unit_gauge_with_labels() {
    let (mut store, mut diss) = state(2);
    let out = derive(&ProtocolEvent::Published(info("m1", 0, 0)), &mut store, &mut diss);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].name, PUBLISHED_MESSAGE_EVENT);
    assert_eq!(out[0].value, 1.0);
    assert_eq!(out[0].label("event"), Some("published"));
    assert_eq!(out[0].label("msg_id"), Some("m1"));
    assert_eq!(out[0].label("node"), Some("0"));
    assert_eq!(out[0].timestamp, t0());
  }

  #[test]
  fn delivery_time_is_difference_in_ms() {
    let (mut store, mut diss) = state(2);
    derive(&ProtocolEvent::Published(info("m1", 0, 0)), &mut store, &mut diss);
    let out = derive(&ProtocolEvent::DeliveryObserved(info("m1", 3, 250)), &mut store, &mut diss);

    assert_eq!(out.len(), 1);
    assert_eq!(out[0].name, MESSAGE_DELIVERY_TIME);
    assert_eq!(out[0].value, 250.0);
    assert_eq!(out[0].label("event"), Some("received"));
    assert_eq!(out[0].label("node"), Some("3"));
  }

  #[test]
  fn delivery_without_publish_is_silent_but_counts() {
    let (mut store, mut diss) = state(2);
    let out = derive(&ProtocolEvent::DeliveryObserved(info("ghost", 1, 10)), &mut store, &mut diss);
    assert!(out.is_empty());
    assert_eq!(diss.nodes_reached, 2);
    assert!((diss.rate() - 2.0).abs() < f64::EPSILON);
  }

  #[test]
  fn duplicates_emit_running_count() {
    let (mut store, mut diss) = state(2);
    let values: Vec<f64> = (0..3)
      .flat_map(|i| derive(&ProtocolEvent::DuplicateReceived(info("m1", i, 0)), &mut store, &mut diss))
      .map(|r| r.value)
      .collect();
    assert_eq!(values, vec![1.0, 2.0, 3.0]);
  }

  #[test]
  fn unrecognized_yields_nothing() {
    let (mut store, mut diss) = state(2);
    assert!(derive(&ProtocolEvent::Unrecognized, &mut store, &mut diss).is_empty());
    assert_eq!(store.stats().publish_len, 0);
    assert_eq!(diss.nodes_reached, 1);
  }

  #[test]
  fn early_delivery_reports_negative_latency() {
    let (mut store, mut diss) = state(2);
    derive(&ProtocolEvent::Published(info("m1", 0, 100)), &mut store, &mut diss);
    let out = derive(&ProtocolEvent::DeliveryObserved(info("m1", 1, 40)), &mut store, &mut diss);
    assert_eq!(out[0].value, -60.0);
  }
}
