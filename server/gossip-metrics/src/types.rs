//! Core types for the metrics engine (classified events + emitted records).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Classified protocol events
// ---------------------------------------------------------------------------

/// Kind of a classified record, as named by the rule table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
  Published,
  DuplicateReceived,
  DeliveryObserved,
}

/// Payload shared by every classified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventInfo {
  pub message_id: String,
  pub node_id: i64,
  pub timestamp: DateTime<Utc>,
}

/// One log record after classification. Transient: built per input line and
/// consumed immediately by the derivation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
  Published(EventInfo),
  DuplicateReceived(EventInfo),
  /// A node put the message into its local duplicate cache (delivery signal).
  DeliveryObserved(EventInfo),
  Unrecognized,
}

impl ProtocolEvent {
  pub fn new(kind: EventKind, info: EventInfo) -> Self {
    match kind {
      EventKind::Published => Self::Published(info),
      EventKind::DuplicateReceived => Self::DuplicateReceived(info),
      EventKind::DeliveryObserved => Self::DeliveryObserved(info),
    }
  }

  pub fn kind(&self) -> Option<EventKind> {
    match self {
      Self::Published(_) => Some(EventKind::Published),
      Self::DuplicateReceived(_) => Some(EventKind::DuplicateReceived),
      Self::DeliveryObserved(_) => Some(EventKind::DeliveryObserved),
      Self::Unrecognized => None,
    }
  }

  pub fn info(&self) -> Option<&EventInfo> {
    match self {
      Self::Published(i) | Self::DuplicateReceived(i) | Self::DeliveryObserved(i) => Some(i),
      Self::Unrecognized => None,
    }
  }
}

// ---------------------------------------------------------------------------
// Metric names
// ---------------------------------------------------------------------------

pub const PUBLISHED_MESSAGE_EVENT: &str = "published_message_event";
pub const DUPLICATE_MESSAGE_EVENT: &str = "duplicate_message_event";
pub const MESSAGE_DELIVERY_TIME: &str = "message_delivery_time";
pub const MESSAGE_DISSEMINATION_RATE: &str = "message_dissemination_rate";

// ---------------------------------------------------------------------------
// Output record (handed to a sink)
// ---------------------------------------------------------------------------

/// A single gauge sample. Ownership moves into the sink on publish.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
  pub name: String,
  /// Sorted so every renderer produces the same label order.
  pub labels: BTreeMap<String, String>,
  pub value: f64,
  pub timestamp: DateTime<Utc>,
}

impl MetricRecord {
  pub fn new(name: impl Into<String>, value: f64, timestamp: DateTime<Utc>) -> Self {
    Self {
      name: name.into(),
      labels: BTreeMap::new(),
      value,
      timestamp,
    }
  }

  pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.labels.insert(key.into(), value.into());
    self
  }

  pub fn label(&self, key: &str) -> Option<&str> {
    self.labels.get(key).map(String::as_str)
  }
}

impl fmt::Display for MetricRecord {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}{{", self.name)?;
    for (i, (k, v)) in self.labels.iter().enumerate() {
      if i > 0 {
        write!(f, ",")?;
      }
      write!(f, "{}={}", k, v)?;
    }
    write!(f, "}} {}", self.value)
  }
}

// ---------------------------------------------------------------------------
// Run bookkeeping
// ---------------------------------------------------------------------------

/// Counters reported once the input stream ends.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
  pub lines: u64,
  pub decode_errors: u64,
  pub unrecognized: u64,
  pub events: u64,
  pub metrics_emitted: u64,
  pub publish_failures: u64,
  /// Set when reading the input failed and the stream ended early.
  pub read_error: Option<String>,
}
