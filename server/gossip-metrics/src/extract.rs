//! Classify decoded log records into protocol events.
//!
//! The extractor never fails: a record that is missing a field, carries an
//! unparseable timestamp, or matches no rule becomes `ProtocolEvent::Unrecognized`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::Value;

use crate::types::{EventInfo, EventKind, ProtocolEvent};

/// Bumped whenever a rule is added, removed, or reordered.
pub const RULE_TABLE_VERSION: u32 = 1;

/// Substring rules over `fields.message`, checked in order; first match wins.
pub const RULES: &[(&str, EventKind)] = &[
  ("Message already received", EventKind::DuplicateReceived),
  ("Put message in duplicate_cache", EventKind::DeliveryObserved),
  ("Published message", EventKind::Published),
];

/// Classify the free-text message. `None` when no rule matches.
pub fn classify(message: &str) -> Option<EventKind> {
  RULES
    .iter()
    .find(|(pattern, _)| message.contains(pattern))
    .map(|(_, kind)| *kind)
}

/// Turn one decoded record into exactly one event.
pub fn extract(record: &Value) -> ProtocolEvent {
  let fields = record.get("fields");

  let kind = match fields
    .and_then(|f| f.get("message"))
    .and_then(Value::as_str)
    .and_then(classify)
  {
    Some(k) => k,
    None => return ProtocolEvent::Unrecognized,
  };

  let timestamp = match record
    .get("timestamp")
    .and_then(Value::as_str)
    .and_then(parse_timestamp)
  {
    Some(ts) => ts,
    None => return ProtocolEvent::Unrecognized,
  };

  let node_id = match node_id(record) {
    Some(id) => id,
    None => return ProtocolEvent::Unrecognized,
  };

  let message_id = match fields.and_then(|f| f.get("message_id")).and_then(message_id) {
    Some(id) => id,
    None => return ProtocolEvent::Unrecognized,
  };

  ProtocolEvent::new(
    kind,
    EventInfo {
      message_id,
      node_id,
      timestamp,
    },
  )
}

/// Parse an ISO-8601 timestamp. A trailing `Z` is UTC; a missing offset is
/// also read as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
  let raw = raw.trim();
  if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
    return Some(ts.with_timezone(&Utc));
  }
  NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
    .ok()
    .map(|naive| naive.and_utc())
}

/// First span carrying `node_id` wins. No such span means node 0. Integral
/// numbers (`-1`, `3.0`) and decimal strings are accepted; anything else makes
/// the record unusable (`None`).
fn node_id(record: &Value) -> Option<i64> {
  let spans = match record.get("spans").and_then(Value::as_array) {
    Some(s) => s,
    None => return Some(0),
  };

  match spans.iter().find_map(|span| span.get("node_id")) {
    Some(Value::Number(n)) => n.as_i64().or_else(|| {
      n.as_f64()
        .filter(|f| f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64)
        .map(|f| f as i64)
    }),
    Some(Value::String(s)) => s.trim().parse().ok(),
    Some(_) => None,
    None => Some(0),
  }
}

/// Strings as-is, numbers as their decimal text. Empty counts as absent.
fn message_id(value: &Value) -> Option<String> {
  let id = match value {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    _ => return None,
  };
  if id.is_empty() {
    None
  } else {
    Some(id)
  }
}
