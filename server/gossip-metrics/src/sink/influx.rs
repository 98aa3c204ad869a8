//! Write records as time-series points through the line-protocol HTTP API.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::AUTHORIZATION;
use tracing::{debug, info};

use super::MetricSink;
use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::types::*;

/// Measurement a metric is stored under. Unknown names pass through.
pub fn measurement_for(metric: &str) -> &str {
  match metric {
    PUBLISHED_MESSAGE_EVENT => "published_message_events",
    DUPLICATE_MESSAGE_EVENT => "duplicate_message_events",
    MESSAGE_DELIVERY_TIME => "message_delivery_times",
    other => other,
  }
}

/// A structured point: `{measurement, tags, time, fields}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InfluxPoint {
  pub measurement: String,
  pub tags: BTreeMap<String, String>,
  pub time: DateTime<Utc>,
  pub fields: BTreeMap<String, f64>,
}

impl InfluxPoint {
  /// Label `node` becomes tag `node_id`; other labels keep their names.
  pub fn from_record(record: &MetricRecord) -> Self {
    let tags = record
      .labels
      .iter()
      .map(|(k, v)| {
        let key = if k == "node" { "node_id" } else { k.as_str() };
        (key.to_string(), v.clone())
      })
      .collect();

    let mut fields = BTreeMap::new();
    fields.insert("value".to_string(), record.value);

    Self {
      measurement: measurement_for(&record.name).to_string(),
      tags,
      time: record.timestamp,
      fields,
    }
  }

  /// Render as one line of line protocol with a nanosecond timestamp.
  pub fn to_line_protocol(&self) -> Result<String, SinkError> {
    let nanos = self.time.timestamp_nanos_opt().ok_or_else(|| {
      SinkError::Encode(format!("timestamp {} outside nanosecond range", self.time))
    })?;

    let mut line = escape(&self.measurement, &[',', ' ']);
    for (k, v) in &self.tags {
      // Line protocol has no empty tag values.
      if v.is_empty() {
        continue;
      }
      line.push(',');
      line.push_str(&escape(k, &[',', '=', ' ']));
      line.push('=');
      line.push_str(&escape(v, &[',', '=', ' ']));
    }

    let fields: Vec<String> = self
      .fields
      .iter()
      .map(|(k, v)| format!("{}={}", escape(k, &[',', '=', ' ']), v))
      .collect();
    if fields.is_empty() {
      return Err(SinkError::Encode(format!("point {} has no fields", self.measurement)));
    }

    line.push(' ');
    line.push_str(&fields.join(","));
    line.push(' ');
    line.push_str(&nanos.to_string());
    Ok(line)
  }
}

fn escape(s: &str, special: &[char]) -> String {
  let mut out = String::with_capacity(s.len());
  for ch in s.chars() {
    if ch == '\\' || special.contains(&ch) {
      out.push('\\');
    }
    out.push(ch);
  }
  out
}

pub struct InfluxSink {
  client: Client,
  write_url: String,
  database: String,
  token: Option<String>,
}

impl InfluxSink {
  /// Build the client and check `/health` under the init retry policy.
  pub fn connect(config: &SinkConfig) -> Result<Self, SinkError> {
    let client = Client::builder().timeout(config.request_timeout.0).build()?;
    let host = config.influx_host.trim_end_matches('/');
    let token = config.influx_token.clone().filter(|t| !t.is_empty());

    let health_url = format!("{}/health", host);
    config.init_retry().connect("influx health check", || {
      let resp = authorize(client.get(&health_url), token.as_deref()).send()?;
      if resp.status().is_success() {
        Ok(())
      } else {
        Err(SinkError::status(resp.status().as_u16(), &health_url, ""))
      }
    })?;

    info!(host = %host, database = %config.influx_database, "init db connection");
    Ok(Self {
      client,
      write_url: format!("{}/api/v3/write_lp", host),
      database: config.influx_database.clone(),
      token,
    })
  }
}

impl MetricSink for InfluxSink {
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError> {
    let point = InfluxPoint::from_record(&record);
    let line = point.to_line_protocol()?;
    debug!(measurement = %point.measurement, "writing point");

    let req = self
      .client
      .post(&self.write_url)
      .query(&[("db", self.database.as_str()), ("precision", "nanosecond")])
      .body(line);
    let resp = authorize(req, self.token.as_deref()).send()?;

    let status = resp.status();
    if status.is_success() {
      Ok(())
    } else {
      let body = resp.text().unwrap_or_default();
      Err(SinkError::status(status.as_u16(), &self.write_url, body))
    }
  }
}

fn authorize(req: RequestBuilder, token: Option<&str>) -> RequestBuilder {
  match token {
    Some(t) => req.header(AUTHORIZATION, format!("Bearer {}", t)),
    None => req,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{EnvMsDuration, SinkKind};
  use chrono::TimeZone;
  use httpmock::{Method, MockServer};
  use std::time::Duration;

  fn record() -> MetricRecord {
    MetricRecord::new(
      DUPLICATE_MESSAGE_EVENT,
      2.0,
      Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
    )
    .with_label("node", "5")
    .with_label("event", "received")
    .with_label("msg_id", "m 1")
  }

  fn config(host: String, token: Option<&str>) -> SinkConfig {
    SinkConfig {
      kind: SinkKind::Influx,
      influx_host: host,
      influx_database: "metric_db".into(),
      influx_token: token.map(str::to_string),
      init_attempts: 3,
      init_delay: EnvMsDuration(Duration::ZERO),
      ..SinkConfig::default()
    }
  }

  #[test]
  fn measurement_mapping() {
    assert_eq!(measurement_for(PUBLISHED_MESSAGE_EVENT), "published_message_events");
    assert_eq!(measurement_for(DUPLICATE_MESSAGE_EVENT), "duplicate_message_events");
    assert_eq!(measurement_for(MESSAGE_DELIVERY_TIME), "message_delivery_times");
    assert_eq!(measurement_for(MESSAGE_DISSEMINATION_RATE), MESSAGE_DISSEMINATION_RATE);
  }

  #[test]
  fn point_uses_node_id_tag() {
    let point = InfluxPoint::from_record(&record());
    assert_eq!(point.measurement, "duplicate_message_events");
    assert_eq!(point.tags.get("node_id").map(String::as_str), Some("5"));
    assert_eq!(point.tags.get("msg_id").map(String::as_str), Some("m 1"));
    assert_eq!(point.fields.get("value"), Some(&2.0));
  }

  #[test]
  fn line_protocol_escapes_and_stamps_nanos() {
    let line = InfluxPoint::from_record(&record()).to_line_protocol().unwrap();
    assert_eq!(
      line,
      "duplicate_message_events,event=received,msg_id=m\\ 1,node_id=5 value=2 1736935200000000000"
    );
  }

  #[test]
  fn empty_tags_are_dropped() {
    let r = MetricRecord::new("x", 1.5, Utc.timestamp_opt(1, 0).unwrap()).with_label("event", "");
    let line = InfluxPoint::from_record(&r).to_line_protocol().unwrap();
    assert_eq!(line, "x value=1.5 1000000000");
  }

  #[test]
  fn writes_with_bearer_token() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(Method::GET).path("/health");
      then.status(200);
    });
    let write = server.mock(|when, then| {
      when
        .method(Method::POST)
        .path("/api/v3/write_lp")
        .query_param("db", "metric_db")
        .query_param("precision", "nanosecond")
        .header("authorization", "Bearer secret")
        .body_contains("duplicate_message_events,");
      then.status(204);
    });

    let mut sink = InfluxSink::connect(&config(server.base_url(), Some("secret"))).unwrap();
    sink.publish(record()).unwrap();
    write.assert();
  }

  #[test]
  fn health_failures_exhaust_init_retries() {
    let server = MockServer::start();
    let health = server.mock(|when, then| {
      when.method(Method::GET).path("/health");
      then.status(500);
    });

    let err = InfluxSink::connect(&config(server.base_url(), None)).err().unwrap();
    assert!(err.is_init());
    health.assert_hits(3);
  }
}
