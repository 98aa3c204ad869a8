//! Push records to a Prometheus push gateway in text exposition format.

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, info};

use super::MetricSink;
use crate::config::SinkConfig;
use crate::error::SinkError;
use crate::types::MetricRecord;

const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

pub struct PushgatewaySink {
  client: Client,
  push_url: String,
}

impl PushgatewaySink {
  /// Build the client and wait for the gateway to report ready.
  pub fn connect(config: &SinkConfig) -> Result<Self, SinkError> {
    let client = Client::builder().timeout(config.request_timeout.0).build()?;
    let base = config.pushgateway_url.trim_end_matches('/');
    let ready_url = format!("{}/-/ready", base);

    config.init_retry().connect("pushgateway readiness check", || {
      let resp = client.get(&ready_url).send()?;
      if resp.status().is_success() {
        Ok(())
      } else {
        Err(SinkError::status(resp.status().as_u16(), &ready_url, ""))
      }
    })?;

    let push_url = format!("{}/metrics/job/{}", base, config.job_name);
    info!(url = %push_url, "connected to push gateway");
    Ok(Self { client, push_url })
  }
}

impl MetricSink for PushgatewaySink {
  fn publish(&mut self, record: MetricRecord) -> Result<(), SinkError> {
    let body = render_exposition(&record);
    debug!(metric = %record.name, "pushing metric");

    let resp = self
      .client
      .post(&self.push_url)
      .header(CONTENT_TYPE, EXPOSITION_CONTENT_TYPE)
      .body(body)
      .send()?;

    let status = resp.status();
    if status.is_success() {
      Ok(())
    } else {
      let body = resp.text().unwrap_or_default();
      Err(SinkError::status(status.as_u16(), &self.push_url, body))
    }
  }
}

/// `# TYPE <name> gauge` followed by one sample line.
pub fn render_exposition(record: &MetricRecord) -> String {
  let labels: Vec<String> = record
    .labels
    .iter()
    .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
    .collect();

  let mut out = format!("# TYPE {} gauge\n{}", record.name, record.name);
  if !labels.is_empty() {
    out.push('{');
    out.push_str(&labels.join(","));
    out.push('}');
  }
  out.push(' ');
  out.push_str(&format_value(record.value));
  out.push('\n');
  out
}

fn escape_label_value(v: &str) -> String {
  let mut out = String::with_capacity(v.len());
  for ch in v.chars() {
    match ch {
      '\\' => out.push_str("\\\\"),
      '"' => out.push_str("\\\""),
      '\n' => out.push_str("\\n"),
      c => out.push(c),
    }
  }
  out
}

fn format_value(v: f64) -> String {
  if v.is_nan() {
    "NaN".into()
  } else if v.is_infinite() {
    if v > 0.0 { "+Inf".into() } else { "-Inf".into() }
  } else {
    v.to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EnvMsDuration;
  use chrono::{TimeZone, Utc};
  use httpmock::{Method, MockServer};
  use std::time::Duration;

  fn record() -> MetricRecord {
    MetricRecord::new(
      "message_delivery_time",
      250.0,
      Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap(),
    )
    .with_label("node", "3")
    .with_label("event", "received")
    .with_label("msg_id", "m1")
  }

  fn config(url: String) -> SinkConfig {
    SinkConfig {
      pushgateway_url: url,
      job_name: "gossip".into(),
      init_attempts: 2,
      init_delay: EnvMsDuration(Duration::ZERO),
      ..SinkConfig::default()
    }
  }

  #[test]
  fn renders_exposition_body() {
    assert_eq!(
      render_exposition(&record()),
      "# TYPE message_delivery_time gauge\n\
       message_delivery_time{event=\"received\",msg_id=\"m1\",node=\"3\"} 250\n"
    );
  }

  #[test]
  fn escapes_label_values() {
    let r = MetricRecord::new("m", 0.5, Utc::now()).with_label("msg_id", "a\"b\\c\nd");
    assert_eq!(
      render_exposition(&r),
      "# TYPE m gauge\nm{msg_id=\"a\\\"b\\\\c\\nd\"} 0.5\n"
    );
  }

  #[test]
  fn non_finite_values() {
    assert_eq!(format_value(f64::NAN), "NaN");
    assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
  }

  #[test]
  fn posts_to_job_endpoint() {
    let server = MockServer::start();
    let ready = server.mock(|when, then| {
      when.method(Method::GET).path("/-/ready");
      then.status(200);
    });
    let push = server.mock(|when, then| {
      when
        .method(Method::POST)
        .path("/metrics/job/gossip")
        .body_contains("message_delivery_time{event=\"received\",msg_id=\"m1\",node=\"3\"} 250");
      then.status(200);
    });

    let mut sink = PushgatewaySink::connect(&config(server.base_url())).unwrap();
    sink.publish(record()).unwrap();

    ready.assert();
    push.assert();
  }

  #[test]
  fn non_success_status_is_an_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
      when.method(Method::GET).path("/-/ready");
      then.status(200);
    });
    server.mock(|when, then| {
      when.method(Method::POST);
      then.status(400).body("bad metric");
    });

    let mut sink = PushgatewaySink::connect(&config(server.base_url())).unwrap();
    match sink.publish(record()) {
      Err(SinkError::Status { status, body, .. }) => {
        assert_eq!(status, 400);
        assert_eq!(body, "bad metric");
      }
      other => panic!("expected status error, got {:?}", other),
    }
  }

  #[test]
  fn unready_gateway_fails_init_after_retries() {
    let server = MockServer::start();
    let ready = server.mock(|when, then| {
      when.method(Method::GET).path("/-/ready");
      then.status(503);
    });

    let err = PushgatewaySink::connect(&config(server.base_url())).err().unwrap();
    assert!(err.is_init());
    ready.assert_hits(2);
  }
}
