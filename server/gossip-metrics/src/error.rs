//! Structured error types for the metrics engine and its sinks.

use thiserror::Error;

/// Failure talking to a metrics backend.
#[derive(Debug, Error)]
pub enum SinkError {
  #[error("sink init: backend unreachable after {attempts} attempts: {last}")]
  Init { attempts: u32, last: Box<SinkError> },

  #[error("http: {0}")]
  Http(#[from] reqwest::Error),

  #[error("status {status} from {url}: {body}")]
  Status { status: u16, url: String, body: String },

  #[error("io: {0}")]
  Io(#[from] std::io::Error),

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),

  #[error("encode: {0}")]
  Encode(String),

  #[error("sink closed: emitter is no longer running")]
  Closed,
}

impl SinkError {
  pub fn status(status: u16, url: &str, body: impl Into<String>) -> Self {
    Self::Status {
      status,
      url: url.to_string(),
      body: body.into(),
    }
  }

  pub fn is_init(&self) -> bool {
    matches!(self, Self::Init { .. })
  }
}

/// Invalid process configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("env: {0}")]
  Env(#[from] envconfig::Error),

  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },
}

impl ConfigError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }
}
