//! Engine and sink configuration, loaded from the environment with sane defaults.

use std::num::{NonZeroU64, NonZeroUsize};
use std::str::FromStr;
use std::time::Duration;

use envconfig::Envconfig;

use crate::error::ConfigError;
use crate::sink::RetryPolicy;

/// Tunables for correlation and emission.
#[derive(Envconfig, Debug, Clone)]
pub struct Config {
  /// Capacity of each correlation map (publish history, duplicate counts).
  #[envconfig(from = "CACHE_CAPACITY", default = "50")]
  pub cache_capacity: NonZeroUsize,

  /// Denominator of the dissemination rate.
  #[envconfig(from = "TOTAL_NODES", default = "100")]
  pub total_nodes: NonZeroU64,

  /// Depth of the emission queue in front of the sink. 0 = call the sink inline.
  #[envconfig(from = "EMIT_QUEUE_DEPTH", default = "0")]
  pub emit_queue_depth: usize,

  #[envconfig(nested = true)]
  pub sink: SinkConfig,
}

impl Config {
  /// Load from the environment and validate.
  pub fn from_env() -> Result<Self, ConfigError> {
    let config = Self::init_from_env()?;
    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.sink.init_attempts == 0 {
      return Err(ConfigError::validation("SINK_INIT_ATTEMPTS", "must be at least 1"));
    }
    if self.sink.publish_attempts == 0 {
      return Err(ConfigError::validation("SINK_PUBLISH_ATTEMPTS", "must be at least 1"));
    }
    Ok(())
  }
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cache_capacity: NonZeroUsize::new(50).unwrap_or(NonZeroUsize::MIN),
      total_nodes: NonZeroU64::new(100).unwrap_or(NonZeroU64::MIN),
      emit_queue_depth: 0,
      sink: SinkConfig::default(),
    }
  }
}

/// Backend selection and connection settings.
#[derive(Envconfig, Debug, Clone)]
pub struct SinkConfig {
  #[envconfig(from = "SINK_KIND", default = "stdout")]
  pub kind: SinkKind,

  #[envconfig(from = "PUSHGATEWAY_URL", default = "http://localhost:9091")]
  pub pushgateway_url: String,

  #[envconfig(from = "JOB_NAME", default = "gossip_metrics")]
  pub job_name: String,

  #[envconfig(from = "INFLUX_HOST", default = "http://localhost:8181")]
  pub influx_host: String,

  #[envconfig(from = "INFLUX_DATABASE", default = "metric_db")]
  pub influx_database: String,

  #[envconfig(from = "INFLUX_TOKEN")]
  pub influx_token: Option<String>,

  #[envconfig(from = "SINK_INIT_ATTEMPTS", default = "5")]
  pub init_attempts: u32,

  #[envconfig(from = "SINK_INIT_DELAY_MS", default = "2000")]
  pub init_delay: EnvMsDuration,

  #[envconfig(from = "SINK_PUBLISH_ATTEMPTS", default = "1")]
  pub publish_attempts: u32,

  #[envconfig(from = "SINK_TIMEOUT_MS", default = "5000")]
  pub request_timeout: EnvMsDuration,
}

impl SinkConfig {
  /// Policy used while establishing the backend connection.
  pub fn init_retry(&self) -> RetryPolicy {
    RetryPolicy::new(self.init_attempts, self.init_delay.0)
  }

  /// Policy used for each published metric. Reuses the init delay.
  pub fn publish_retry(&self) -> RetryPolicy {
    RetryPolicy::new(self.publish_attempts, self.init_delay.0)
  }
}

impl Default for SinkConfig {
  fn default() -> Self {
    Self {
      kind: SinkKind::Stdout,
      pushgateway_url: "http://localhost:9091".into(),
      job_name: "gossip_metrics".into(),
      influx_host: "http://localhost:8181".into(),
      influx_database: "metric_db".into(),
      influx_token: None,
      init_attempts: 5,
      init_delay: EnvMsDuration(Duration::from_secs(2)),
      publish_attempts: 1,
      request_timeout: EnvMsDuration(Duration::from_secs(5)),
    }
  }
}

/// Which backend receives metric records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
  Pushgateway,
  Influx,
  Stdout,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseSinkKindError(pub String);

impl FromStr for SinkKind {
  type Err = ParseSinkKindError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "pushgateway" | "prometheus" => Ok(Self::Pushgateway),
      "influx" | "influxdb" => Ok(Self::Influx),
      "stdout" => Ok(Self::Stdout),
      other => Err(ParseSinkKindError(other.to_string())),
    }
  }
}

/// Milliseconds from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvMsDuration(pub Duration);

#[derive(Debug, PartialEq, Eq)]
pub struct ParseEnvMsDurationError;

impl FromStr for EnvMsDuration {
  type Err = ParseEnvMsDurationError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let ms = s.parse::<u64>().map_err(|_| ParseEnvMsDurationError)?;
    Ok(EnvMsDuration(Duration::from_millis(ms)))
  }
}
