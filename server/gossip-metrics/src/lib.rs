//! Gossip propagation metrics engine — deterministic, rule-based.
//!
//! Ingests structured simulation log records, classifies publish / duplicate /
//! delivery events, correlates them over bounded LRU state keyed by message id,
//! and derives duplicate counts and delivery latency for a metrics sink.
//!
//! No global state: one `Engine` owns the correlation store for a whole run.

pub mod config;
pub mod derive;
pub mod engine;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod sink;
pub mod store;
pub mod types;

pub use config::Config;
pub use engine::Engine;
pub use error::{ConfigError, SinkError};
pub use sink::MetricSink;
pub use store::CorrelationStore;
pub use types::{MetricRecord, ProtocolEvent, RunSummary};
