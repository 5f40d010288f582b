//! The serving-layer-facing crate: config schema and validation,
//! telemetry setup, turn metrics, and the `Runtime` wrapper around
//! `dialogue-core::Orchestrator`.
//!
//! Parsing format, authentication, rate limiting, and the HTTP/streaming
//! surface itself are all out of scope — this crate stops
//! at `process_message`/`reset_state`/`get_state`.

pub mod config;
pub mod error;
pub mod loader;
pub mod metrics;
pub mod runtime;
pub mod telemetry;

pub use config::{ActionConfig, Config, LimitsSettings, NluSettings, PersistenceBackend, PersistenceSettings, Settings, SlotConfig, SlotType};
pub use error::{ConfigError, Result, RuntimeError};
pub use loader::ConfigLoader;
pub use metrics::{Metrics, MetricsSnapshot};
pub use runtime::Runtime;
