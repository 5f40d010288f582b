//! The runtime crate's error taxonomy: `ConfigError`
//! is this crate's own concern; `RuntimeError` is the umbrella a serving
//! layer built on top of `dialogue-runtime` matches on, composing every
//! lower crate's error type via `#[from]`.

use thiserror::Error;

/// Startup configuration problems:
/// collected as a batch, not reported one at a time, so a flow author sees
/// every problem in one pass.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config from '{path}': {source}")]
    Io { path: String, #[source] source: std::io::Error },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("config is invalid:\n{}", .0.join("\n"))]
    Invalid(Vec<String>),
}

/// The top-level error the `Runtime` API surfaces.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Execution(#[from] dialogue_core::ExecutionError),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
