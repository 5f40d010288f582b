//! The [`CheckpointSaver`] trait — the storage abstraction the dialogue
//! runtime is built against.
//!
//! Concrete backends (in-memory, embedded SQLite, or a caller-supplied
//! server-backed implementation) all conform to this trait. The runtime
//! never matches on a concrete backend type; it only ever holds an
//! `Arc<dyn CheckpointSaver>`.
//!
//! The trait is intentionally narrow: it requires exactly `load`, `save`,
//! `delete`, plus atomicity-per-key. `list_recent` is an inspection-only
//! addition (§10) with a default no-op implementation so that minimal
//! backends are not forced to support it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Metadata about a stored checkpoint, returned by [`CheckpointSaver::list_recent`].
///
/// This is inspection-only: no flow-execution invariant depends on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub user_key: String,
    pub saved_at: DateTime<Utc>,
    pub turn_id: Option<String>,
}

/// Storage contract for persisting and restoring [`DialogueState`](dialogue state)
/// snapshots keyed by user identity.
///
/// Implementations must guarantee that [`save`](Self::save) is atomic per
/// `user_key`: a concurrent `load` for the same key observes either the
/// state before or after the write, never a partial write. The runtime does
/// not acquire cross-user locks; per-user turn serialization is the
/// caller's responsibility.
///
/// State is carried as an opaque `serde_json::Value` rather than a concrete
/// `DialogueState` type so that this crate has no dependency on
/// `dialogue-core`: a generic channel-value store underneath the typed
/// graph state built on top of it.
#[async_trait]
pub trait CheckpointSaver: Send + Sync {
    /// Load the most recent checkpoint for `user_key`, or `None` if this is
    /// a first turn for that key.
    async fn load(&self, user_key: &str) -> Result<Option<Value>>;

    /// Persist `state` as the new checkpoint for `user_key`, replacing any
    /// prior checkpoint for that key.
    async fn save(&self, user_key: &str, state: Value) -> Result<()>;

    /// Delete any checkpoint stored for `user_key`. Deleting a key with no
    /// checkpoint is not an error.
    async fn delete(&self, user_key: &str) -> Result<()>;

    /// List recent checkpoint metadata for `user_key`, most recent first.
    /// Backends that do not retain history may return a single entry (the
    /// current checkpoint) or an empty vector.
    async fn list_recent(&self, _user_key: &str, _limit: usize) -> Result<Vec<CheckpointMetadata>> {
        Ok(Vec::new())
    }
}
