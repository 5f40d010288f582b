//! In-memory checkpoint backend, used for tests and single-process demos.
//!
//! A `tokio::sync::RwLock` guarding a `HashMap` keyed by the checkpoint key,
//! with a small ring of recent metadata kept alongside for `list_recent`.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::traits::{CheckpointMetadata, CheckpointSaver};

#[derive(Debug, Clone)]
struct Entry {
    state: Value,
    meta: CheckpointMetadata,
}

/// A [`CheckpointSaver`] backed by an in-process `HashMap`.
///
/// Checkpoints do not survive process restart. This is the default backend
/// for `settings.persistence.backend = memory` and the backend this
/// crate's integration tests use.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCheckpointSaver {
    inner: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCheckpointSaver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct user keys currently checkpointed.
    pub async fn key_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Remove all stored checkpoints. Intended for test teardown.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl CheckpointSaver for InMemoryCheckpointSaver {
    async fn load(&self, user_key: &str) -> Result<Option<Value>> {
        Ok(self.inner.read().await.get(user_key).map(|e| e.state.clone()))
    }

    async fn save(&self, user_key: &str, state: Value) -> Result<()> {
        let turn_id = state
            .get("turn_id")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let entry = Entry {
            state,
            meta: CheckpointMetadata {
                user_key: user_key.to_string(),
                saved_at: Utc::now(),
                turn_id,
            },
        };
        self.inner.write().await.insert(user_key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, user_key: &str) -> Result<()> {
        self.inner.write().await.remove(user_key);
        Ok(())
    }

    async fn list_recent(&self, user_key: &str, limit: usize) -> Result<Vec<CheckpointMetadata>> {
        let guard = self.inner.read().await;
        Ok(guard
            .get(user_key)
            .map(|e| vec![e.meta.clone()])
            .unwrap_or_default()
            .into_iter()
            .take(limit.max(1))
            .collect())
    }
}
