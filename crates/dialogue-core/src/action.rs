//! The action handler contract.
//!
//! Action handler *implementations* are out of scope for this crate:
//! this module defines only the narrow interface an `action` step node
//! invokes against, and the at-most-once execution guarantee the
//! idempotency guard in `dialogue-core::node_factories` builds on top of
//! it. `dialogue-actions` provides a concrete registry.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ActionError;

/// Default per-call action timeout: 30 seconds.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Resolves an action name to a callable handler and invokes it with a
/// bounded timeout.
///
/// Implementations are responsible for action-level idempotency if the
/// same `(flow_id, step_name)` is retried after a crash — the compiled
/// subgraph's `executed_steps` guard already prevents *that* step from
/// re-invoking the handler once it has recorded success, but a handler
/// whose side effect partially completed before a crash must guard itself.
#[async_trait]
pub trait ActionInvoker: Send + Sync {
    /// Invoke `name` with `inputs`, honoring `timeout`. Returns the
    /// handler's declared outputs as a map, keyed by the action's declared
    /// `outputs` names.
    async fn invoke(
        &self,
        name: &str,
        inputs: HashMap<String, Value>,
        timeout: Duration,
    ) -> Result<HashMap<String, Value>, ActionError>;

    /// Whether `name` is a registered action, for compile-time cross-
    /// reference validation.
    fn contains(&self, name: &str) -> bool;
}
