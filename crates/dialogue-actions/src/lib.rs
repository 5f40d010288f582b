//! A concrete, in-process [`ActionInvoker`] for the dialogue runtime.
//!
//! Implementing specific business actions (a real flight-search backend, a
//! payment gateway) is out of scope: only the handler contract is fixed —
//! `async (inputs: map) -> map`, registered by name. This crate provides
//! the registry and the timeout-wrapped dispatch around that contract,
//! plus a small `demo` module of toy handlers the CLI uses to exercise a
//! flow end to end.

pub mod demo;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::timeout as tokio_timeout;

use dialogue_core::action::ActionInvoker;
use dialogue_core::error::ActionError;

/// One registered action handler: takes the slot values named in the step's
/// `inputs`, returns the slot values named in the step's `map_outputs`.
pub type ActionHandler =
    Arc<dyn Fn(HashMap<String, Value>) -> BoxedActionFuture + Send + Sync>;

type BoxedActionFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<HashMap<String, Value>, String>> + Send>>;

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry").field("names", &self.handlers.keys().collect::<Vec<_>>()).finish()
    }
}

/// A named table of action handlers, built once at startup and shared
/// read-only across turns.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: HashMap<String, ActionHandler>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous-looking async closure under `name`. Panics if
    /// `name` is already registered — a duplicate registration is a startup
    /// configuration bug, not a runtime condition to recover from.
    pub fn register<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(HashMap<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<HashMap<String, Value>, String>> + Send + 'static,
    {
        let name = name.into();
        let wrapped: ActionHandler = Arc::new(move |inputs| Box::pin(handler(inputs)));
        if self.handlers.insert(name.clone(), wrapped).is_some() {
            panic!("action '{name}' registered twice");
        }
        self
    }
}

#[async_trait]
impl ActionInvoker for ActionRegistry {
    async fn invoke(
        &self,
        name: &str,
        inputs: HashMap<String, Value>,
        timeout: Duration,
    ) -> Result<HashMap<String, Value>, ActionError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ActionError::NotFound { name: name.to_string() })?
            .clone();

        tracing::debug!(action = name, timeout_secs = timeout.as_secs(), "invoking action");

        match tokio_timeout(timeout, handler(inputs)).await {
            Ok(Ok(outputs)) => Ok(outputs),
            Ok(Err(message)) => {
                tracing::error!(action = name, error = %message, "action handler failed");
                Err(ActionError::HandlerFailed { name: name.to_string(), message })
            }
            Err(_elapsed) => {
                tracing::error!(action = name, timeout_secs = timeout.as_secs(), "action timed out");
                Err(ActionError::Timeout { name: name.to_string(), timeout_secs: timeout.as_secs() })
            }
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn registry() -> ActionRegistry {
        ActionRegistry::new()
            .register("echo", |inputs| async move { Ok(inputs) })
            .register("fail", |_inputs| async move { Err("boom".to_string()) })
            .register("slow", |_inputs| async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok(HashMap::new())
            })
    }

    #[tokio::test]
    async fn invokes_registered_handler_and_returns_its_outputs() {
        let reg = registry();
        let inputs = HashMap::from([("x".to_string(), json!(1))]);
        let out = reg.invoke("echo", inputs.clone(), Duration::from_secs(1)).await.unwrap();
        assert_eq!(out, inputs);
    }

    #[tokio::test]
    async fn unknown_action_is_not_found() {
        let reg = registry();
        let err = reg.invoke("nope", HashMap::new(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ActionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn handler_error_is_propagated_as_handler_failed() {
        let reg = registry();
        let err = reg.invoke("fail", HashMap::new(), Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ActionError::HandlerFailed { .. }));
    }

    #[tokio::test]
    async fn slow_handler_past_timeout_errors_with_timeout() {
        let reg = registry();
        let err = reg.invoke("slow", HashMap::new(), Duration::from_millis(5)).await.unwrap_err();
        assert!(matches!(err, ActionError::Timeout { .. }));
    }

    #[tokio::test]
    async fn contains_reflects_registered_names() {
        let reg = registry();
        assert!(reg.contains("echo"));
        assert!(!reg.contains("nope"));
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn duplicate_registration_panics_at_build_time() {
        let _ = ActionRegistry::new()
            .register("dup", |_| async move { Ok(HashMap::new()) })
            .register("dup", |_| async move { Ok(HashMap::new()) });
    }
}
