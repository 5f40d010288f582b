//! The serving-layer-facing `Runtime`: a thin
//! wrapper that validates a [`Config`], builds the `dialogue-core`
//! orchestrator from it plus caller-supplied collaborators, and exposes
//! `process_message`, `reset_state`, and `get_state`.

use std::sync::Arc;

use dialogue_checkpoint::CheckpointSaver;
use dialogue_core::{ActionInvoker, DialogueState, Limits, NluService, Orchestrator, SubgraphRegistry, TurnResult};

use crate::config::Config;
use crate::error::Result;
use crate::metrics::Metrics;

/// A validated, ready-to-serve runtime: flows compiled, collaborators
/// wired, limits applied from `Config.settings.limits`.
pub struct Runtime {
    orchestrator: Orchestrator,
    metrics: Arc<Metrics>,
}

impl Runtime {
    /// Validate `config`, compile every flow into the subgraph registry,
    /// and wire it to the given collaborators. Fails fast on the first
    /// configuration or compilation error.
    pub fn build(
        config: &Config,
        actions: Arc<dyn ActionInvoker>,
        nlu: Arc<dyn NluService>,
        checkpointer: Arc<dyn CheckpointSaver>,
    ) -> Result<Self> {
        config.validate()?;
        let subgraphs = SubgraphRegistry::build(&config.flows)?;
        let limits: Limits = config.settings.limits.to_core_limits();
        let metrics = Arc::new(Metrics::new());
        let orchestrator = Orchestrator::new(subgraphs, actions, nlu, checkpointer, limits).with_observer(metrics.clone());
        Ok(Self { orchestrator, metrics })
    }

    /// Advance the dialogue for `user_key` by one turn.
    pub async fn process_message(&self, user_key: &str, message: &str) -> Result<TurnResult> {
        self.metrics.record_turn();
        let result = self.orchestrator.process_message(user_key, message).await?;
        Ok(result)
    }

    /// Delete the persisted checkpoint for `user_key`.
    pub async fn reset_state(&self, user_key: &str) -> Result<()> {
        Ok(self.orchestrator.reset_state(user_key).await?)
    }

    /// Inspect the current state for `user_key`, without advancing it.
    pub async fn get_state(&self, user_key: &str) -> Result<DialogueState> {
        Ok(self.orchestrator.get_state(user_key).await?)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimitsSettings, Settings};
    use dialogue_core::config::{FlowConfig, StepConfig};
    use dialogue_core::{Command, MessageType, NLUOutput};
    use dialogue_checkpoint::InMemoryCheckpointSaver;
    use std::collections::HashMap;

    struct NoopActions;
    #[async_trait::async_trait]
    impl ActionInvoker for NoopActions {
        async fn invoke(
            &self,
            _name: &str,
            _inputs: HashMap<String, serde_json::Value>,
            _timeout: std::time::Duration,
        ) -> std::result::Result<HashMap<String, serde_json::Value>, dialogue_core::error::ActionError> {
            Ok(HashMap::new())
        }
        fn contains(&self, _name: &str) -> bool {
            true
        }
    }

    struct OneShotNlu;
    #[async_trait::async_trait]
    impl NluService for OneShotNlu {
        async fn interpret(
            &self,
            _user_message: &str,
            _context: &dialogue_core::DialogueContext,
        ) -> std::result::Result<NLUOutput, dialogue_core::error::NluError> {
            Ok(NLUOutput {
                commands: vec![Command::StartFlow { flow_name: "greet".into(), slots: None }],
                message_type: MessageType::FlowIntent,
                confidence: 1.0,
                reasoning: None,
            })
        }
    }

    fn config() -> Config {
        let flow = FlowConfig {
            name: "greet".into(),
            description: "".into(),
            steps: vec![StepConfig::Say { step: "hi".into(), message: "hello there".into(), jump_to: None }],
        };
        let mut flows = HashMap::new();
        flows.insert("greet".to_string(), flow);
        Config { flows, actions: HashMap::new(), slots: HashMap::new(), settings: Settings { limits: LimitsSettings::default(), ..Settings::default() } }
    }

    #[tokio::test]
    async fn build_rejects_an_invalid_config() {
        let bad = Config { flows: HashMap::new(), actions: HashMap::new(), slots: HashMap::new(), settings: Settings::default() };
        let result = Runtime::build(&bad, Arc::new(NoopActions), Arc::new(OneShotNlu), Arc::new(InMemoryCheckpointSaver::new()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn process_message_drives_a_full_turn_and_updates_metrics() {
        let runtime = Runtime::build(&config(), Arc::new(NoopActions), Arc::new(OneShotNlu), Arc::new(InMemoryCheckpointSaver::new())).unwrap();
        let result = runtime.process_message("user-1", "hi there").await.unwrap();
        assert!(!result.paused);
        assert_eq!(result.response, "hello there");
        let snapshot = runtime.metrics().snapshot();
        assert_eq!(snapshot.turns_processed, 1);
        assert_eq!(snapshot.flows_started, 1);
        assert_eq!(snapshot.flows_completed, 1);
    }

    #[tokio::test]
    async fn reset_state_clears_the_checkpoint() {
        let runtime = Runtime::build(&config(), Arc::new(NoopActions), Arc::new(OneShotNlu), Arc::new(InMemoryCheckpointSaver::new())).unwrap();
        runtime.process_message("user-1", "hi").await.unwrap();
        runtime.reset_state("user-1").await.unwrap();
        let state = runtime.get_state("user-1").await.unwrap();
        assert!(state.flow_stack.is_empty());
    }
}
