//! The compiled subgraph runtime: drives a compiled
//! flow's nodes via its routing edges until a step requires input or the
//! flow has nothing left to do.
//!
//! A [`CompiledSubgraph`] carries no checkpoint of its own — `execute_flow`
//! invokes it fresh every turn, and idempotency is the individual node
//! factories' job (`node_factories`). This module only owns the walk:
//! start at the entry node, follow [`RoutingEdge`]s, stop at `__end_flow__`
//! or the first [`NodeOutcome::Pending`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::action::ActionInvoker;
use crate::command::Command;
use crate::compiler::{compile, RoutingEdge, END_FLOW};
use crate::config::FlowConfig;
use crate::error::ExecutionError;
use crate::node_factories::{CompiledNode, NodeContext, NodeOutcome};
use crate::state::PendingTask;

/// A runaway-loop backstop for one subgraph invocation, distinct from
/// execute-flow's outer `subgraph_iteration_limit`: a
/// single `while` loop can visit many nodes without ever suspending, and
/// needs its own bound so a flow author's infinite loop cannot hang a turn.
pub const MAX_SUBGRAPH_STEPS: usize = 1000;

/// What one [`invoke`] call produced.
#[derive(Debug, Clone, Default)]
pub struct SubgraphResult {
    pub slot_writes: HashMap<String, Value>,
    pub newly_executed: HashSet<String>,
    pub responses: Vec<String>,
    pub pending_task: Option<PendingTask>,
    /// Set when an `action` handler failed or timed out: execute-flow transitions the flow to `ERROR` and pops it.
    pub error: Option<String>,
}

/// One compiled flow, ready to be invoked repeatedly against fresh state
/// projections.
pub struct CompiledSubgraph {
    entry: String,
    nodes: HashMap<String, CompiledNode>,
    edges: HashMap<String, RoutingEdge>,
}

impl CompiledSubgraph {
    /// Walk from the entry node, following routing edges, until a node
    /// returns [`NodeOutcome::Pending`], [`NodeOutcome::ActionFailed`], or
    /// control reaches `__end_flow__`.
    pub async fn invoke(
        &self,
        flow_id: &str,
        mut slots: HashMap<String, Value>,
        commands: &[Command],
        mut executed: HashSet<String>,
        actions: Arc<dyn ActionInvoker>,
        action_timeout: Duration,
    ) -> SubgraphResult {
        let mut result = SubgraphResult::default();
        let mut current = self.entry.clone();
        let mut steps_taken = 0usize;

        loop {
            if current == END_FLOW {
                return result;
            }
            steps_taken += 1;
            if steps_taken > MAX_SUBGRAPH_STEPS {
                result.error = Some(format!(
                    "flow exceeded the per-invocation step limit ({MAX_SUBGRAPH_STEPS}); likely an unbounded while loop"
                ));
                return result;
            }

            let node = match self.nodes.get(&current) {
                Some(n) => n,
                None => {
                    result.error = Some(format!("no compiled node named '{current}'"));
                    return result;
                }
            };

            let ctx = NodeContext {
                flow_id: flow_id.to_string(),
                slots: slots.clone(),
                commands: commands.to_vec(),
                executed_steps: executed.clone(),
                actions: actions.clone(),
                action_timeout,
            };

            tracing::debug!(flow_id, step = %current, iteration = steps_taken, "subgraph step");

            match (node.executor)(ctx).await {
                NodeOutcome::PassThrough { slot_writes, newly_executed } => {
                    for (k, v) in slot_writes {
                        slots.insert(k.clone(), v.clone());
                        result.slot_writes.insert(k, v);
                    }
                    if newly_executed {
                        executed.insert(current.clone());
                        result.newly_executed.insert(current.clone());
                    }
                    current = self.next_after(&current, &slots);
                }
                NodeOutcome::Say { text, newly_executed } => {
                    result.responses.push(text);
                    if newly_executed {
                        executed.insert(current.clone());
                        result.newly_executed.insert(current.clone());
                    }
                    current = self.next_after(&current, &slots);
                }
                NodeOutcome::BranchTo(target) => {
                    current = target;
                }
                NodeOutcome::Pending(task) => {
                    result.pending_task = Some(task);
                    return result;
                }
                NodeOutcome::ActionFailed { message } => {
                    tracing::error!(flow_id, step = %current, error = %message, "action step failed");
                    result.error = Some(message);
                    return result;
                }
            }
        }
    }

    /// Resolve the textual/`jump_to` successor of a non-branch node. Branch
    /// nodes never reach here — they route via [`NodeOutcome::BranchTo`].
    fn next_after(&self, step: &str, _slots: &HashMap<String, Value>) -> String {
        match self.edges.get(step) {
            Some(RoutingEdge::Direct(target)) => target.clone(),
            Some(RoutingEdge::Conditional { .. }) => {
                unreachable!("conditional edges are resolved by the branch node's own evaluation")
            }
            None => END_FLOW.to_string(),
        }
    }
}

/// The immutable, startup-built table of compiled flows.
pub struct SubgraphRegistry {
    subgraphs: HashMap<String, CompiledSubgraph>,
}

impl SubgraphRegistry {
    /// Compile every flow in `flows`, failing fast on the first
    /// [`CompilationError`].
    pub fn build(flows: &HashMap<String, FlowConfig>) -> Result<Self, ExecutionError> {
        let mut subgraphs = HashMap::new();
        for (name, flow) in flows {
            let compiled = compile(flow)?;
            subgraphs.insert(
                name.clone(),
                CompiledSubgraph { entry: compiled.entry, nodes: compiled.nodes, edges: compiled.edges },
            );
        }
        Ok(Self { subgraphs })
    }

    pub fn get(&self, flow_name: &str) -> Option<&CompiledSubgraph> {
        self.subgraphs.get(flow_name)
    }

    pub fn contains(&self, flow_name: &str) -> bool {
        self.subgraphs.contains_key(flow_name)
    }

    pub fn flow_names(&self) -> impl Iterator<Item = &str> {
        self.subgraphs.keys().map(|s| s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionInvoker;
    use crate::config::StepConfig;
    use async_trait::async_trait;
    use serde_json::json;

    struct NoopActions;
    #[async_trait]
    impl ActionInvoker for NoopActions {
        async fn invoke(
            &self,
            _name: &str,
            _inputs: HashMap<String, Value>,
            _timeout: Duration,
        ) -> Result<HashMap<String, Value>, crate::error::ActionError> {
            Ok(HashMap::new())
        }
        fn contains(&self, _name: &str) -> bool {
            true
        }
    }

    fn actions() -> Arc<dyn ActionInvoker> {
        Arc::new(NoopActions)
    }

    fn flow_with(steps: Vec<StepConfig>) -> FlowConfig {
        FlowConfig { name: "f".into(), description: "".into(), steps }
    }

    #[tokio::test]
    async fn walks_a_linear_collect_flow_to_completion_once_slots_present() {
        let flow = flow_with(vec![
            StepConfig::Collect { step: "a".into(), slot: "origin".into(), prompt: "?".into(), validator: None, options: None, jump_to: None },
            StepConfig::Say { step: "b".into(), message: "got {origin}".into(), jump_to: None },
        ]);
        let mut registry = HashMap::new();
        registry.insert("f".to_string(), flow);
        let built = SubgraphRegistry::build(&registry).unwrap();
        let sub = built.get("f").unwrap();

        let slots = HashMap::from([("origin".to_string(), json!("NYC"))]);
        let result = sub.invoke("f-1", slots, &[], HashSet::new(), actions(), Duration::from_secs(1)).await;
        assert_eq!(result.responses, vec!["got NYC".to_string()]);
        assert!(result.pending_task.is_none());
    }

    #[tokio::test]
    async fn pauses_on_collect_when_slot_missing() {
        let flow = flow_with(vec![StepConfig::Collect {
            step: "a".into(),
            slot: "origin".into(),
            prompt: "where from?".into(),
            validator: None,
            options: None,
            jump_to: None,
        }]);
        let mut registry = HashMap::new();
        registry.insert("f".to_string(), flow);
        let built = SubgraphRegistry::build(&registry).unwrap();
        let sub = built.get("f").unwrap();

        let result = sub.invoke("f-1", HashMap::new(), &[], HashSet::new(), actions(), Duration::from_secs(1)).await;
        assert!(matches!(result.pending_task, Some(PendingTask::Collect { .. })));
    }

    struct DecrementAction;
    #[async_trait]
    impl ActionInvoker for DecrementAction {
        async fn invoke(
            &self,
            _name: &str,
            inputs: HashMap<String, Value>,
            _timeout: Duration,
        ) -> Result<HashMap<String, Value>, crate::error::ActionError> {
            let remaining = inputs.get("remaining").and_then(|v| v.as_i64()).unwrap_or(0);
            Ok(HashMap::from([("next".to_string(), json!(remaining - 1))]))
        }
        fn contains(&self, _name: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn while_loop_body_action_is_loop_scoped_and_runs_every_iteration() {
        let flow = flow_with(vec![
            StepConfig::Set { step: "init".into(), slot: "remaining".into(), value: json!(3), jump_to: None },
            StepConfig::While {
                step: "loop".into(),
                condition: "$remaining > 0".into(),
                body: vec![StepConfig::Action {
                    step: "decrement".into(),
                    call: "decrement".into(),
                    inputs: vec!["remaining".to_string()],
                    map_outputs: HashMap::from([("next".to_string(), "remaining".to_string())]),
                    jump_to: None,
                }],
            },
        ]);
        let mut registry = HashMap::new();
        registry.insert("f".to_string(), flow);
        let built = SubgraphRegistry::build(&registry).unwrap();
        let sub = built.get("f").unwrap();

        let result = sub
            .invoke("f-1", HashMap::new(), &[], HashSet::new(), Arc::new(DecrementAction), Duration::from_secs(1))
            .await;
        assert!(result.error.is_none(), "loop should terminate, got error: {:?}", result.error);
        assert_eq!(result.slot_writes.get("remaining"), Some(&json!(0)));
    }

    #[tokio::test]
    async fn non_loop_action_step_is_idempotency_guarded_across_reinvocation() {
        let flow = flow_with(vec![StepConfig::Action {
            step: "charge".into(),
            call: "decrement".into(),
            inputs: vec!["remaining".to_string()],
            map_outputs: HashMap::from([("next".to_string(), "remaining".to_string())]),
            jump_to: None,
        }]);
        let mut registry = HashMap::new();
        registry.insert("f".to_string(), flow);
        let built = SubgraphRegistry::build(&registry).unwrap();
        let sub = built.get("f").unwrap();

        let already_executed = HashSet::from(["charge".to_string()]);
        let slots = HashMap::from([("remaining".to_string(), json!(5))]);
        let result = sub
            .invoke("f-1", slots, &[], already_executed, Arc::new(DecrementAction), Duration::from_secs(1))
            .await;
        assert!(result.slot_writes.is_empty(), "already-executed top-level action must not re-fire");
    }
}
