//! Step node factories: one factory per step kind,
//! producing an async node function with signature
//! `(NodeContext) -> NodeOutcome`.
//!
//! Each factory closes over its static config and returns an `Arc<dyn
//! Fn(NodeContext) -> BoxFuture<NodeOutcome>>`, with a richer
//! [`NodeOutcome`] return type so the subgraph walker can tell a pass-
//! through apart from a pause, a branch, or an action failure without
//! re-parsing a JSON blob.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::action::ActionInvoker;
use crate::command::Command;
use crate::config::StepConfig;
use crate::expr;
use crate::state::PendingTask;

/// Everything a step node needs to read on one invocation. Owned rather
/// than borrowed so node closures can be `'static` `Arc<dyn Fn>` values.
#[derive(Clone)]
pub struct NodeContext {
    pub flow_id: String,
    pub slots: HashMap<String, Value>,
    pub commands: Vec<Command>,
    pub executed_steps: HashSet<String>,
    pub actions: Arc<dyn ActionInvoker>,
    pub action_timeout: Duration,
}

/// What a step node produced this invocation.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The step had nothing new to do (idempotency short-circuit) or
    /// completed with the given slot writes; routing advances to the
    /// textual/`jump_to` successor.
    PassThrough { slot_writes: HashMap<String, Value>, newly_executed: bool },
    /// The step requires the conversation to pause here.
    Pending(PendingTask),
    /// A `branch`/`while`-guard step selected its next node.
    BranchTo(String),
    /// An utterance produced for the user (say, or the generic failure
    /// message from an action error), to append to `pending_responses`.
    Say { text: String, newly_executed: bool },
    /// The action handler failed or timed out; the flow transitions to
    /// `ERROR` and is popped by execute-flow.
    ActionFailed { message: String },
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// The compiled form of a step node: a name, its originating config (kept
/// for introspection/visualization), and the async executor the factories
/// below produce.
pub struct CompiledNode {
    pub name: String,
    pub step: StepConfig,
    pub executor: Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync>,
}

fn find_set_slot<'a>(commands: &'a [Command], slot_name: &str) -> Option<&'a Value> {
    commands.iter().find_map(|c| match c {
        Command::SetSlot { slot_name: s, value } if s == slot_name => Some(value),
        _ => None,
    })
}

fn has_affirm(commands: &[Command]) -> bool {
    commands.iter().any(|c| matches!(c, Command::AffirmConfirmation))
}

fn has_deny(commands: &[Command]) -> bool {
    commands.iter().any(|c| matches!(c, Command::DenyConfirmation))
}

/// Build the `collect` node: a matching `SetSlot` command always takes
/// priority (it may be a correction to an already-filled slot), otherwise
/// pass through if the slot is already filled, otherwise pause with a
/// `CollectTask`.
pub fn make_collect(
    slot: String,
    prompt: String,
    validator: Option<String>,
    options: Option<Vec<String>>,
) -> Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync> {
    Arc::new(move |ctx: NodeContext| {
        let slot = slot.clone();
        let prompt = prompt.clone();
        let validator = validator.clone();
        let options = options.clone();
        Box::pin(async move {
            if let Some(value) = find_set_slot(&ctx.commands, &slot) {
                if let Some(validator_name) = &validator {
                    if !validate_slot(validator_name, value) {
                        return NodeOutcome::Pending(PendingTask::Collect {
                            prompt: format!("That doesn't look like a valid {slot}, please provide it again."),
                            slot_name: slot.clone(),
                            options: options.clone(),
                            metadata: None,
                        });
                    }
                }
                let mut writes = HashMap::new();
                writes.insert(slot.clone(), value.clone());
                return NodeOutcome::PassThrough { slot_writes: writes, newly_executed: false };
            }
            if ctx.slots.get(&slot).map(|v| !v.is_null()).unwrap_or(false) {
                return NodeOutcome::PassThrough { slot_writes: HashMap::new(), newly_executed: false };
            }
            NodeOutcome::Pending(PendingTask::Collect {
                prompt: expr::interpolate(&prompt, &ctx.slots),
                slot_name: slot.clone(),
                options: options.clone(),
                metadata: None,
            })
        })
    })
}

/// Validators are named, not arbitrary code: a small closed set covers the
/// common cases a flow author reaches for. Unknown validator names pass
/// everything (logged), rather than failing compilation — validators are
/// a runtime concern, already checked for existence against `Config.slots`
/// at compile time by the caller.
fn validate_slot(validator: &str, value: &Value) -> bool {
    match validator {
        "non_empty" => value.as_str().map(|s| !s.trim().is_empty()).unwrap_or(!value.is_null()),
        "number" => value.is_number() || value.as_str().map(|s| s.parse::<f64>().is_ok()).unwrap_or(false),
        "boolean" => value.is_boolean(),
        other => {
            tracing::warn!(validator = other, "unknown validator name; accepting value");
            true
        }
    }
}

/// Build the `confirm` node: an `Affirm`/`DenyConfirmation` command always
/// takes priority, otherwise pass through if the confirmation slot is
/// already set, otherwise pause with a `ConfirmTask`.
pub fn make_confirm(slot: String, prompt: String) -> Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync> {
    Arc::new(move |ctx: NodeContext| {
        let slot = slot.clone();
        let prompt = prompt.clone();
        Box::pin(async move {
            if has_affirm(&ctx.commands) {
                let mut writes = HashMap::new();
                writes.insert(slot.clone(), Value::Bool(true));
                return NodeOutcome::PassThrough { slot_writes: writes, newly_executed: false };
            }
            if has_deny(&ctx.commands) {
                let mut writes = HashMap::new();
                writes.insert(slot.clone(), Value::Bool(false));
                return NodeOutcome::PassThrough { slot_writes: writes, newly_executed: false };
            }
            if ctx.slots.get(&slot).map(|v| !v.is_null()).unwrap_or(false) {
                return NodeOutcome::PassThrough { slot_writes: HashMap::new(), newly_executed: false };
            }
            NodeOutcome::Pending(PendingTask::Confirm {
                prompt: expr::interpolate(&prompt, &ctx.slots),
                options: vec!["yes".to_string(), "no".to_string()],
                metadata: None,
            })
        })
    })
}

/// Build the `say` node: idempotency-guarded template interpolation.
///
/// `loop_scoped` is `true` for steps the compiler lifted out of a `while`
/// body: those must fire on every iteration, not just the first time the
/// step name is ever seen, so the `executed_steps` guard is bypassed for
/// them (see `compiler`'s while-desugaring doc comment).
pub fn make_say(step_name: String, message: String, loop_scoped: bool) -> Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync> {
    Arc::new(move |ctx: NodeContext| {
        let message = message.clone();
        let already = !loop_scoped && ctx.executed_steps.contains(&step_name);
        Box::pin(async move {
            if already {
                return NodeOutcome::PassThrough { slot_writes: HashMap::new(), newly_executed: false };
            }
            NodeOutcome::Say { text: expr::interpolate(&message, &ctx.slots), newly_executed: !loop_scoped }
        })
    })
}

/// Build the `set` node: idempotency-guarded slot assignment. `value` may be
/// a literal, or a `$slot` reference resolved against the current slots.
/// See [`make_say`] for `loop_scoped`.
pub fn make_set(step_name: String, slot: String, value: Value, loop_scoped: bool) -> Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync> {
    Arc::new(move |ctx: NodeContext| {
        let slot = slot.clone();
        let value = value.clone();
        let already = !loop_scoped && ctx.executed_steps.contains(&step_name);
        Box::pin(async move {
            if already {
                return NodeOutcome::PassThrough { slot_writes: HashMap::new(), newly_executed: false };
            }
            let resolved = match value.as_str() {
                Some(s) if s.starts_with('$') => expr::evaluate(s, &ctx.slots),
                _ => value.clone(),
            };
            let mut writes = HashMap::new();
            writes.insert(slot.clone(), resolved);
            NodeOutcome::PassThrough { slot_writes: writes, newly_executed: !loop_scoped }
        })
    })
}

/// Build the `action` node: idempotency-guarded handler invocation with
/// input slots resolved and outputs mapped back onto named slots. See
/// [`make_say`] for `loop_scoped`.
pub fn make_action(
    step_name: String,
    call: String,
    inputs: Vec<String>,
    map_outputs: HashMap<String, String>,
    loop_scoped: bool,
) -> Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync> {
    Arc::new(move |ctx: NodeContext| {
        let call = call.clone();
        let inputs = inputs.clone();
        let map_outputs = map_outputs.clone();
        let already = !loop_scoped && ctx.executed_steps.contains(&step_name);
        Box::pin(async move {
            if already {
                return NodeOutcome::PassThrough { slot_writes: HashMap::new(), newly_executed: false };
            }
            let mut args = HashMap::new();
            for name in &inputs {
                if let Some(v) = ctx.slots.get(name) {
                    args.insert(name.clone(), v.clone());
                }
            }
            match ctx.actions.invoke(&call, args, ctx.action_timeout).await {
                Ok(outputs) => {
                    let mut writes = HashMap::new();
                    for (output_name, slot_name) in &map_outputs {
                        if let Some(v) = outputs.get(output_name) {
                            writes.insert(slot_name.clone(), v.clone());
                        }
                    }
                    NodeOutcome::PassThrough { slot_writes: writes, newly_executed: !loop_scoped }
                }
                Err(e) => NodeOutcome::ActionFailed { message: e.to_string() },
            }
        })
    })
}

/// Build a `branch` node (also used for the desugared `while` guard): pure
/// evaluation of `input`/`condition` against slots, selecting a case or the
/// default.
pub fn make_branch(
    input: String,
    cases: HashMap<String, String>,
    default: Option<String>,
) -> Arc<dyn Fn(NodeContext) -> BoxFuture<NodeOutcome> + Send + Sync> {
    Arc::new(move |ctx: NodeContext| {
        let input = input.clone();
        let cases = cases.clone();
        let default = default.clone();
        Box::pin(async move {
            let value = expr::evaluate(&input, &ctx.slots);
            let key = expr::case_key(&value);
            match cases.get(&key).cloned().or(default) {
                Some(target) => NodeOutcome::BranchTo(target),
                None => NodeOutcome::ActionFailed {
                    message: format!("branch on '{input}' matched no case ('{key}') and has no default"),
                },
            }
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NoopActions;
    #[async_trait::async_trait]
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

    fn ctx(slots: HashMap<String, Value>, commands: Vec<Command>) -> NodeContext {
        NodeContext {
            flow_id: "f1".into(),
            slots,
            commands,
            executed_steps: HashSet::new(),
            actions: Arc::new(NoopActions),
            action_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn collect_passes_through_when_already_filled() {
        let node = make_collect("origin".into(), "where from?".into(), None, None);
        let slots = HashMap::from([("origin".to_string(), Value::String("NYC".into()))]);
        let outcome = node(ctx(slots, vec![])).await;
        assert!(matches!(outcome, NodeOutcome::PassThrough { newly_executed: false, .. }));
    }

    #[tokio::test]
    async fn collect_applies_matching_set_slot_command() {
        let node = make_collect("origin".into(), "where from?".into(), None, None);
        let cmd = Command::SetSlot { slot_name: "origin".into(), value: Value::String("SFO".into()) };
        let outcome = node(ctx(HashMap::new(), vec![cmd])).await;
        match outcome {
            NodeOutcome::PassThrough { slot_writes, .. } => assert_eq!(slot_writes["origin"], Value::String("SFO".into())),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn collect_lets_a_set_slot_command_correct_an_already_filled_slot() {
        let node = make_collect("destination".into(), "where to?".into(), None, None);
        let slots = HashMap::from([("destination".to_string(), Value::String("SFO".into()))]);
        let cmd = Command::SetSlot { slot_name: "destination".into(), value: Value::String("LAX".into()) };
        let outcome = node(ctx(slots, vec![cmd])).await;
        match outcome {
            NodeOutcome::PassThrough { slot_writes, .. } => assert_eq!(slot_writes["destination"], Value::String("LAX".into())),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn collect_pauses_when_nothing_available() {
        let node = make_collect("origin".into(), "where from?".into(), None, None);
        let outcome = node(ctx(HashMap::new(), vec![])).await;
        assert!(matches!(outcome, NodeOutcome::Pending(PendingTask::Collect { .. })));
    }

    #[tokio::test]
    async fn confirm_processes_affirm_command() {
        let node = make_confirm("book_confirmed".into(), "confirm?".into());
        let outcome = node(ctx(HashMap::new(), vec![Command::AffirmConfirmation])).await;
        match outcome {
            NodeOutcome::PassThrough { slot_writes, .. } => assert_eq!(slot_writes["book_confirmed"], Value::Bool(true)),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn say_is_idempotency_guarded() {
        let node = make_say("greet".into(), "hello {name}".into(), false);
        let mut context = ctx(HashMap::from([("name".to_string(), Value::String("Ann".into()))]), vec![]);
        let first = node(context.clone()).await;
        assert!(matches!(first, NodeOutcome::Say { newly_executed: true, .. }));

        context.executed_steps.insert("greet".into());
        let second = node(context).await;
        assert!(matches!(second, NodeOutcome::PassThrough { newly_executed: false, .. }));
    }

    #[tokio::test]
    async fn loop_scoped_say_fires_every_visit_even_if_marked_executed() {
        let node = make_say("announce".into(), "iterating".into(), true);
        let mut context = ctx(HashMap::new(), vec![]);
        context.executed_steps.insert("announce".into());
        let outcome = node(context).await;
        assert!(matches!(outcome, NodeOutcome::Say { newly_executed: false, .. }));
    }

    #[tokio::test]
    async fn branch_selects_matching_case_or_default() {
        let mut cases = HashMap::new();
        cases.insert("NYC".to_string(), "handle_nyc".to_string());
        let node = make_branch("$origin".into(), cases, Some("handle_other".into()));

        let nyc = node(ctx(HashMap::from([("origin".to_string(), Value::String("NYC".into()))]), vec![])).await;
        assert!(matches!(nyc, NodeOutcome::BranchTo(t) if t == "handle_nyc"));

        let other = node(ctx(HashMap::from([("origin".to_string(), Value::String("LAX".into()))]), vec![])).await;
        assert!(matches!(other, NodeOutcome::BranchTo(t) if t == "handle_other"));
    }
}
