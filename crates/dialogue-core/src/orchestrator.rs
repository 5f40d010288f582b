//! The top-level turn pipeline: `human_input_gate →
//! understand → execute_flow → resume → respond`.
//!
//! Implemented as explicit async methods on [`Orchestrator`] rather than a
//! second from-scratch generic graph engine layered on top of
//! [`crate::subgraph`]: this pipeline is a small, fixed five-node walk with
//! exactly one suspension point, so building a second Pregel
//! executor to drive it would be ceremony without payoff. The compiled
//! subgraphs are where the general graph machinery earns its keep.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dialogue_checkpoint::CheckpointSaver;
use serde_json::Value;
use uuid::Uuid;

use crate::action::{ActionInvoker, DEFAULT_ACTION_TIMEOUT};
use crate::command::{Command, CommandKind};
use crate::error::{ExecutionError, Result};
use crate::flow_manager;
use crate::handlers::{CommandHandlerRegistry, UnknownCommandPolicy};
use crate::message::Message;
use crate::nlu::{DialogueContext, MessageType, NluService};
use crate::state::{DialogueState, FlowOutcome, StateUpdate};
use crate::subgraph::SubgraphRegistry;

/// The default user-visible text for an unrecoverable `ERROR` outcome.
pub const DEFAULT_ERROR_TEMPLATE: &str = "Sorry, something went wrong and I couldn't finish that. Let's start over.";

/// Resource limits governing one turn.
#[derive(Debug, Clone)]
pub struct Limits {
    pub max_flow_stack_depth: usize,
    pub subgraph_iteration_limit: usize,
    pub action_timeout: Duration,
    pub error_template: String,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_flow_stack_depth: 8,
            subgraph_iteration_limit: 25,
            action_timeout: DEFAULT_ACTION_TIMEOUT,
            error_template: DEFAULT_ERROR_TEMPLATE.to_string(),
        }
    }
}

/// The result of one [`Orchestrator::process_message`] call.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub response: String,
    pub paused: bool,
}

/// A turn-level observability sink: the orchestrator
/// calls this at flow-lifecycle points so a caller can count them, without
/// `dialogue-core` depending on `dialogue-runtime` — the same layering
/// `CheckpointSaver` uses so the checkpoint backend doesn't live in this
/// crate either. `dialogue-runtime::Metrics` is the production
/// implementation; tests get the silent default.
pub trait TurnObserver: Send + Sync {
    fn flow_started(&self) {}
    fn flow_outcome(&self, _outcome: FlowOutcome) {}
    fn subgraph_iterations(&self, _count: u64) {}
}

/// The default observer: every hook is a no-op.
pub struct NoopTurnObserver;
impl TurnObserver for NoopTurnObserver {}

/// Ties the NLU collaborator, the command handler registry, the compiled
/// subgraph registry, and a checkpointer together into the per-turn
/// pipeline. Built once at startup; `Arc`-shared across concurrent user
/// turns.
pub struct Orchestrator {
    subgraphs: SubgraphRegistry,
    commands: CommandHandlerRegistry,
    actions: Arc<dyn ActionInvoker>,
    nlu: Arc<dyn NluService>,
    checkpointer: Arc<dyn CheckpointSaver>,
    limits: Limits,
    observer: Arc<dyn TurnObserver>,
}

impl Orchestrator {
    pub fn new(
        subgraphs: SubgraphRegistry,
        actions: Arc<dyn ActionInvoker>,
        nlu: Arc<dyn NluService>,
        checkpointer: Arc<dyn CheckpointSaver>,
        limits: Limits,
    ) -> Self {
        Self {
            subgraphs,
            commands: CommandHandlerRegistry::new(UnknownCommandPolicy::Ignore),
            actions,
            nlu,
            checkpointer,
            limits,
            observer: Arc::new(NoopTurnObserver),
        }
    }

    /// Attach an observer, e.g. `dialogue-runtime::Metrics`, that wants to
    /// count flow starts/outcomes and subgraph iterations.
    pub fn with_observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Advance the dialogue for `user_key` by one turn given `message`.
    pub async fn process_message(&self, user_key: &str, message: &str) -> Result<TurnResult> {
        let mut state = self.load_state(user_key).await?;

        state.turn_id = Some(Uuid::new_v4());
        let prior_pending_task = state.pending_task.clone();
        let waiting_for_slot = self.human_input_gate(&mut state, message);
        self.understand(&mut state, waiting_for_slot).await?;

        let paused = self.execute_flow(&mut state, prior_pending_task.as_ref()).await?;

        // `execute_flow` queues the collect/confirm prompt into
        // `pending_responses` on the pausing path too, so `respond` runs
        // unconditionally here — a paused turn still owes the caller the
        // prompt it's waiting on.
        let response = self.respond(&mut state);

        state.commands.clear();
        state.updated_at = Some(Utc::now());
        self.checkpointer.save(user_key, serde_json::to_value(&state)?).await?;

        Ok(TurnResult { response, paused })
    }

    /// Delete the persisted checkpoint for `user_key`.
    pub async fn reset_state(&self, user_key: &str) -> Result<()> {
        self.checkpointer.delete(user_key).await?;
        Ok(())
    }

    /// Load and deserialize the current state for `user_key`, for
    /// inspection only.
    pub async fn get_state(&self, user_key: &str) -> Result<DialogueState> {
        self.load_state(user_key).await
    }

    async fn load_state(&self, user_key: &str) -> Result<DialogueState> {
        match self.checkpointer.load(user_key).await? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(DialogueState::new()),
        }
    }

    /// Bind the inbound message and clear any pending task left from a
    /// suspended prior turn, returning
    /// the slot that task was waiting on (if it was a `collect`), since
    /// `understand` needs that for `DialogueContext` after it is cleared.
    fn human_input_gate(&self, state: &mut DialogueState, message: &str) -> Option<String> {
        let waiting_for_slot = state.pending_task.as_ref().and_then(|task| match task {
            crate::state::PendingTask::Collect { slot_name, .. } => Some(slot_name.clone()),
            _ => None,
        });
        state.user_message = Some(message.to_string());
        state.pending_task = None;
        state.messages.push(Message::user(message));
        waiting_for_slot
    }

    /// Call the NLU collaborator, record its commands, and process
    /// `StartFlow`/`CancelFlow` inline so `execute_flow` sees the correct
    /// active flow before it invokes a subgraph.
    async fn understand(&self, state: &mut DialogueState, waiting_for_slot: Option<String>) -> Result<()> {
        let context = self.build_dialogue_context(state, waiting_for_slot);
        let user_message = state.user_message.clone().unwrap_or_default();
        let output = self.nlu.interpret(&user_message, &context).await?;

        tracing::debug!(
            turn_id = ?state.turn_id,
            message_type = ?output.message_type,
            confidence = output.confidence,
            commands = output.commands.len(),
            "understand: NLU output"
        );

        state.commands = output.commands.clone();

        let mut combined = StateUpdate::new();
        for command in &output.commands {
            match command.kind() {
                // StartFlow/CancelFlow reshape the stack here so execute_flow
                // sees the right active flow. SetSlot/Affirm/DenyConfirmation
                // are deliberately left to the collect/confirm node factories
                // so they are not double-applied.
                CommandKind::StartFlow => {
                    let update = self.commands.dispatch(command, state)?;
                    combined.merge_from(update);
                    self.observer.flow_started();
                }
                CommandKind::CancelFlow => {
                    if state.active_flow().is_some() {
                        self.observer.flow_outcome(FlowOutcome::Cancelled);
                    }
                    let update = self.commands.dispatch(command, state)?;
                    combined.merge_from(update);
                }
                // ChitChat is a digression: it never touches the stack, only
                // queues its reply, so dispatching it here (rather than
                // letting a step node see it) is safe and is the only place
                // in the turn pipeline that runs regardless of which flow
                // (if any) is active.
                CommandKind::ChitChat => {
                    let update = self.commands.dispatch(command, state)?;
                    combined.merge_from(update);
                }
                _ => {}
            }
        }
        state.apply(combined);
        self.enforce_stack_depth(state);

        Ok(())
    }

    fn enforce_stack_depth(&self, state: &mut DialogueState) {
        let (trimmed, cancelled) = flow_manager::enforce_stack_depth(&state.flow_stack, self.limits.max_flow_stack_depth);
        if let Some(flow_id) = cancelled {
            tracing::warn!(flow_id, "flow stack depth exceeded; cancelling oldest flow");
            state.flow_stack = trimmed;
            state.flow_slots.remove(&flow_id);
            state.executed_steps.remove(&flow_id);
        }
    }

    /// The invoke-subgraph outer loop. Returns `true` if
    /// the turn ended paused awaiting input, `false` if it ran to
    /// `respond`. `prior_pending_task` is whatever the dialogue was already
    /// paused on before this turn's `human_input_gate` cleared it — used to
    /// tell a genuinely new pause apart from the same collect/confirm gate
    /// being re-emitted unchanged by the subgraph's fresh re-invocation (see
    /// the digression scenario below).
    async fn execute_flow(&self, state: &mut DialogueState, prior_pending_task: Option<&crate::state::PendingTask>) -> Result<bool> {
        let mut iterations_run = 0u64;
        for iteration in 0..self.limits.subgraph_iteration_limit {
            let active = match flow_manager::get_active_context(state) {
                Some(ctx) => ctx.clone(),
                None => {
                    self.observer.subgraph_iterations(iterations_run);
                    return Ok(false);
                }
            };
            iterations_run += 1;

            let subgraph = self
                .subgraphs
                .get(&active.flow_name)
                .ok_or_else(|| ExecutionError::UnknownFlow(active.flow_name.clone()))?;

            let slots = flow_manager::get_all_slots(state, &active.flow_id);
            let executed = state.executed_steps.get(&active.flow_id).cloned().unwrap_or_default();

            tracing::debug!(flow_id = %active.flow_id, flow = %active.flow_name, iteration, "execute_flow: invoking subgraph");

            let result = subgraph
                .invoke(&active.flow_id, slots, &state.commands, executed, self.actions.clone(), self.limits.action_timeout)
                .await;

            let mut update = StateUpdate::new();
            for (slot, value) in result.slot_writes {
                update = update.with_slot(active.flow_id.clone(), slot, value);
            }
            for step in result.newly_executed {
                update = update.mark_executed(active.flow_id.clone(), step);
            }
            for response in &result.responses {
                update = update.with_response(response.clone());
            }

            if let Some(message) = result.error {
                // The internal failure (`message`) is logged but never
                // shown to the user; the caller gets
                // `limits.error_template` instead.
                tracing::error!(flow_id = %active.flow_id, error = %message, "flow errored; popped");
                update = update.with_response(self.limits.error_template.clone());
                state.apply(update);
                let (_, pop_update) = flow_manager::pop_flow(state, FlowOutcome::Error)?;
                state.apply(pop_update);
                self.observer.flow_outcome(FlowOutcome::Error);
                continue;
            }

            match result.pending_task {
                None => {
                    state.apply(update);
                    let (_, pop_update) = flow_manager::pop_flow(state, FlowOutcome::Completed)?;
                    state.apply(pop_update);
                    self.observer.flow_outcome(FlowOutcome::Completed);
                }
                Some(task) if !task.requires_input() => {
                    update = update.with_response(task.prompt().to_string());
                    state.apply(update);
                }
                Some(task) => {
                    // A digression (or any other non-stack-mutating command)
                    // can leave the active flow's collect/confirm step
                    // unchanged; the re-invoked subgraph re-emits the exact
                    // same task the user was already shown last turn. Only
                    // queue the prompt as a fresh response when the task
                    // actually changed, so a digression reply doesn't get a
                    // stale prompt glued onto it this turn — it's re-surfaced
                    // next turn via `human_input_gate` regardless.
                    if prior_pending_task != Some(&task) {
                        update = update.with_response(task.prompt().to_string());
                    }
                    update = update.with_pending_task(Some(task));
                    state.apply(update);
                    self.observer.subgraph_iterations(iterations_run);
                    return Ok(true);
                }
            }
        }

        // Recursion guard: contained within the active flow,
        // not propagated to the caller — mark it `ERROR`, pop it, and
        // surface the generic error template like any other action error.
        tracing::error!(limit = self.limits.subgraph_iteration_limit, "execute_flow: subgraph iteration limit exceeded");
        if flow_manager::get_active_context(state).is_some() {
            let update = StateUpdate::new().with_response(self.limits.error_template.clone());
            state.apply(update);
            let (_, pop_update) = flow_manager::pop_flow(state, FlowOutcome::Error)?;
            state.apply(pop_update);
            self.observer.flow_outcome(FlowOutcome::Error);
        }
        self.observer.subgraph_iterations(iterations_run);
        Ok(false)
    }

    /// Join `pending_responses` into one assistant utterance.
    fn respond(&self, state: &mut DialogueState) -> String {
        let response = state.pending_responses.join(" ");
        if !response.is_empty() {
            state.messages.push(Message::assistant(response.clone()));
        }
        state.pending_responses.clear();
        response
    }

    fn build_dialogue_context(&self, state: &DialogueState, waiting_for_slot: Option<String>) -> DialogueContext {
        let active = state.active_flow();
        DialogueContext {
            active_flow_name: active.map(|c| c.flow_name.clone()),
            waiting_for_slot,
            available_flows: self.subgraphs.flow_names().map(|s| s.to_string()).collect(),
            available_actions: Vec::new(),
            recent_messages: state.messages.iter().rev().take(10).rev().map(|m| m.content.clone()).collect(),
            current_time: Utc::now(),
        }
    }
}
