//! The dialogue state model and its reducer-based merge
//! semantics.
//!
//! `DialogueState` is the single object persisted per user key. It is never
//! mutated in place by node logic: every mutation path produces a
//! [`StateUpdate`] (a `FlowDelta`) that gets folded into the authoritative
//! state through [`DialogueState::apply`] — a reducer-merge over the
//! dialogue engine's concrete fields rather than a raw JSON channel.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::command::Command;
use crate::message::Message;

/// The lifecycle of one flow instance on the stack.
///
/// `IDLE`, `ACTIVE`, `WAITING_INPUT`, and `COMPLETED` cover the normal
/// path; `ERROR` and `CANCELLED` are added so `pop_flow` can record *why* a
/// flow left the stack without inventing a second, untyped "outcome"
/// concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    /// On the stack but not the active (top) flow.
    Idle,
    /// The active flow, currently being driven by execute-flow.
    Active,
    /// The active flow is paused at a `PendingTask` that requires input.
    WaitingInput,
    Completed,
    Error,
    Cancelled,
}

/// Why a flow left the stack, passed to [`crate::flow_manager::pop_flow`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowOutcome {
    Completed,
    Cancelled,
    Error,
}

impl FlowOutcome {
    fn as_flow_state(self) -> FlowState {
        match self {
            FlowOutcome::Completed => FlowState::Completed,
            FlowOutcome::Cancelled => FlowState::Cancelled,
            FlowOutcome::Error => FlowState::Error,
        }
    }
}

/// One instance of a flow on the stack.
///
/// `flow_id` is minted fresh per push (`flow_name` plus a random suffix) so
/// that two concurrent instances of the same flow never collide in slot
/// storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowContext {
    pub flow_id: String,
    pub flow_name: String,
    pub current_step: Option<String>,
    pub flow_state: FlowState,
    pub created_at: DateTime<Utc>,
}

/// A gate requiring (or optionally requiring) user input before execution
/// can continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingTask {
    Collect {
        prompt: String,
        slot_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Confirm {
        prompt: String,
        options: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
    Inform {
        prompt: String,
        #[serde(default)]
        wait_for_ack: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        metadata: Option<Value>,
    },
}

impl PendingTask {
    pub fn confirm_default(prompt: impl Into<String>) -> Self {
        PendingTask::Confirm {
            prompt: prompt.into(),
            options: vec!["yes".to_string(), "no".to_string()],
            metadata: None,
        }
    }

    /// Whether this task must be surfaced to the user before execution can
    /// resume. `Inform` without `wait_for_ack` is delivered and consumed in
    /// the same turn.
    pub fn requires_input(&self) -> bool {
        match self {
            PendingTask::Collect { .. } | PendingTask::Confirm { .. } => true,
            PendingTask::Inform { wait_for_ack, .. } => *wait_for_ack,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            PendingTask::Collect { prompt, .. }
            | PendingTask::Confirm { prompt, .. }
            | PendingTask::Inform { prompt, .. } => prompt,
        }
    }
}

/// The single object persisted per user key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DialogueState {
    pub messages: Vec<Message>,
    pub flow_stack: Vec<FlowContext>,
    pub flow_slots: HashMap<String, HashMap<String, Value>>,
    pub commands: Vec<Command>,
    pub pending_task: Option<PendingTask>,
    pub executed_steps: HashMap<String, HashSet<String>>,
    pub pending_responses: Vec<String>,
    pub branch_target: Option<String>,
    pub user_message: Option<String>,
    /// Minted fresh per `process_message` call (§10 expansion); used for
    /// checkpoint metadata and `get_state` inspection only.
    pub turn_id: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A tri-state "did this field change" wrapper: `None` means "leave as is",
/// `Some(None)` means "clear it", `Some(Some(v))` means "set it to `v`".
///
/// This distinguishes "key absent" from "key present with a null value" in a
/// typed way, without reaching for a dynamically-typed delta representation.
pub type Nullable<T> = Option<Option<T>>;

/// An immutable partial update to a [`DialogueState`], merged in via
/// [`DialogueState::apply`] — a `FlowDelta`: every flow-manager mutation and
/// every step node returns one instead of mutating state directly.
#[derive(Debug, Clone, Default)]
pub struct StateUpdate {
    /// Appended to `messages`.
    pub messages: Vec<Message>,
    /// Whole-field overwrite when present (stack shape changes as a unit).
    pub flow_stack: Option<Vec<FlowContext>>,
    /// Deep merge: outer keys (flow_id) unioned, inner maps (slot_name)
    /// last-write-wins.
    pub flow_slots: HashMap<String, HashMap<String, Value>>,
    /// flow_ids whose entire slot map should be dropped (flow popped).
    pub flow_slots_clear: Vec<String>,
    /// Whole-field overwrite (cleared every turn by `respond`).
    pub commands: Option<Vec<Command>>,
    pub pending_task: Nullable<PendingTask>,
    /// Step names newly executed, unioned into `executed_steps[flow_id]`.
    pub executed_steps: HashMap<String, HashSet<String>>,
    /// flow_ids whose executed-step set should be dropped (flow popped).
    pub executed_steps_clear: Vec<String>,
    /// Appended to `pending_responses`.
    pub pending_responses: Vec<String>,
    pub branch_target: Nullable<String>,
    pub user_message: Nullable<String>,
}

impl StateUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow_stack(mut self, stack: Vec<FlowContext>) -> Self {
        self.flow_stack = Some(stack);
        self
    }

    pub fn with_slot(mut self, flow_id: impl Into<String>, slot: impl Into<String>, value: Value) -> Self {
        self.flow_slots.entry(flow_id.into()).or_default().insert(slot.into(), value);
        self
    }

    pub fn with_pending_task(mut self, task: Option<PendingTask>) -> Self {
        self.pending_task = Some(task);
        self
    }

    pub fn with_branch_target(mut self, target: Option<String>) -> Self {
        self.branch_target = Some(target);
        self
    }

    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.pending_responses.push(text.into());
        self
    }

    pub fn mark_executed(mut self, flow_id: impl Into<String>, step: impl Into<String>) -> Self {
        self.executed_steps.entry(flow_id.into()).or_default().insert(step.into());
        self
    }

    /// `True` if this update changes nothing observable. Used by no-op
    /// command handlers.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
            && self.flow_stack.is_none()
            && self.flow_slots.is_empty()
            && self.flow_slots_clear.is_empty()
            && self.commands.is_none()
            && self.pending_task.is_none()
            && self.executed_steps.is_empty()
            && self.executed_steps_clear.is_empty()
            && self.pending_responses.is_empty()
            && self.branch_target.is_none()
            && self.user_message.is_none()
    }

    /// Combine `other` into `self`, applying the same reducer rules
    /// `DialogueState::apply` would, without touching a `DialogueState`.
    /// Used by command handlers that accumulate several deltas before
    /// returning one combined update for the turn.
    pub fn merge_from(&mut self, other: StateUpdate) {
        self.messages.extend(other.messages);
        if let Some(stack) = other.flow_stack {
            self.flow_stack = Some(stack);
        }
        for (flow_id, slots) in other.flow_slots {
            self.flow_slots.entry(flow_id).or_default().extend(slots);
        }
        self.flow_slots_clear.extend(other.flow_slots_clear);
        if let Some(commands) = other.commands {
            self.commands = Some(commands);
        }
        if let Some(task) = other.pending_task {
            self.pending_task = Some(task);
        }
        for (flow_id, steps) in other.executed_steps {
            self.executed_steps.entry(flow_id).or_default().extend(steps);
        }
        self.executed_steps_clear.extend(other.executed_steps_clear);
        self.pending_responses.extend(other.pending_responses);
        if let Some(target) = other.branch_target {
            self.branch_target = Some(target);
        }
        if let Some(msg) = other.user_message {
            self.user_message = Some(msg);
        }
    }
}

impl DialogueState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active_flow(&self) -> Option<&FlowContext> {
        self.flow_stack.last()
    }

    /// Apply a [`StateUpdate`] to this state using each field's reducer:
    /// append for `messages`/`pending_responses`, last-write-wins for
    /// `flow_stack`/`commands`, deep-merge for `flow_slots`, union for
    /// `executed_steps`.
    pub fn apply(&mut self, update: StateUpdate) {
        self.messages.extend(update.messages);

        if let Some(stack) = update.flow_stack {
            self.flow_stack = stack;
        }

        for (flow_id, slots) in update.flow_slots {
            self.flow_slots.entry(flow_id).or_default().extend(slots);
        }
        for flow_id in update.flow_slots_clear {
            self.flow_slots.remove(&flow_id);
        }

        if let Some(commands) = update.commands {
            self.commands = commands;
        }

        if let Some(task) = update.pending_task {
            self.pending_task = task;
        }

        for (flow_id, steps) in update.executed_steps {
            self.executed_steps.entry(flow_id).or_default().extend(steps);
        }
        for flow_id in update.executed_steps_clear {
            self.executed_steps.remove(&flow_id);
        }

        self.pending_responses.extend(update.pending_responses);

        if let Some(target) = update.branch_target {
            self.branch_target = target;
        }

        if let Some(msg) = update.user_message {
            self.user_message = msg;
        }
    }

    /// Drop `flow_slots`/`executed_steps` entries for flow_ids no longer on
    /// the stack. `pop_flow`
    /// already does this for the flow it removes; this is a defensive
    /// compaction pass for state loaded from an older checkpoint.
    pub fn compact(&mut self) {
        let live: HashSet<&str> = self.flow_stack.iter().map(|c| c.flow_id.as_str()).collect();
        self.flow_slots.retain(|k, _| live.contains(k.as_str()));
        self.executed_steps.retain(|k, _| live.contains(k.as_str()));
    }
}
