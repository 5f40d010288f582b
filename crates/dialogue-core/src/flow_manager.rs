//! The flow manager: stack ops, slot ops, step ops, and
//! intent-change handling. Every function here is a pure read of
//! `DialogueState` that returns a [`StateUpdate`] (aka `FlowDelta`) rather
//! than mutating state — callers (command handlers, node factories,
//! execute-flow) fold the delta in via `DialogueState::apply` or combine
//! several with `StateUpdate::merge_from` first.

use chrono::Utc;
use rand::Rng;
use serde_json::Value;

use crate::error::FlowManagerError;
use crate::state::{DialogueState, FlowContext, FlowOutcome, FlowState, StateUpdate};

const FLOW_ID_SUFFIX_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const FLOW_ID_SUFFIX_LEN: usize = 8;

fn mint_flow_id(flow_name: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..FLOW_ID_SUFFIX_LEN)
        .map(|_| FLOW_ID_SUFFIX_CHARS[rng.gen_range(0..FLOW_ID_SUFFIX_CHARS.len())] as char)
        .collect();
    format!("{flow_name}-{suffix}")
}

/// Push a new instance of `flow_name` onto the stack.
///
/// The previous top (if any) transitions to [`FlowState::Idle`] — it
/// remains on the stack, suspended beneath the newly-active flow, and
/// resumes when the new flow is eventually popped. Returns the minted
/// `flow_id` alongside the delta so callers can pre-populate slots
/// (`StartFlow{slots}`) against the right key.
pub fn push_flow(state: &DialogueState, flow_name: &str) -> (String, StateUpdate) {
    let flow_id = mint_flow_id(flow_name);
    let mut stack: Vec<FlowContext> = state
        .flow_stack
        .iter()
        .cloned()
        .map(|mut c| {
            c.flow_state = FlowState::Idle;
            c
        })
        .collect();
    stack.push(FlowContext {
        flow_id: flow_id.clone(),
        flow_name: flow_name.to_string(),
        current_step: None,
        flow_state: FlowState::Active,
        created_at: Utc::now(),
    });
    (flow_id.clone(), StateUpdate::new().with_flow_stack(stack))
}

/// Pop the active flow off the stack, recording why it left
/// (`FlowOutcome`), and purge its slot and idempotency bookkeeping.
///
/// Fails with [`FlowManagerError::EmptyStack`] if the stack is already
/// empty — the one flow-manager operation that must error rather than
/// no-op.
pub fn pop_flow(state: &DialogueState, outcome: FlowOutcome) -> Result<(FlowContext, StateUpdate), FlowManagerError> {
    let mut stack = state.flow_stack.clone();
    let mut popped = stack.pop().ok_or(FlowManagerError::EmptyStack)?;
    popped.flow_state = outcome.as_flow_state();

    if let Some(new_top) = stack.last_mut() {
        new_top.flow_state = FlowState::Active;
    }

    let mut update = StateUpdate::new().with_flow_stack(stack);
    update.flow_slots_clear.push(popped.flow_id.clone());
    update.executed_steps_clear.push(popped.flow_id.clone());
    Ok((popped, update))
}

/// The top of the stack, if any.
pub fn get_active_context(state: &DialogueState) -> Option<&FlowContext> {
    state.flow_stack.last()
}

pub fn get_slot(state: &DialogueState, flow_id: &str, slot_name: &str) -> Option<&Value> {
    state.flow_slots.get(flow_id)?.get(slot_name)
}

pub fn has_slot(state: &DialogueState, flow_id: &str, slot_name: &str) -> bool {
    get_slot(state, flow_id, slot_name).map(|v| !v.is_null()).unwrap_or(false)
}

pub fn get_all_slots(state: &DialogueState, flow_id: &str) -> std::collections::HashMap<String, Value> {
    state.flow_slots.get(flow_id).cloned().unwrap_or_default()
}

/// Write `slot_name` in the *active* flow's slot map. A no-op empty delta
/// if there is no active flow.
pub fn set_slot(state: &DialogueState, slot_name: &str, value: Value) -> StateUpdate {
    match get_active_context(state) {
        Some(ctx) => StateUpdate::new().with_slot(ctx.flow_id.clone(), slot_name, value),
        None => StateUpdate::new(),
    }
}

/// Update `current_step` on the `FlowContext` matching `flow_id`. Since
/// `flow_stack` is a whole-field-overwrite channel, this returns a full
/// replacement stack with just that one context's `current_step` changed.
pub fn update_current_step(state: &DialogueState, flow_id: &str, step_name: Option<&str>) -> StateUpdate {
    if !state.flow_stack.iter().any(|c| c.flow_id == flow_id) {
        return StateUpdate::new();
    }
    let stack = state
        .flow_stack
        .iter()
        .cloned()
        .map(|mut c| {
            if c.flow_id == flow_id {
                c.current_step = step_name.map(|s| s.to_string());
            }
            c
        })
        .collect();
    StateUpdate::new().with_flow_stack(stack)
}

/// If `new_flow_name` differs from the active flow, push it; otherwise a
/// no-op.
pub fn handle_intent_change(state: &DialogueState, new_flow_name: &str) -> (Option<String>, StateUpdate) {
    match get_active_context(state) {
        Some(ctx) if ctx.flow_name == new_flow_name => (None, StateUpdate::new()),
        _ => {
            let (flow_id, update) = push_flow(state, new_flow_name);
            (Some(flow_id), update)
        }
    }
}

/// Enforce `max_flow_stack_depth`: if pushing would
/// exceed the limit, the oldest (bottom-of-stack) flow is cancelled first.
/// Returns the updated stack plus the flow_id of whatever got cancelled, if
/// any.
pub fn enforce_stack_depth(stack: &[FlowContext], max_depth: usize) -> (Vec<FlowContext>, Option<String>) {
    if stack.len() <= max_depth || stack.is_empty() {
        return (stack.to_vec(), None);
    }
    let mut trimmed = stack.to_vec();
    let oldest = trimmed.remove(0);
    (trimmed, Some(oldest.flow_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_flow_mints_unique_ids_for_same_flow_name() {
        let state = DialogueState::new();
        let (id1, update1) = push_flow(&state, "book_flight");
        let mut state2 = state.clone();
        state2.apply(update1);
        let (id2, _) = push_flow(&state2, "book_flight");
        assert_ne!(id1, id2);
        assert!(id1.starts_with("book_flight-"));
    }

    #[test]
    fn push_flow_suspends_previous_top_to_idle() {
        let mut state = DialogueState::new();
        let (_, u1) = push_flow(&state, "outer");
        state.apply(u1);
        let (_, u2) = push_flow(&state, "inner");
        state.apply(u2);
        assert_eq!(state.flow_stack[0].flow_state, FlowState::Idle);
        assert_eq!(state.flow_stack[1].flow_state, FlowState::Active);
    }

    #[test]
    fn pop_flow_on_empty_stack_errors() {
        let state = DialogueState::new();
        assert!(matches!(pop_flow(&state, FlowOutcome::Completed), Err(FlowManagerError::EmptyStack)));
    }

    #[test]
    fn pop_flow_purges_slots_and_executed_steps_and_reactivates_parent() {
        let mut state = DialogueState::new();
        let (outer_id, u1) = push_flow(&state, "outer");
        state.apply(u1);
        let (inner_id, u2) = push_flow(&state, "inner");
        state.apply(u2);
        state.apply(StateUpdate::new().with_slot(inner_id.clone(), "x", serde_json::json!(1)));

        let (popped, update) = pop_flow(&state, FlowOutcome::Completed).unwrap();
        state.apply(update);

        assert_eq!(popped.flow_id, inner_id);
        assert_eq!(popped.flow_state, FlowState::Completed);
        assert!(!state.flow_slots.contains_key(&inner_id));
        assert_eq!(state.flow_stack.len(), 1);
        assert_eq!(state.flow_stack[0].flow_id, outer_id);
        assert_eq!(state.flow_stack[0].flow_state, FlowState::Active);
    }

    #[test]
    fn set_slot_on_empty_stack_is_a_harmless_noop() {
        let state = DialogueState::new();
        let update = set_slot(&state, "origin", serde_json::json!("NYC"));
        assert!(update.is_empty());
    }

    #[test]
    fn handle_intent_change_noop_when_same_flow_active() {
        let mut state = DialogueState::new();
        let (_, u) = push_flow(&state, "book_flight");
        state.apply(u);
        let (flow_id, update) = handle_intent_change(&state, "book_flight");
        assert!(flow_id.is_none());
        assert!(update.is_empty());
    }

    #[test]
    fn enforce_stack_depth_cancels_oldest_when_over_limit() {
        let state = DialogueState::new();
        let (_, u1) = push_flow(&state, "a");
        let mut state = state;
        state.apply(u1);
        let (_, u2) = push_flow(&state, "b");
        state.apply(u2);
        let (_, u3) = push_flow(&state, "c");
        state.apply(u3);

        let (trimmed, cancelled) = enforce_stack_depth(&state.flow_stack, 2);
        assert_eq!(trimmed.len(), 2);
        assert!(cancelled.unwrap().starts_with("a-"));
    }
}
