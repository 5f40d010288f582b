//! The command handler registry: a pluggable dispatch
//! table from [`CommandKind`] to a pure `(command, state) -> StateUpdate`
//! function.
//!
//! `understand` (§4.5) uses this registry for the commands that need to
//! take effect before `execute_flow` invokes a subgraph: `StartFlow`/
//! `CancelFlow` (which reshape the stack) and `ChitChat` (a digression with
//! no step-node counterpart to read it later). The remaining command kinds
//! (`SetSlot`, `Affirm`/`DenyConfirmation`, `Clarify`, `Continuation`) are
//! intentionally *not* pre-applied here: the step node factories
//! (`collect`/`confirm`) read those directly out of `state.commands` on
//! each subgraph re-invocation, per each step kind's own behavior.
//! Pre-applying `SetSlot` through this registry *and* re-reading it in the
//! collect node would double-apply the same command; see `DESIGN.md` for
//! the recorded decision. The registry still dispatches every command kind
//! (including those) so it remains a complete, independently testable
//! component.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{Command, CommandKind};
use crate::error::CommandError;
use crate::flow_manager;
use crate::state::{DialogueState, FlowOutcome, StateUpdate};

/// A pure command handler: given the command and the state it applies
/// against, produce the delta. Handlers never see or mutate `DialogueState`
/// directly.
pub type CommandHandler = Arc<dyn Fn(&Command, &DialogueState) -> StateUpdate + Send + Sync>;

/// Whether an unrecognized command type is logged and ignored, or raised as
/// an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownCommandPolicy {
    Ignore,
    Strict,
}

/// Dispatch table from [`CommandKind`] to [`CommandHandler`], built once at
/// startup. Registration is idempotent: registering the same kind twice
/// replaces the prior handler rather than erroring.
pub struct CommandHandlerRegistry {
    handlers: HashMap<CommandKind, CommandHandler>,
    policy: UnknownCommandPolicy,
}

impl CommandHandlerRegistry {
    /// Build the registry with the built-in handlers for every `CommandKind`
    ///, with the given policy for any
    /// kind a caller later removes or a future command variant a strict
    /// deployment wants to reject.
    pub fn new(policy: UnknownCommandPolicy) -> Self {
        let mut registry = Self { handlers: HashMap::new(), policy };
        registry.register(CommandKind::StartFlow, Arc::new(handle_start_flow));
        registry.register(CommandKind::CancelFlow, Arc::new(handle_cancel_flow));
        registry.register(CommandKind::SetSlot, Arc::new(handle_set_slot));
        registry.register(CommandKind::AffirmConfirmation, Arc::new(handle_noop));
        registry.register(CommandKind::DenyConfirmation, Arc::new(handle_noop));
        registry.register(CommandKind::ChitChat, Arc::new(handle_chit_chat));
        registry.register(CommandKind::Clarify, Arc::new(handle_noop));
        registry.register(CommandKind::Continuation, Arc::new(handle_noop));
        registry
    }

    pub fn register(&mut self, kind: CommandKind, handler: CommandHandler) {
        self.handlers.insert(kind, handler);
    }

    /// Dispatch `command` against `state`, returning the delta the matching
    /// handler produces.
    pub fn dispatch(&self, command: &Command, state: &DialogueState) -> Result<StateUpdate, CommandError> {
        match self.handlers.get(&command.kind()) {
            Some(handler) => Ok(handler(command, state)),
            None => match self.policy {
                UnknownCommandPolicy::Ignore => {
                    tracing::warn!(kind = %command.kind(), "no handler for command kind; ignoring");
                    Ok(StateUpdate::new())
                }
                UnknownCommandPolicy::Strict => Err(CommandError::UnknownCommand(command.kind().to_string())),
            },
        }
    }

    /// The set of command kinds with a registered handler, for
    /// introspection/health checks.
    pub fn handlers(&self) -> impl Iterator<Item = CommandKind> + '_ {
        self.handlers.keys().copied()
    }
}

fn handle_start_flow(command: &Command, state: &DialogueState) -> StateUpdate {
    let Command::StartFlow { flow_name, slots } = command else {
        return StateUpdate::new();
    };
    let (flow_id, mut update) = flow_manager::push_flow(state, flow_name);
    if let Some(slots) = slots {
        for (slot_name, value) in slots {
            update.merge_from(StateUpdate::new().with_slot(flow_id.clone(), slot_name.clone(), value.clone()));
        }
    }
    update
}

/// Cancellation pops the active flow and the assistant confirms it, rather
/// than silently clearing the stack.
fn handle_cancel_flow(_command: &Command, state: &DialogueState) -> StateUpdate {
    match flow_manager::pop_flow(state, FlowOutcome::Cancelled) {
        Ok((_, update)) => update.with_response("Okay, I've cancelled that.".to_string()),
        Err(_) => StateUpdate::new(),
    }
}

fn handle_set_slot(command: &Command, state: &DialogueState) -> StateUpdate {
    let Command::SetSlot { slot_name, value } = command else {
        return StateUpdate::new();
    };
    flow_manager::set_slot(state, slot_name, value.clone())
}

fn handle_chit_chat(command: &Command, _state: &DialogueState) -> StateUpdate {
    let Command::ChitChat { content } = command else {
        return StateUpdate::new();
    };
    StateUpdate::new().with_response(content.clone())
}

fn handle_noop(_command: &Command, _state: &DialogueState) -> StateUpdate {
    StateUpdate::new()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_flow_handler_pushes_and_prepopulates_slots() {
        let state = DialogueState::new();
        let registry = CommandHandlerRegistry::new(UnknownCommandPolicy::Ignore);
        let mut slots = std::collections::HashMap::new();
        slots.insert("origin".to_string(), serde_json::json!("NYC"));
        let cmd = Command::StartFlow { flow_name: "book_flight".into(), slots: Some(slots) };
        let update = registry.dispatch(&cmd, &state).unwrap();
        assert!(update.flow_stack.is_some());
        let flow_id = update.flow_stack.as_ref().unwrap()[0].flow_id.clone();
        assert_eq!(update.flow_slots[&flow_id]["origin"], serde_json::json!("NYC"));
    }

    #[test]
    fn cancel_flow_on_empty_stack_is_a_noop_not_an_error() {
        let state = DialogueState::new();
        let registry = CommandHandlerRegistry::new(UnknownCommandPolicy::Strict);
        let update = registry.dispatch(&Command::CancelFlow, &state).unwrap();
        assert!(update.is_empty());
    }

    #[test]
    fn chit_chat_appends_a_response_without_touching_the_stack() {
        let state = DialogueState::new();
        let registry = CommandHandlerRegistry::new(UnknownCommandPolicy::Ignore);
        let cmd = Command::ChitChat { content: "it's 3pm".into() };
        let update = registry.dispatch(&cmd, &state).unwrap();
        assert_eq!(update.pending_responses, vec!["it's 3pm".to_string()]);
        assert!(update.flow_stack.is_none());
    }

    #[test]
    fn registration_is_idempotent() {
        let mut registry = CommandHandlerRegistry::new(UnknownCommandPolicy::Ignore);
        let before = registry.handlers().count();
        registry.register(CommandKind::Continuation, Arc::new(handle_noop));
        assert_eq!(registry.handlers().count(), before);
    }
}
