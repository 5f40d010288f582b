//! [`Command`] — the typed directives NLU emits each turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A typed directive produced by the NLU collaborator, describing a
/// requested change to the dialogue state. Discriminated by `type` when
/// serialized: commands serialize as `{type, ...}` dicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Push a new flow instance on the stack, optionally pre-populating slots
    /// (e.g. multi-slot extraction: "book a flight from NYC to SFO").
    StartFlow {
        flow_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slots: Option<HashMap<String, Value>>,
    },
    /// Pop the active flow, marking it cancelled.
    CancelFlow,
    /// Write a slot in the active flow's context.
    SetSlot { slot_name: String, value: Value },
    /// Resolve a pending `confirm` step affirmatively.
    AffirmConfirmation,
    /// Resolve a pending `confirm` step negatively.
    DenyConfirmation,
    /// A digression: small talk unrelated to the active flow.
    ChitChat { content: String },
    /// A digression: the user's utterance was ambiguous and needs
    /// clarification before any flow mutation.
    Clarify,
    /// An explicit "proceed" with no further content.
    Continuation,
}

impl Command {
    /// The tag used for dispatch in the command handler registry and for
    /// `{type, ...}` serialization.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::StartFlow { .. } => CommandKind::StartFlow,
            Command::CancelFlow => CommandKind::CancelFlow,
            Command::SetSlot { .. } => CommandKind::SetSlot,
            Command::AffirmConfirmation => CommandKind::AffirmConfirmation,
            Command::DenyConfirmation => CommandKind::DenyConfirmation,
            Command::ChitChat { .. } => CommandKind::ChitChat,
            Command::Clarify => CommandKind::Clarify,
            Command::Continuation => CommandKind::Continuation,
        }
    }
}

/// The discriminator of a [`Command`], used as the command handler
/// registry's dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    StartFlow,
    CancelFlow,
    SetSlot,
    AffirmConfirmation,
    DenyConfirmation,
    ChitChat,
    Clarify,
    Continuation,
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CommandKind::StartFlow => "start_flow",
            CommandKind::CancelFlow => "cancel_flow",
            CommandKind::SetSlot => "set_slot",
            CommandKind::AffirmConfirmation => "affirm_confirmation",
            CommandKind::DenyConfirmation => "deny_confirmation",
            CommandKind::ChitChat => "chit_chat",
            CommandKind::Clarify => "clarify",
            CommandKind::Continuation => "continuation",
        };
        f.write_str(s)
    }
}
