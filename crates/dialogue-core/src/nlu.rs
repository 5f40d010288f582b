//! The NLU collaborator contract.
//!
//! NLU implementation (prompt construction, the LLM call itself) is
//! explicitly out of scope. This module defines the typed boundary the
//! `understand` orchestrator node calls across: [`NluService::interpret`]
//! takes the raw user utterance plus a [`DialogueContext`] snapshot and
//! returns an [`NLUOutput`]. `dialogue-nlu` provides implementations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::NluError;

/// What the NLU needs to know about the dialogue to interpret the current
/// utterance: the active flow (if any), what slot is being collected (if
/// waiting), the catalog of available flows/actions, and recent history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueContext {
    pub active_flow_name: Option<String>,
    pub waiting_for_slot: Option<String>,
    pub available_flows: Vec<String>,
    pub available_actions: Vec<String>,
    pub recent_messages: Vec<String>,
    pub current_time: DateTime<Utc>,
}

/// The coarse category of what a turn's utterance was, alongside the typed
/// commands NLU extracted from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    FlowIntent,
    SlotValue,
    Confirmation,
    Digression,
    Unclear,
}

/// The result of one NLU call: the commands it extracted, its confidence,
/// and (optionally) the reasoning behind the interpretation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NLUOutput {
    pub commands: Vec<Command>,
    pub message_type: MessageType,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl NLUOutput {
    pub fn empty(message_type: MessageType) -> Self {
        Self { commands: Vec::new(), message_type, confidence: 0.0, reasoning: None }
    }
}

/// The NLU collaborator boundary: interpret a user utterance against the
/// current dialogue context.
#[async_trait]
pub trait NluService: Send + Sync {
    async fn interpret(&self, user_message: &str, context: &DialogueContext) -> Result<NLUOutput, NluError>;
}
