//! A test double that replays a fixed queue of [`NLUOutput`]s, one per
//! `interpret` call, regardless of the message or context it is given.
//!
//! Mirrors the scripted NLU double that `dialogue-core::orchestrator`'s own
//! test module defines inline; this is the reusable, public version other
//! crates' integration tests build on instead of redefining it.

use async_trait::async_trait;
use tokio::sync::Mutex;

use dialogue_core::error::NluError;
use dialogue_core::nlu::{DialogueContext, MessageType, NLUOutput, NluService};

pub struct ScriptedNlu {
    outputs: Mutex<Vec<NLUOutput>>,
}

impl ScriptedNlu {
    /// `outputs` is consumed front-to-back, one entry per call to
    /// `interpret`. Once exhausted, further calls return an empty/`Unclear`
    /// output rather than panicking, so a script that under-counts turns
    /// degrades gracefully in a long-running demo.
    pub fn new(outputs: Vec<NLUOutput>) -> Self {
        let mut outputs = outputs;
        outputs.reverse();
        Self { outputs: Mutex::new(outputs) }
    }
}

#[async_trait]
impl NluService for ScriptedNlu {
    async fn interpret(&self, _user_message: &str, _context: &DialogueContext) -> Result<NLUOutput, NluError> {
        let mut outputs = self.outputs.lock().await;
        Ok(outputs.pop().unwrap_or_else(|| NLUOutput::empty(MessageType::Unclear)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use dialogue_core::command::Command;

    fn ctx() -> DialogueContext {
        DialogueContext {
            active_flow_name: None,
            waiting_for_slot: None,
            available_flows: vec![],
            available_actions: vec![],
            recent_messages: vec![],
            current_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn replays_outputs_in_order_then_falls_back_to_unclear() {
        let nlu = ScriptedNlu::new(vec![NLUOutput {
            commands: vec![Command::StartFlow { flow_name: "book_flight".into(), slots: None }],
            message_type: MessageType::FlowIntent,
            confidence: 1.0,
            reasoning: None,
        }]);

        let first = nlu.interpret("anything", &ctx()).await.unwrap();
        assert_eq!(first.message_type, MessageType::FlowIntent);

        let second = nlu.interpret("anything else", &ctx()).await.unwrap();
        assert_eq!(second.message_type, MessageType::Unclear);
        assert!(second.commands.is_empty());
    }
}
