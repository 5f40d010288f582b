//! A deterministic, regex-driven [`NluService`] baseline.
//!
//! Flow triggers are plain regexes with optional named capture groups; a
//! capture named `origin` becomes a `SetSlot { slot_name: "origin", .. }`
//! alongside the `StartFlow` command, which is how the multi-slot
//! extraction scenario ("book a flight from NYC to SFO") is satisfied
//! without a real language model.

use std::collections::HashMap;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use dialogue_core::command::Command;
use dialogue_core::error::NluError;
use dialogue_core::nlu::{DialogueContext, MessageType, NLUOutput, NluService};

/// One flow's set of trigger patterns, checked in registration order.
pub struct FlowTrigger {
    flow_name: String,
    patterns: Vec<Regex>,
}

impl FlowTrigger {
    pub fn new(flow_name: impl Into<String>, patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns.iter().map(|p| Regex::new(p)).collect::<Result<Vec<_>, _>>()?;
        Ok(Self { flow_name: flow_name.into(), patterns })
    }
}

const DEFAULT_AFFIRM_WORDS: &[&str] = &["yes", "yeah", "yep", "correct", "confirm", "sure", "affirmative"];
const DEFAULT_DENY_WORDS: &[&str] = &["no", "nope", "incorrect", "negative", "cancel that"];
const DEFAULT_CANCEL_WORDS: &[&str] = &["never mind", "nevermind", "stop", "cancel", "forget it"];

/// A rule-based [`NluService`]: flow triggers first, then
/// affirm/deny/cancel word lists, then "the raw utterance fills the
/// slot we're waiting on", falling back to an unclear/clarify result.
pub struct RuleBasedNlu {
    triggers: Vec<FlowTrigger>,
    affirm_words: Vec<String>,
    deny_words: Vec<String>,
    cancel_words: Vec<String>,
}

impl Default for RuleBasedNlu {
    fn default() -> Self {
        Self {
            triggers: Vec::new(),
            affirm_words: DEFAULT_AFFIRM_WORDS.iter().map(|s| s.to_string()).collect(),
            deny_words: DEFAULT_DENY_WORDS.iter().map(|s| s.to_string()).collect(),
            cancel_words: DEFAULT_CANCEL_WORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl RuleBasedNlu {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trigger(mut self, trigger: FlowTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }

    fn contains_word(haystack: &str, words: &[String]) -> bool {
        let lower = haystack.to_lowercase();
        words.iter().any(|w| lower.contains(w.as_str()))
    }

    fn match_trigger(&self, message: &str) -> Option<Command> {
        for trigger in &self.triggers {
            for pattern in &trigger.patterns {
                if let Some(captures) = pattern.captures(message) {
                    let mut slots = HashMap::new();
                    for name in pattern.capture_names().flatten() {
                        if let Some(m) = captures.name(name) {
                            slots.insert(name.to_string(), json!(m.as_str()));
                        }
                    }
                    return Some(Command::StartFlow {
                        flow_name: trigger.flow_name.clone(),
                        slots: if slots.is_empty() { None } else { Some(slots) },
                    });
                }
            }
        }
        None
    }
}

#[async_trait]
impl NluService for RuleBasedNlu {
    async fn interpret(&self, user_message: &str, context: &DialogueContext) -> Result<NLUOutput, NluError> {
        let trimmed = user_message.trim();

        if let Some(slot) = &context.waiting_for_slot {
            tracing::debug!(slot, "rule-based nlu: filling waited-on slot from raw utterance");
            return Ok(NLUOutput {
                commands: vec![Command::SetSlot { slot_name: slot.clone(), value: json!(trimmed) }],
                message_type: MessageType::SlotValue,
                confidence: 0.9,
                reasoning: Some(format!("utterance taken verbatim as value for '{slot}'")),
            });
        }

        if Self::contains_word(trimmed, &self.cancel_words) {
            return Ok(NLUOutput {
                commands: vec![Command::CancelFlow],
                message_type: MessageType::Confirmation,
                confidence: 0.8,
                reasoning: None,
            });
        }

        if Self::contains_word(trimmed, &self.affirm_words) {
            return Ok(NLUOutput {
                commands: vec![Command::AffirmConfirmation],
                message_type: MessageType::Confirmation,
                confidence: 0.85,
                reasoning: None,
            });
        }

        if Self::contains_word(trimmed, &self.deny_words) {
            return Ok(NLUOutput {
                commands: vec![Command::DenyConfirmation],
                message_type: MessageType::Confirmation,
                confidence: 0.85,
                reasoning: None,
            });
        }

        if let Some(command) = self.match_trigger(trimmed) {
            return Ok(NLUOutput { commands: vec![command], message_type: MessageType::FlowIntent, confidence: 0.7, reasoning: None });
        }

        if context.active_flow_name.is_some() {
            return Ok(NLUOutput {
                commands: vec![Command::Clarify],
                message_type: MessageType::Unclear,
                confidence: 0.3,
                reasoning: Some("no trigger, slot, or confirmation word matched".to_string()),
            });
        }

        Ok(NLUOutput {
            commands: vec![Command::ChitChat { content: trimmed.to_string() }],
            message_type: MessageType::Digression,
            confidence: 0.3,
            reasoning: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(active: Option<&str>, waiting: Option<&str>) -> DialogueContext {
        DialogueContext {
            active_flow_name: active.map(str::to_string),
            waiting_for_slot: waiting.map(str::to_string),
            available_flows: vec!["book_flight".to_string()],
            available_actions: vec![],
            recent_messages: vec![],
            current_time: Utc::now(),
        }
    }

    fn nlu() -> RuleBasedNlu {
        RuleBasedNlu::new().with_trigger(
            FlowTrigger::new(
                "book_flight",
                &[r"(?i)book.*from\s+(?P<origin>\w+)\s+to\s+(?P<destination>\w+)", r"(?i)book a flight"],
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn waiting_for_slot_fills_it_verbatim() {
        let out = nlu().interpret("NYC", &ctx(Some("book_flight"), Some("origin"))).await.unwrap();
        assert_eq!(out.commands, vec![Command::SetSlot { slot_name: "origin".into(), value: json!("NYC") }]);
        assert_eq!(out.message_type, MessageType::SlotValue);
    }

    #[tokio::test]
    async fn multi_slot_extraction_starts_flow_with_both_slots() {
        let out = nlu()
            .interpret("book a flight from NYC to SFO", &ctx(None, None))
            .await
            .unwrap();
        match &out.commands[0] {
            Command::StartFlow { flow_name, slots } => {
                assert_eq!(flow_name, "book_flight");
                let slots = slots.as_ref().unwrap();
                assert_eq!(slots["origin"], json!("NYC"));
                assert_eq!(slots["destination"], json!("SFO"));
            }
            other => panic!("expected StartFlow, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn bare_trigger_without_captures_starts_flow_with_no_slots() {
        let out = nlu().interpret("book a flight please", &ctx(None, None)).await.unwrap();
        assert_eq!(out.commands, vec![Command::StartFlow { flow_name: "book_flight".into(), slots: None }]);
    }

    #[tokio::test]
    async fn affirm_word_emits_affirm_confirmation() {
        let out = nlu().interpret("yes please", &ctx(Some("book_flight"), None)).await.unwrap();
        assert_eq!(out.commands, vec![Command::AffirmConfirmation]);
    }

    #[tokio::test]
    async fn deny_word_emits_deny_confirmation() {
        let out = nlu().interpret("no, that's wrong", &ctx(Some("book_flight"), None)).await.unwrap();
        assert_eq!(out.commands, vec![Command::DenyConfirmation]);
    }

    #[tokio::test]
    async fn cancel_word_emits_cancel_flow() {
        let out = nlu().interpret("never mind", &ctx(Some("book_flight"), None)).await.unwrap();
        assert_eq!(out.commands, vec![Command::CancelFlow]);
    }

    #[tokio::test]
    async fn unmatched_utterance_during_a_flow_asks_for_clarification() {
        let out = nlu().interpret("purple elephant", &ctx(Some("book_flight"), None)).await.unwrap();
        assert_eq!(out.commands, vec![Command::Clarify]);
        assert_eq!(out.message_type, MessageType::Unclear);
    }

    #[tokio::test]
    async fn unmatched_utterance_with_no_active_flow_is_chit_chat() {
        let out = nlu().interpret("how's the weather", &ctx(None, None)).await.unwrap();
        assert_eq!(out.commands, vec![Command::ChitChat { content: "how's the weather".into() }]);
    }
}
