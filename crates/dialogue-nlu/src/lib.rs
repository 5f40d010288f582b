//! [`NluService`] implementations for the dialogue runtime.
//!
//! Real intent discovery — intent discovery is explicitly the NLU's job
//! and out of the runtime's scope — is not implemented here either: [`RuleBasedNlu`]
//! is a small, deterministic pattern-matching baseline (regex triggers,
//! affirm/deny word lists) suitable for tests and demos, not a production
//! language-understanding component. [`ScriptedNlu`] is a test double that
//! replays a fixed queue of [`NLUOutput`]s, for integration tests that need
//! to drive the orchestrator through a scripted conversation without wiring
//! up pattern matching at all.

pub mod rule_based;
pub mod scripted;

pub use rule_based::{FlowTrigger, RuleBasedNlu};
pub use scripted::ScriptedNlu;
