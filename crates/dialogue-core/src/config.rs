//! Declarative flow definitions: the input the step compiler
//! consumes. These types are deliberately dumb data — no behavior lives
//! here, only the shape the flow author writes in YAML/TOML.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named, declarative procedure: an ordered sequence of steps executed to
/// satisfy one user intent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub steps: Vec<StepConfig>,
}

/// One typed unit of a flow, discriminated by `type` when serialized.
///
/// See `dialogue_core::compiler` for the behavior each kind compiles to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepConfig {
    Collect {
        step: String,
        slot: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        validator: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jump_to: Option<String>,
    },
    Action {
        step: String,
        call: String,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        map_outputs: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jump_to: Option<String>,
    },
    Say {
        step: String,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jump_to: Option<String>,
    },
    Set {
        step: String,
        slot: String,
        value: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jump_to: Option<String>,
    },
    Branch {
        step: String,
        input: String,
        cases: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    Confirm {
        step: String,
        slot: String,
        prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jump_to: Option<String>,
    },
    While {
        step: String,
        condition: String,
        #[serde(rename = "do")]
        body: Vec<StepConfig>,
    },
}

impl StepConfig {
    pub fn step_name(&self) -> &str {
        match self {
            StepConfig::Collect { step, .. }
            | StepConfig::Action { step, .. }
            | StepConfig::Say { step, .. }
            | StepConfig::Set { step, .. }
            | StepConfig::Branch { step, .. }
            | StepConfig::Confirm { step, .. }
            | StepConfig::While { step, .. } => step,
        }
    }

    pub fn jump_to(&self) -> Option<&str> {
        match self {
            StepConfig::Collect { jump_to, .. }
            | StepConfig::Action { jump_to, .. }
            | StepConfig::Say { jump_to, .. }
            | StepConfig::Set { jump_to, .. }
            | StepConfig::Confirm { jump_to, .. } => jump_to.as_deref(),
            StepConfig::Branch { .. } | StepConfig::While { .. } => None,
        }
    }

    /// Set `jump_to` on any step kind that carries one. No-op on `branch`/
    /// `while`, whose routing is fully determined by cases/guard wiring.
    pub fn set_jump_to(&mut self, target: String) {
        match self {
            StepConfig::Collect { jump_to, .. }
            | StepConfig::Action { jump_to, .. }
            | StepConfig::Say { jump_to, .. }
            | StepConfig::Set { jump_to, .. }
            | StepConfig::Confirm { jump_to, .. } => *jump_to = Some(target),
            StepConfig::Branch { .. } | StepConfig::While { .. } => {}
        }
    }
}
