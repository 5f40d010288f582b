//! The `Config` schema and its startup validation pass.
//!
//! `dialogue-core::FlowConfig`/`StepConfig` already carry the per-flow
//! step DSL; this module adds the surrounding document — actions, slots,
//! settings — and the cross-reference checks that turn "a deserialized
//! blob" into "a config the runtime will actually serve".

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dialogue_core::config::{FlowConfig, StepConfig};

use crate::error::ConfigError;

/// The root configuration document: flows, the actions/slots catalogs used
/// for cross-reference validation, and runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub flows: HashMap<String, FlowConfig>,
    #[serde(default)]
    pub actions: HashMap<String, ActionConfig>,
    #[serde(default)]
    pub slots: HashMap<String, SlotConfig>,
    #[serde(default)]
    pub settings: Settings,
}

/// The semantic shape of a registered action: declared inputs/outputs, used
/// only for cross-reference validation against `action` steps — the
/// handler implementation itself is registered separately in an
/// `ActionRegistry` (`dialogue-actions`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionConfig {
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// The semantic shape of a declared slot: its value type and the optional
/// normalizer/validator names a `collect` step may reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotConfig {
    #[serde(rename = "type")]
    pub value_type: SlotType,
    #[serde(default)]
    pub normalizer: Option<String>,
    #[serde(default)]
    pub validator: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    String,
    Number,
    Boolean,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub persistence: PersistenceSettings,
    #[serde(default)]
    pub nlu: NluSettings,
    #[serde(default)]
    pub limits: LimitsSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self { persistence: PersistenceSettings::default(), nlu: NluSettings::default(), limits: LimitsSettings::default() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceBackend {
    #[default]
    Memory,
    Embedded,
    Server,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PersistenceSettings {
    #[serde(default)]
    pub backend: PersistenceBackend,
    #[serde(default)]
    pub connection: Option<String>,
}

/// NLU model selection is opaque to the runtime — these fields are carried
/// through to whatever `NluService` the caller constructs, not interpreted
/// here.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NluSettings {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
}

fn default_max_flow_stack_depth() -> usize {
    8
}
fn default_max_digression_depth() -> usize {
    3
}
fn default_max_confirmation_attempts() -> usize {
    3
}
fn default_subgraph_iteration_limit() -> usize {
    25
}
fn default_action_timeout_secs() -> u64 {
    30
}
fn default_error_template() -> String {
    dialogue_core::DEFAULT_ERROR_TEMPLATE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSettings {
    #[serde(default = "default_max_flow_stack_depth")]
    pub max_flow_stack_depth: usize,
    // `max_digression_depth`/`max_confirmation_attempts` are carried
    // through from the config schema but not yet enforced: their policy
    // is an open question beyond the suggested defaults, so there is no
    // mandated behavior to wire them to.
    #[serde(default = "default_max_digression_depth")]
    pub max_digression_depth: usize,
    #[serde(default = "default_max_confirmation_attempts")]
    pub max_confirmation_attempts: usize,
    #[serde(default = "default_subgraph_iteration_limit")]
    pub subgraph_iteration_limit: usize,
    #[serde(default = "default_action_timeout_secs")]
    pub action_timeout_secs: u64,
    #[serde(default = "default_error_template")]
    pub error_template: String,
}

impl Default for LimitsSettings {
    fn default() -> Self {
        Self {
            max_flow_stack_depth: default_max_flow_stack_depth(),
            max_digression_depth: default_max_digression_depth(),
            max_confirmation_attempts: default_max_confirmation_attempts(),
            subgraph_iteration_limit: default_subgraph_iteration_limit(),
            action_timeout_secs: default_action_timeout_secs(),
            error_template: default_error_template(),
        }
    }
}

impl LimitsSettings {
    pub fn to_core_limits(&self) -> dialogue_core::Limits {
        dialogue_core::Limits {
            max_flow_stack_depth: self.max_flow_stack_depth,
            subgraph_iteration_limit: self.subgraph_iteration_limit,
            action_timeout: Duration::from_secs(self.action_timeout_secs),
            error_template: self.error_template.clone(),
        }
    }
}

impl Config {
    /// Startup validation: unknown
    /// step-type rejection is already enforced by `serde` (an unrecognized
    /// `type` tag fails to deserialize); this pass catches the
    /// cross-reference problems serde cannot — dangling `jump_to`/`cases`
    /// targets (deferred to the per-flow compiler, surfaced here as a
    /// batch so every flow's problems are reported at once) plus
    /// slot/action name references that don't resolve against the
    /// `actions`/`slots` catalogs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.flows.is_empty() {
            errors.push("config declares no flows".to_string());
        }

        for (flow_name, flow) in &self.flows {
            if flow_name != &flow.name {
                errors.push(format!("flow key '{flow_name}' does not match its own name field '{}'", flow.name));
            }
            if let Err(e) = dialogue_core::compile(flow) {
                errors.push(format!("flow '{flow_name}': {e}"));
                continue;
            }
            self.validate_step_references(flow_name, &flow.steps, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errors))
        }
    }

    fn validate_step_references(&self, flow_name: &str, steps: &[StepConfig], errors: &mut Vec<String>) {
        for step in steps {
            match step {
                StepConfig::Action { step: step_name, call, inputs, map_outputs, .. } => {
                    match self.actions.get(call) {
                        None => errors.push(format!("flow '{flow_name}' step '{step_name}' calls unknown action '{call}'")),
                        Some(action) => {
                            for input in inputs {
                                if !action.inputs.contains(input) {
                                    errors.push(format!(
                                        "flow '{flow_name}' step '{step_name}' passes undeclared input '{input}' to action '{call}'"
                                    ));
                                }
                            }
                            for output_name in map_outputs.keys() {
                                if !action.outputs.contains(output_name) {
                                    errors.push(format!(
                                        "flow '{flow_name}' step '{step_name}' maps undeclared output '{output_name}' from action '{call}'"
                                    ));
                                }
                            }
                        }
                    }
                }
                StepConfig::Collect { step: step_name, slot, validator, .. } => {
                    if !self.slots.contains_key(slot) {
                        errors.push(format!("flow '{flow_name}' step '{step_name}' collects undeclared slot '{slot}'"));
                    }
                    if let Some(v) = validator {
                        if !matches!(v.as_str(), "non_empty" | "number" | "boolean") {
                            errors.push(format!("flow '{flow_name}' step '{step_name}' references unknown validator '{v}'"));
                        }
                    }
                }
                StepConfig::While { body, .. } => self.validate_step_references(flow_name, body, errors),
                StepConfig::Set { .. } | StepConfig::Say { .. } | StepConfig::Branch { .. } | StepConfig::Confirm { .. } => {}
            }
        }
    }
}
