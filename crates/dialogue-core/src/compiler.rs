//! The step compiler: translates a declarative
//! [`FlowConfig`] into a [`CompiledSubgraph`] of nodes and routing edges.
//!
//! The compiler never mutates its input: `while` desugaring works against a
//! freshly built `Vec<StepConfig>`, never the caller's `FlowConfig::steps`
//!.

use std::collections::{HashMap, HashSet};

use crate::config::{FlowConfig, StepConfig};
use crate::error::CompilationError;
use crate::node_factories::{make_action, make_branch, make_collect, make_confirm, make_say, make_set, CompiledNode};

/// Sentinel name for the synthetic terminal node every flow routes to once
/// it has nothing left to execute.
pub const END_FLOW: &str = "__end_flow__";

/// How a compiled node routes to its successor(s).
#[derive(Debug, Clone)]
pub enum RoutingEdge {
    Direct(String),
    Conditional { cases: HashMap<String, String>, default: Option<String> },
}

/// The executable form of one [`FlowConfig`]: a node per step (plus the
/// `__end_flow__` sentinel) and the edges connecting them.
pub struct CompiledSubgraph {
    pub flow_name: String,
    pub entry: String,
    pub nodes: HashMap<String, CompiledNode>,
    pub edges: HashMap<String, RoutingEdge>,
}

/// Compile `flow` into an executable subgraph.
///
/// Algorithm:
/// 1. Normalize: flatten `while` steps into a guard `branch` plus body
///    steps, with the last body step's `jump_to` wired back to the guard.
/// 2. Build one node per (flattened) step via the matching factory.
/// 3. Wire edges: `jump_to` wins over the textual successor; `branch`
///    steps wire their `cases`/`default` as conditional edges.
/// 4. Insert the `__end_flow__` terminal and route every step with no
///    successor to it.
/// 5. The first flattened step is the entry point.
pub fn compile(flow: &FlowConfig) -> Result<CompiledSubgraph, CompilationError> {
    if flow.steps.is_empty() {
        return Err(CompilationError::EmptyFlow { flow: flow.name.clone() });
    }

    let flat = flatten(&flow.steps, END_FLOW)?;
    let loop_scoped = collect_loop_scoped_names(&flow.steps);

    let mut seen = HashSet::new();
    for step in &flat {
        if !seen.insert(step.step_name().to_string()) {
            return Err(CompilationError::DuplicateStep { flow: flow.name.clone(), step: step.step_name().to_string() });
        }
    }

    let mut nodes = HashMap::new();
    let mut edges = HashMap::new();

    for (i, step) in flat.iter().enumerate() {
        let textual_successor = flat.get(i + 1).map(|s| s.step_name().to_string()).unwrap_or_else(|| END_FLOW.to_string());
        let node = build_node(step, loop_scoped.contains(step.step_name()))?;
        let name = node.name.clone();

        let edge = match step {
            StepConfig::Branch { cases, default, .. } => {
                for target in cases.values().chain(default.iter()) {
                    if target != END_FLOW && !flat.iter().any(|s| s.step_name() == target) {
                        return Err(CompilationError::MissingTarget { step: name.clone(), target: target.clone() });
                    }
                }
                RoutingEdge::Conditional { cases: cases.clone(), default: default.clone() }
            }
            _ => {
                let target = step.jump_to().map(|t| t.to_string()).unwrap_or(textual_successor);
                if target != END_FLOW && !flat.iter().any(|s| s.step_name() == target) {
                    return Err(CompilationError::MissingTarget { step: name.clone(), target });
                }
                RoutingEdge::Direct(step.jump_to().map(|t| t.to_string()).unwrap_or_else(|| {
                    flat.get(i + 1).map(|s| s.step_name().to_string()).unwrap_or_else(|| END_FLOW.to_string())
                }))
            }
        };

        edges.insert(name.clone(), edge);
        nodes.insert(name, node);
    }

    Ok(CompiledSubgraph {
        flow_name: flow.name.clone(),
        entry: flat[0].step_name().to_string(),
        nodes,
        edges,
    })
}

/// Recursively flatten `steps`, desugaring `while` into a guard branch plus
/// body. `exit_target` is where control goes once this entire slice (not
/// just one `while`) finishes — needed so a `while`'s guard `default` can
/// point past the loop rather than at whatever textually follows the guard
/// in the flattened output (which, after flattening, is the loop body).
fn flatten(steps: &[StepConfig], exit_target: &str) -> Result<Vec<StepConfig>, CompilationError> {
    let mut out = Vec::new();
    for (i, step) in steps.iter().enumerate() {
        let successor = steps.get(i + 1).map(|s| s.step_name().to_string()).unwrap_or_else(|| exit_target.to_string());

        match step {
            StepConfig::While { step: name, condition, body } => {
                if body.is_empty() {
                    return Err(CompilationError::EmptyWhileBody { step: name.clone() });
                }
                let mut flattened_body = flatten(body, name)?;
                let first_body_step = flattened_body[0].step_name().to_string();

                let mut cases = HashMap::new();
                cases.insert("true".to_string(), first_body_step);

                out.push(StepConfig::Branch {
                    step: name.clone(),
                    input: condition.clone(),
                    cases,
                    default: Some(successor),
                });

                if let Some(last) = flattened_body.last_mut() {
                    if last.jump_to().is_none() && !matches!(last, StepConfig::Branch { .. } | StepConfig::While { .. }) {
                        last.set_jump_to(name.clone());
                    }
                }
                out.extend(flattened_body);
            }
            other => out.push(other.clone()),
        }
    }
    Ok(out)
}

fn build_node(step: &StepConfig, loop_scoped: bool) -> Result<CompiledNode, CompilationError> {
    let name = step.step_name().to_string();
    let executor = match step {
        StepConfig::Collect { slot, prompt, validator, options, .. } => {
            make_collect(slot.clone(), prompt.clone(), validator.clone(), options.clone())
        }
        StepConfig::Action { call, inputs, map_outputs, .. } => {
            make_action(name.clone(), call.clone(), inputs.clone(), map_outputs.clone(), loop_scoped)
        }
        StepConfig::Say { message, .. } => make_say(name.clone(), message.clone(), loop_scoped),
        StepConfig::Set { slot, value, .. } => make_set(name.clone(), slot.clone(), value.clone(), loop_scoped),
        StepConfig::Branch { input, cases, default, .. } => make_branch(input.clone(), cases.clone(), default.clone()),
        StepConfig::Confirm { slot, prompt, .. } => make_confirm(slot.clone(), prompt.clone()),
        StepConfig::While { .. } => {
            return Err(CompilationError::UnknownStep {
                step: name,
                reason: "while steps must be desugared before node construction".into(),
            })
        }
    };
    Ok(CompiledNode { name, step: step.clone(), executor })
}

/// Collect the step names of every step nested inside any `while` body
/// (at any depth), so those nodes can skip the cross-turn `executed_steps`
/// idempotency guard: a loop body's `say`/`set`/`action` steps must run on
/// every iteration, not only the first time the step name is ever seen.
/// Top-level steps (and a `while`'s own guard step) keep the normal guard.
fn collect_loop_scoped_names(steps: &[StepConfig]) -> HashSet<String> {
    let mut names = HashSet::new();
    for step in steps {
        if let StepConfig::While { body, .. } = step {
            for inner in body {
                names.insert(inner.step_name().to_string());
            }
            names.extend(collect_loop_scoped_names(body));
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;

    fn collect(step: &str, slot: &str) -> StepConfig {
        StepConfig::Collect { step: step.into(), slot: slot.into(), prompt: format!("give me {slot}"), validator: None, options: None, jump_to: None }
    }

    fn say(step: &str, msg: &str) -> StepConfig {
        StepConfig::Say { step: step.into(), message: msg.into(), jump_to: None }
    }

    #[test]
    fn compiles_linear_flow_with_implicit_textual_edges() {
        let flow = FlowConfig {
            name: "book_flight".into(),
            description: "".into(),
            steps: vec![collect("collect_origin", "origin"), collect("collect_destination", "destination")],
        };
        let compiled = compile(&flow).unwrap();
        assert_eq!(compiled.entry, "collect_origin");
        assert!(matches!(compiled.edges["collect_origin"], RoutingEdge::Direct(ref t) if t == "collect_destination"));
        assert!(matches!(compiled.edges["collect_destination"], RoutingEdge::Direct(ref t) if t == END_FLOW));
    }

    #[test]
    fn jump_to_overrides_textual_successor() {
        let mut second = collect("b", "destination");
        second.set_jump_to("a".into()); // irrelevant, just exercising the setter
        let flow = FlowConfig {
            name: "f".into(),
            description: "".into(),
            steps: vec![
                StepConfig::Collect { step: "a".into(), slot: "origin".into(), prompt: "?".into(), validator: None, options: None, jump_to: Some("c".into()) },
                say("b", "skipped"),
                say("c", "landed here"),
            ],
        };
        let compiled = compile(&flow).unwrap();
        assert!(matches!(compiled.edges["a"], RoutingEdge::Direct(ref t) if t == "c"));
    }

    #[test]
    fn missing_branch_target_is_a_compilation_error() {
        let mut cases = Map::new();
        cases.insert("yes".to_string(), "nonexistent".to_string());
        let flow = FlowConfig {
            name: "f".into(),
            description: "".into(),
            steps: vec![StepConfig::Branch { step: "check".into(), input: "$x".into(), cases, default: None }],
        };
        assert!(matches!(compile(&flow), Err(CompilationError::MissingTarget { .. })));
    }

    #[test]
    fn empty_flow_is_rejected() {
        let flow = FlowConfig { name: "f".into(), description: "".into(), steps: vec![] };
        assert!(matches!(compile(&flow), Err(CompilationError::EmptyFlow { .. })));
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let flow = FlowConfig {
            name: "f".into(),
            description: "".into(),
            steps: vec![say("s", "one"), say("s", "two")],
        };
        assert!(matches!(compile(&flow), Err(CompilationError::DuplicateStep { .. })));
    }

    #[test]
    fn while_desugars_into_guard_branch_and_loops_back() {
        let flow = FlowConfig {
            name: "f".into(),
            description: "".into(),
            steps: vec![
                StepConfig::While {
                    step: "loop".into(),
                    condition: "$more == true".into(),
                    body: vec![say("body_say", "iterating")],
                },
                say("after", "done looping"),
            ],
        };
        let compiled = compile(&flow).unwrap();
        assert_eq!(compiled.entry, "loop");

        match &compiled.edges["loop"] {
            RoutingEdge::Conditional { cases, default } => {
                assert_eq!(cases["true"], "body_say");
                assert_eq!(default.as_deref(), Some("after"));
            }
            other => panic!("expected conditional edge, got {other:?}"),
        }
        // body loops back to the guard, not to the textual successor "after"
        assert!(matches!(compiled.edges["body_say"], RoutingEdge::Direct(ref t) if t == "loop"));
    }

    #[test]
    fn compile_does_not_mutate_the_input_config() {
        let flow = FlowConfig {
            name: "f".into(),
            description: "".into(),
            steps: vec![StepConfig::While { step: "loop".into(), condition: "$x".into(), body: vec![say("s", "hi")] }],
        };
        let before = serde_json::to_string(&flow.steps).unwrap();
        let _ = compile(&flow).unwrap();
        let after = serde_json::to_string(&flow.steps).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn compile_is_deterministic() {
        let flow = FlowConfig {
            name: "f".into(),
            description: "".into(),
            steps: vec![collect("a", "origin"), say("b", "ok")],
        };
        let first = compile(&flow).unwrap();
        let second = compile(&flow).unwrap();
        assert_eq!(first.entry, second.entry);
        assert_eq!(first.nodes.len(), second.nodes.len());
    }
}
