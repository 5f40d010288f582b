//! The dialogue management engine: the flow compiler, the compiled-subgraph
//! runtime, the flow stack & slot manager, and the orchestrator that ties
//! NLU output to flow-stack mutations and subgraph execution.
//!
//! Action handler implementations and NLU implementations are out of scope
//! here — `action` and `nlu` define only the narrow traits this crate calls
//! across (`dialogue-actions` and `dialogue-nlu` provide concrete ones).

pub mod action;
pub mod command;
pub mod compiler;
pub mod config;
pub mod error;
pub mod expr;
pub mod flow_manager;
pub mod handlers;
pub mod message;
pub mod nlu;
pub mod node_factories;
pub mod orchestrator;
pub mod state;
pub mod subgraph;

pub use action::ActionInvoker;
pub use command::{Command, CommandKind};
pub use compiler::{compile, CompiledSubgraph as CompiledFlowGraph, RoutingEdge, END_FLOW};
pub use config::{FlowConfig, StepConfig};
pub use error::{ExecutionError, Result};
pub use handlers::{CommandHandlerRegistry, UnknownCommandPolicy};
pub use message::{Message, Role};
pub use nlu::{DialogueContext, MessageType, NLUOutput, NluService};
pub use orchestrator::{Limits, NoopTurnObserver, Orchestrator, TurnObserver, TurnResult, DEFAULT_ERROR_TEMPLATE};
pub use state::{DialogueState, FlowContext, FlowOutcome, FlowState, PendingTask, StateUpdate};
pub use subgraph::SubgraphRegistry;
