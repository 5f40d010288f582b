//! Error taxonomy for the dialogue engine.
//!
//! Each concern gets its own `thiserror` enum — `CompilationError` split
//! from `CheckpointError` rather than reaching for one global error type.
//! `ExecutionError` is the umbrella the orchestrator and runtime crate
//! actually match on; everything else converts into it with `#[from]`.

use thiserror::Error;

/// Errors raised while mutating the flow stack or per-flow slots.
#[derive(Debug, Error)]
pub enum FlowManagerError {
    /// `pop_flow` was called with an empty flow stack.
    #[error("cannot pop flow: the flow stack is empty")]
    EmptyStack,

    /// The flow stack would exceed `max_flow_stack_depth`.
    #[error("flow stack depth {depth} exceeds limit {limit}")]
    StackDepthExceeded { depth: usize, limit: usize },
}

/// Errors raised while compiling a declarative flow definition into a
/// [`CompiledSubgraph`](crate::subgraph::CompiledSubgraph).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompilationError {
    #[error("step '{step}' is unknown: {reason}")]
    UnknownStep { step: String, reason: String },

    #[error("step '{step}' references missing target '{target}'")]
    MissingTarget { step: String, target: String },

    #[error("flow '{flow}' has a duplicate step name '{step}'")]
    DuplicateStep { flow: String, step: String },

    #[error("flow '{flow}' has no steps to compile")]
    EmptyFlow { flow: String },

    #[error("while step '{step}' has an empty body")]
    EmptyWhileBody { step: String },
}

/// Errors raised while the command handler registry dispatches a command.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("no handler registered for command type '{0}'")]
    UnknownCommand(String),
}

/// Errors raised while an `action` step invokes its handler.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("action '{name}' is not registered")]
    NotFound { name: String },

    #[error("action '{name}' failed: {message}")]
    HandlerFailed { name: String, message: String },

    #[error("action '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors raised while the NLU collaborator is invoked.
#[derive(Debug, Error)]
pub enum NluError {
    #[error("NLU call failed: {0}")]
    Failed(String),
}

/// Errors surfaced while executing a compiled subgraph or driving the
/// orchestrator.
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    FlowManager(#[from] FlowManagerError),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Nlu(#[from] NluError),

    #[error("no compiled subgraph registered for flow '{0}'")]
    UnknownFlow(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] dialogue_checkpoint::CheckpointError),

    #[error("failed to (de)serialize dialogue state: {0}")]
    StateSerialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;
