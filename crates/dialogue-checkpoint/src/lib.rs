//! # dialogue-checkpoint
//!
//! Storage abstraction for persisting and restoring [`DialogueState`] snapshots
//! keyed by user identity.
//!
//! This crate defines only the [`CheckpointSaver`] trait and two concrete
//! backends (in-memory, embedded SQLite). It knows nothing about flows,
//! slots, or commands — those live in `dialogue-core`, which depends on this
//! crate rather than the other way around, keeping checkpoint storage
//! decoupled from graph state.

pub mod error;
pub mod memory;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointMetadata, CheckpointSaver};
