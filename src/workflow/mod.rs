//! Workflow-level types for agentflow.
//!
//! This module provides workflow identity and status, checkpoints and the
//! stores that persist them, and the canned templates that produce
//! preconfigured work item sequences.

mod checkpoint;
mod store;
mod templates;
mod types;

pub use checkpoint::WorkflowCheckpoint;
pub use store::{CheckpointStore, FileCheckpointStore, InMemoryCheckpointStore};
pub use templates::WorkflowTemplate;
pub use types::{ItemOutcome, WorkflowId, WorkflowResult, WorkflowStatus};
