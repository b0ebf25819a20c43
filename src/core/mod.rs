//! Core domain models for agentflow.
//!
//! This module contains the fundamental data structures shared by both
//! orchestrators and the aggregator: work items, executor responses and the
//! dependency graph.

pub mod graph;
pub mod item;
pub mod response;

pub use graph::ItemGraph;
pub use item::{AgentKind, FailureKind, ItemId, ItemStatus, WorkItem};
pub use response::{FileChange, FileOperation, Response};
