//! Result aggregation for agentflow.
//!
//! Turns the responses produced by a `Chain` or `ParallelPool` into one
//! `AggregatedResult`: labelled output sections, a merged file list with
//! conflict detection, merged errors, metrics and a summary. Sequential
//! runs get a narrative summary; parallel runs get one grouped by agent
//! kind.

mod merge;
mod result;
mod summary;

pub use merge::{aggregate, aggregate_parallel_results, aggregate_sequential_results};
pub use result::{
    AgentStats, AggregateOptions, AggregatedResult, AggregationMetrics, Conflict, ConflictKind, ConflictStrategy,
    ItemError,
};
