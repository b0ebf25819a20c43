//! Orchestration layer for agentflow.
//!
//! This module provides the two ways of running work items: the `Chain`,
//! which runs a dependency graph one item at a time with checkpointing, and
//! the `ParallelPool`, which runs independent items under a concurrency
//! limit. Both hand items to a caller-supplied `TaskExecutor` and report
//! progress through an `ItemObserver`.

mod chain;
mod executor;
mod observer;
mod pool;

pub use chain::Chain;
pub use executor::{ExecutorError, ItemFailure, TaskExecutor};
pub use observer::{CallbackObserver, ChannelObserver, ItemObserver, NoopObserver, WorkflowEvent};
pub use pool::{
    ParallelPool, PoolConfig, DEFAULT_MAX_WORKERS, DEFAULT_PER_ITEM_TIMEOUT_SECS, DEFAULT_POOL_TIMEOUT_SECS,
    MAX_WORKERS_CEILING,
};
