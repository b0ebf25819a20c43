pub mod aggregation;
pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod workflow;

pub use aggregation::{
    aggregate, aggregate_parallel_results, aggregate_sequential_results, AggregateOptions, AggregatedResult,
    ConflictStrategy,
};
pub use config::Config;
pub use crate::core::{AgentKind, FileOperation, ItemId, ItemStatus, Response, WorkItem};
pub use error::{Error, Result};
pub use orchestration::{Chain, ExecutorError, ItemObserver, ParallelPool, PoolConfig, TaskExecutor};
pub use workflow::{WorkflowId, WorkflowResult, WorkflowStatus, WorkflowTemplate};
