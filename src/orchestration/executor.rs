//! The task executor capability and the rules for turning one execution
//! attempt into a response and an item status.

use std::any::Any;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{FailureKind, ItemStatus, Response, WorkItem};

/// Error returned by a task executor.
///
/// A `permanent` error tells a resumed Chain not to retry the item.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{message}")]
pub struct ExecutorError {
    pub message: String,
    #[serde(default)]
    pub permanent: bool,
}

impl ExecutorError {
    /// A failure worth retrying on resume.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: false,
        }
    }

    /// A failure that retrying will not fix.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            permanent: true,
        }
    }
}

impl From<String> for ExecutorError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for ExecutorError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

/// Executes one work item.
///
/// Implementations wrap whatever actually runs an agent (a subprocess, an
/// HTTP API, a test double). They are shared between concurrent pool
/// workers, hence `Send + Sync`.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, item: &WorkItem) -> std::result::Result<Response, ExecutorError>;
}

/// Details of an item failure, as handed to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    pub error: String,
    pub kind: FailureKind,
    /// Whether a resumed run should leave the item failed.
    pub permanent: bool,
}

/// What happened when an item was handed to the executor.
pub(crate) enum ExecOutcome {
    Returned(std::result::Result<Response, ExecutorError>),
    Panicked(String),
    TimedOut(Duration),
}

/// The recorded result of one execution attempt.
pub(crate) struct Settled {
    pub response: Response,
    pub status: ItemStatus,
    pub failure: Option<ItemFailure>,
}

/// Turn an execution outcome into exactly one response and a terminal status.
///
/// Executor errors, panics and timeouts get a synthesized failure response
/// so every dispatched item contributes to aggregation. A response that
/// reports `success == false` counts as an execution failure.
pub(crate) fn settle(item: &WorkItem, outcome: ExecOutcome, elapsed: Duration) -> Settled {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);

    let (mut response, failure) = match outcome {
        ExecOutcome::Returned(Ok(response)) if response.success => (response, None),
        ExecOutcome::Returned(Ok(response)) => {
            let error = if response.errors.is_empty() {
                "executor reported failure".to_string()
            } else {
                response.errors.join("; ")
            };
            let failure = ItemFailure {
                error,
                kind: FailureKind::Execution,
                permanent: false,
            };
            (response, Some(failure))
        }
        ExecOutcome::Returned(Err(err)) => failed_response(item, err.message, FailureKind::Execution, err.permanent),
        ExecOutcome::Panicked(message) => failed_response(
            item,
            format!("executor panicked: {}", message),
            FailureKind::Execution,
            false,
        ),
        ExecOutcome::TimedOut(limit) => failed_response(
            item,
            format!("timed out after {:?}", limit),
            FailureKind::Timeout,
            false,
        ),
    };

    if response.item_id != item.item_id {
        tracing::warn!(
            item = %item.item_id,
            reported = %response.item_id,
            "executor response names a different item; using the dispatched id"
        );
        response.item_id = item.item_id.clone();
    }
    if response.duration_ms == 0 {
        response.duration_ms = elapsed_ms;
    }

    let status = match &failure {
        None => ItemStatus::Completed,
        Some(failure) => ItemStatus::Failed {
            error: failure.error.clone(),
            kind: failure.kind,
        },
    };

    Settled {
        response,
        status,
        failure,
    }
}

fn failed_response(
    item: &WorkItem,
    error: String,
    kind: FailureKind,
    permanent: bool,
) -> (Response, Option<ItemFailure>) {
    let response = Response::failure(item.item_id.clone(), item.task_kind, error.clone());
    (
        response,
        Some(ItemFailure {
            error,
            kind,
            permanent,
        }),
    )
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
