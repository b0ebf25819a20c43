//! Core workflow type definitions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{ItemId, ItemStatus, Response};

/// Identifies one workflow run; checkpoints are stored under it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowId(pub Uuid);

impl WorkflowId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Leading eight hex digits, for log lines.
    pub fn short(&self) -> String {
        let mut buf = Uuid::encode_buffer();
        self.0.simple().encode_lower(&mut buf)[..8].to_owned()
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for WorkflowId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl std::str::FromStr for WorkflowId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Status of a workflow run.
///
/// `Partial` is always distinct from `Completed` so a caller can decide
/// whether to continue a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created but not yet started.
    #[default]
    Pending,
    /// Items are executing.
    Running,
    /// Every item completed.
    Completed,
    /// Some items completed, others failed or were skipped.
    Partial,
    /// No item completed.
    Failed,
}

impl WorkflowStatus {
    /// Terminal status for a run in which `completed` of `total` items
    /// completed. An empty run counts as completed.
    pub fn from_counts(completed: usize, total: usize) -> Self {
        if completed == total {
            WorkflowStatus::Completed
        } else if completed == 0 {
            WorkflowStatus::Failed
        } else {
            WorkflowStatus::Partial
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Partial | WorkflowStatus::Failed
        )
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowStatus::Pending => write!(f, "pending"),
            WorkflowStatus::Running => write!(f, "running"),
            WorkflowStatus::Completed => write!(f, "completed"),
            WorkflowStatus::Partial => write!(f, "partial"),
            WorkflowStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Final state of one item after a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_id: ItemId,
    pub status: ItemStatus,
}

/// Result of executing a workflow with either orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    /// The workflow that ran.
    pub workflow_id: WorkflowId,
    /// Overall status.
    pub status: WorkflowStatus,
    /// Final state of every item, in insertion order.
    pub outcomes: Vec<ItemOutcome>,
    /// One response per completed or failed item, including synthesized
    /// failure responses. Chain: execution order, with items restored from
    /// a checkpoint first. Pool: completion order.
    pub responses: Vec<Response>,
    /// Items handed to the executor during this run, in dispatch order.
    pub executed: Vec<ItemId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkflowResult {
    /// Final status of an item, if it belongs to the workflow.
    pub fn status_of(&self, id: &ItemId) -> Option<&ItemStatus> {
        self.outcomes
            .iter()
            .find(|outcome| &outcome.item_id == id)
            .map(|outcome| &outcome.status)
    }

    /// Response of a completed item.
    pub fn response_for(&self, id: &ItemId) -> Option<&Response> {
        self.responses.iter().find(|response| &response.item_id == id)
    }

    pub fn completed_ids(&self) -> Vec<&ItemId> {
        self.ids_where(|status| matches!(status, ItemStatus::Completed))
    }

    pub fn failed_ids(&self) -> Vec<&ItemId> {
        self.ids_where(|status| matches!(status, ItemStatus::Failed { .. }))
    }

    pub fn skipped_ids(&self) -> Vec<&ItemId> {
        self.ids_where(|status| matches!(status, ItemStatus::Skipped { .. }))
    }

    /// Whether every item completed.
    pub fn is_success(&self) -> bool {
        self.status == WorkflowStatus::Completed
    }

    /// Run time of the whole workflow.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    fn ids_where(&self, predicate: impl Fn(&ItemStatus) -> bool) -> Vec<&ItemId> {
        self.outcomes
            .iter()
            .filter(|outcome| predicate(&outcome.status))
            .map(|outcome| &outcome.item_id)
            .collect()
    }
}
