//! Workflow checkpoints.
//!
//! A checkpoint is a snapshot of a run's progress. The Chain writes one
//! after every item reaches a terminal state, the Pool writes one when the
//! whole batch is terminal. Checkpoints are read back once, when an
//! orchestrator resumes an interrupted run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{ItemId, ItemStatus, Response};

use super::{WorkflowId, WorkflowStatus};

/// Snapshot of a workflow's progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    /// The workflow this checkpoint belongs to.
    pub workflow_id: WorkflowId,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
    /// Items that completed successfully.
    pub completed_item_ids: Vec<ItemId>,
    /// Items that failed.
    pub failed_item_ids: Vec<ItemId>,
    /// Items not yet terminal, and items skipped in this run. Skips are
    /// re-evaluated on resume.
    pub pending_item_ids: Vec<ItemId>,
    /// Failed items that must not be retried on resume.
    #[serde(default)]
    pub permanent_failure_ids: Vec<ItemId>,
    /// Run status when the snapshot was taken.
    pub phase: WorkflowStatus,
    /// Responses of the completed items.
    #[serde(default)]
    pub responses: Vec<Response>,
}

impl WorkflowCheckpoint {
    /// An empty checkpoint for the given workflow.
    pub fn new(workflow_id: WorkflowId, phase: WorkflowStatus) -> Self {
        Self {
            workflow_id,
            timestamp: Utc::now(),
            completed_item_ids: Vec::new(),
            failed_item_ids: Vec::new(),
            pending_item_ids: Vec::new(),
            permanent_failure_ids: Vec::new(),
            phase,
            responses: Vec::new(),
        }
    }

    /// Build a checkpoint from per-item statuses.
    ///
    /// `statuses` is visited in order, so the id lists keep the caller's
    /// item order.
    pub fn capture<'a>(
        workflow_id: WorkflowId,
        phase: WorkflowStatus,
        statuses: impl IntoIterator<Item = (&'a ItemId, &'a ItemStatus)>,
        permanent_failures: impl IntoIterator<Item = &'a ItemId>,
        responses: &[Response],
    ) -> Self {
        let mut checkpoint = Self::new(workflow_id, phase);
        for (id, status) in statuses {
            match status {
                ItemStatus::Completed => checkpoint.completed_item_ids.push(id.clone()),
                ItemStatus::Failed { .. } => checkpoint.failed_item_ids.push(id.clone()),
                ItemStatus::Pending | ItemStatus::Running | ItemStatus::Skipped { .. } => {
                    checkpoint.pending_item_ids.push(id.clone())
                }
            }
        }
        let permanent: Vec<&ItemId> = permanent_failures.into_iter().collect();
        checkpoint.permanent_failure_ids = checkpoint
            .failed_item_ids
            .iter()
            .filter(|id| permanent.contains(id))
            .cloned()
            .collect();
        checkpoint.responses = responses
            .iter()
            .filter(|response| checkpoint.completed_item_ids.contains(&response.item_id))
            .cloned()
            .collect();
        checkpoint
    }

    pub fn is_completed(&self, id: &ItemId) -> bool {
        self.completed_item_ids.contains(id)
    }

    pub fn is_failed(&self, id: &ItemId) -> bool {
        self.failed_item_ids.contains(id)
    }

    /// Whether a failed item was marked as not worth retrying.
    pub fn is_permanent_failure(&self, id: &ItemId) -> bool {
        self.permanent_failure_ids.contains(id)
    }

    /// Stored response of a completed item.
    pub fn response_for(&self, id: &ItemId) -> Option<&Response> {
        self.responses.iter().find(|response| &response.item_id == id)
    }
}
