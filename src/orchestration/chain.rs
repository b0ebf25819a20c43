//! Sequential, dependency-ordered orchestrator.
//!
//! The Chain runs its items one at a time in a stable topological order,
//! persists a checkpoint after every item reaches a terminal state, and
//! resumes from the last checkpoint of the same workflow id when built with
//! a store. An item's failure is isolated to the item and its dependents.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::FutureExt;

use crate::core::{FailureKind, ItemGraph, ItemId, ItemStatus, Response, WorkItem};
use crate::error::{Error, Result};
use crate::workflow::{
    CheckpointStore, ItemOutcome, WorkflowCheckpoint, WorkflowId, WorkflowResult, WorkflowStatus,
};

use super::executor::{panic_message, settle, ExecOutcome, TaskExecutor};
use super::observer::{ItemObserver, Notifier};

/// Sequential orchestrator over a dependency graph of work items.
///
/// # Example
///
/// ```ignore
/// let store = Arc::new(InMemoryCheckpointStore::new());
/// let mut chain = Chain::with_store(WorkflowId::new(), executor, store).await?;
/// for item in WorkflowTemplate::FeatureDevelopment.build("add login") {
///     chain.add(item)?;
/// }
/// let result = chain.execute(&NoopObserver).await?;
/// ```
pub struct Chain {
    workflow_id: WorkflowId,
    /// Items in insertion order; the arena the dependency graph indexes into.
    items: Vec<WorkItem>,
    ids: HashSet<ItemId>,
    executor: Arc<dyn TaskExecutor>,
    store: Option<Arc<dyn CheckpointStore>>,
    /// Checkpoint loaded at construction, replaced after every run.
    checkpoint: Option<WorkflowCheckpoint>,
    /// Failed items that must not be retried.
    permanent: HashSet<ItemId>,
}

impl Chain {
    /// Create a Chain without checkpointing.
    pub fn new(workflow_id: WorkflowId, executor: Arc<dyn TaskExecutor>) -> Self {
        Self {
            workflow_id,
            items: Vec::new(),
            ids: HashSet::new(),
            executor,
            store: None,
            checkpoint: None,
            permanent: HashSet::new(),
        }
    }

    /// Create a Chain that checkpoints into `store`.
    ///
    /// If the store already holds a checkpoint for `workflow_id`, the next
    /// `execute` resumes from it: completed items are not re-run and failed
    /// items are retried unless they were marked permanent.
    pub async fn with_store(
        workflow_id: WorkflowId,
        executor: Arc<dyn TaskExecutor>,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let checkpoint = store.load(&workflow_id).await?;
        if let Some(cp) = &checkpoint {
            tracing::info!(
                workflow = %workflow_id.short(),
                completed = cp.completed_item_ids.len(),
                failed = cp.failed_item_ids.len(),
                "resuming chain from checkpoint"
            );
        }

        let mut chain = Self::new(workflow_id, executor);
        chain.permanent = checkpoint
            .as_ref()
            .map(|cp| cp.permanent_failure_ids.iter().cloned().collect())
            .unwrap_or_default();
        chain.store = Some(store);
        chain.checkpoint = checkpoint;
        Ok(chain)
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    /// Items in insertion order.
    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The checkpoint the next run resumes from, if any.
    pub fn checkpoint(&self) -> Option<&WorkflowCheckpoint> {
        self.checkpoint.as_ref()
    }

    /// Add an item.
    ///
    /// # Errors
    /// `DuplicateItem` if an item with the same id was already added.
    pub fn add(&mut self, item: WorkItem) -> Result<()> {
        if !self.ids.insert(item.item_id.clone()) {
            return Err(Error::DuplicateItem(item.item_id));
        }
        tracing::debug!(
            workflow = %self.workflow_id.short(),
            item = %item.item_id,
            dependencies = item.dependencies.len(),
            "item added to chain"
        );
        self.items.push(item);
        Ok(())
    }

    /// Add several items, stopping at the first error.
    pub fn add_all(&mut self, items: impl IntoIterator<Item = WorkItem>) -> Result<()> {
        items.into_iter().try_for_each(|item| self.add(item))
    }

    /// Keep a failed item failed on resume instead of retrying it.
    pub fn mark_permanent(&mut self, id: impl Into<ItemId>) {
        self.permanent.insert(id.into());
    }

    /// Run every item in dependency order.
    ///
    /// # Errors
    /// Configuration errors (`UnknownDependency`, `CyclicDependency`) are
    /// returned before any item runs. Executor failures never surface here;
    /// they are recorded in the returned [`WorkflowResult`].
    pub async fn execute(&mut self, observer: &dyn ItemObserver) -> Result<WorkflowResult> {
        let graph = ItemGraph::build(&self.items)?;
        let order = graph.topological_order()?;

        let notifier = Notifier::new(observer);
        let started_at = Utc::now();
        let mut permanent = self.permanent.clone();
        let mut statuses = vec![ItemStatus::Pending; self.items.len()];
        let mut responses: Vec<Response> = Vec::new();
        let mut executed: Vec<ItemId> = Vec::new();

        let restored = self.restore(&permanent, &mut statuses, &mut responses);
        tracing::info!(
            workflow = %self.workflow_id.short(),
            items = self.items.len(),
            restored,
            "chain starting"
        );

        for pos in order {
            if statuses[pos].is_terminal() {
                continue;
            }
            let item = &self.items[pos];

            let blocker = item
                .dependencies
                .iter()
                .filter_map(|dep| graph.position(dep).map(|dep_pos| (dep, dep_pos)))
                .find(|(_, dep_pos)| statuses[*dep_pos].blocks_dependents());
            if let Some((dep, dep_pos)) = blocker {
                let reason = format!("dependency {} {}", dep, describe(&statuses[dep_pos]));
                tracing::warn!(item = %item.item_id, %reason, "skipping item");
                notifier.skipped(item, &reason);
                statuses[pos] = ItemStatus::Skipped { reason };
                let checkpoint = self.snapshot(&statuses, &responses, &permanent, WorkflowStatus::Running);
                self.save(&checkpoint).await;
                continue;
            }

            statuses[pos] = ItemStatus::Running;
            executed.push(item.item_id.clone());
            notifier.started(item);
            tracing::debug!(item = %item.item_id, kind = %item.task_kind, "dispatching item");

            let clock = Instant::now();
            let outcome = match AssertUnwindSafe(self.executor.execute(item))
                .catch_unwind()
                .await
            {
                Ok(result) => ExecOutcome::Returned(result),
                Err(payload) => ExecOutcome::Panicked(panic_message(payload.as_ref())),
            };
            let settled = settle(item, outcome, clock.elapsed());

            match &settled.failure {
                None => {
                    tracing::debug!(
                        item = %item.item_id,
                        duration_ms = settled.response.duration_ms,
                        "item completed"
                    );
                    notifier.complete(item, &settled.response);
                }
                Some(failure) => {
                    tracing::warn!(item = %item.item_id, error = %failure.error, "item failed");
                    if failure.permanent {
                        permanent.insert(item.item_id.clone());
                    }
                    notifier.failed(item, failure);
                }
            }
            statuses[pos] = settled.status;
            responses.push(settled.response);

            let checkpoint = self.snapshot(&statuses, &responses, &permanent, WorkflowStatus::Running);
            self.save(&checkpoint).await;
        }

        let completed = statuses
            .iter()
            .filter(|status| matches!(status, ItemStatus::Completed))
            .count();
        let status = WorkflowStatus::from_counts(completed, self.items.len());
        let checkpoint = self.snapshot(&statuses, &responses, &permanent, status);
        self.save(&checkpoint).await;
        self.checkpoint = Some(checkpoint);
        self.permanent = permanent;

        tracing::info!(
            workflow = %self.workflow_id.short(),
            %status,
            completed,
            total = self.items.len(),
            "chain finished"
        );
        notifier.finished(&self.workflow_id, status);

        let outcomes = self
            .items
            .iter()
            .zip(statuses)
            .map(|(item, status)| ItemOutcome {
                item_id: item.item_id.clone(),
                status,
            })
            .collect();

        Ok(WorkflowResult {
            workflow_id: self.workflow_id,
            status,
            outcomes,
            responses,
            executed,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Apply the loaded checkpoint to a fresh status vector. Returns how many
    /// items were restored to a terminal state.
    fn restore(
        &self,
        permanent: &HashSet<ItemId>,
        statuses: &mut [ItemStatus],
        responses: &mut Vec<Response>,
    ) -> usize {
        let Some(checkpoint) = &self.checkpoint else {
            return 0;
        };

        let mut restored = 0;
        for (pos, item) in self.items.iter().enumerate() {
            let id = &item.item_id;
            if checkpoint.is_completed(id) {
                statuses[pos] = ItemStatus::Completed;
                if let Some(response) = checkpoint.response_for(id) {
                    responses.push(response.clone());
                }
                restored += 1;
            } else if checkpoint.is_failed(id) && permanent.contains(id) {
                statuses[pos] = ItemStatus::Failed {
                    error: "failed permanently in a previous run".to_string(),
                    kind: FailureKind::Execution,
                };
                restored += 1;
            }
        }
        restored
    }

    fn snapshot(
        &self,
        statuses: &[ItemStatus],
        responses: &[Response],
        permanent: &HashSet<ItemId>,
        phase: WorkflowStatus,
    ) -> WorkflowCheckpoint {
        WorkflowCheckpoint::capture(
            self.workflow_id,
            phase,
            self.items.iter().map(|item| &item.item_id).zip(statuses.iter()),
            permanent.iter(),
            responses,
        )
    }

    /// Write a checkpoint if a store is configured.
    ///
    /// A failed write is logged rather than returned: the in-memory run is
    /// still correct and the next successful write supersedes it.
    async fn save(&self, checkpoint: &WorkflowCheckpoint) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.workflow_id, checkpoint).await {
                tracing::error!(workflow = %self.workflow_id.short(), error = %e, "checkpoint write failed");
            }
        }
    }
}

fn describe(status: &ItemStatus) -> &'static str {
    match status {
        ItemStatus::Failed { .. } => "failed",
        ItemStatus::Skipped { .. } => "was skipped",
        _ => "did not complete",
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("workflow_id", &self.workflow_id)
            .field("items", &self.items.len())
            .field("has_store", &self.store.is_some())
            .field("has_checkpoint", &self.checkpoint.is_some())
            .finish()
    }
}
