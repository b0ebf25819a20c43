//! Bounded-concurrency pool for independent work items.
//!
//! The `ParallelPool` runs items that have no dependencies on each other,
//! never more than `max_workers` at once. Results are streamed to the
//! observer as each execution finishes, so completion order, not submission
//! order, drives notifications. A per-item timeout fails a single item; the
//! pool timeout finalizes the whole run as partial.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::core::{FailureKind, ItemId, ItemStatus, Response, WorkItem};
use crate::error::{Error, Result};
use crate::workflow::{
    CheckpointStore, ItemOutcome, WorkflowCheckpoint, WorkflowId, WorkflowResult, WorkflowStatus,
};

use super::executor::{panic_message, settle, ExecOutcome, ItemFailure, Settled, TaskExecutor};
use super::observer::{ItemObserver, Notifier};

/// Hard upper bound on concurrent executions, whatever the caller asks for.
pub const MAX_WORKERS_CEILING: usize = 10;

/// Default number of concurrent executions.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default time one item may run before it is failed.
pub const DEFAULT_PER_ITEM_TIMEOUT_SECS: u64 = 300; // 5 minutes

/// Default time the whole pool may run.
pub const DEFAULT_POOL_TIMEOUT_SECS: u64 = 1800; // 30 minutes

/// Deadline used when `pool_timeout` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// Limits for one pool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    max_workers: usize,
    /// Time one item may run before it is failed with a timeout.
    pub per_item_timeout: Duration,
    /// Time the whole run may take before in-flight items are cancelled.
    pub pool_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_workers: DEFAULT_MAX_WORKERS,
            per_item_timeout: Duration::from_secs(DEFAULT_PER_ITEM_TIMEOUT_SECS),
            pool_timeout: Duration::from_secs(DEFAULT_POOL_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Config with the given worker count, clamped to `1..=MAX_WORKERS_CEILING`.
    pub fn new(max_workers: usize) -> Self {
        Self::default().with_max_workers(max_workers)
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        let clamped = max_workers.clamp(1, MAX_WORKERS_CEILING);
        if clamped != max_workers {
            tracing::debug!(requested = max_workers, effective = clamped, "max_workers clamped");
        }
        self.max_workers = clamped;
        self
    }

    pub fn with_per_item_timeout(mut self, timeout: Duration) -> Self {
        self.per_item_timeout = timeout;
        self
    }

    pub fn with_pool_timeout(mut self, timeout: Duration) -> Self {
        self.pool_timeout = timeout;
        self
    }

    /// Effective worker count (always within the ceiling).
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

/// Messages from worker tasks back to the coordinating loop.
enum PoolMessage {
    Started(usize),
    Finished(usize, Settled),
}

/// Runs independent items concurrently.
///
/// # Example
///
/// ```ignore
/// let mut pool = ParallelPool::new(WorkflowId::new(), executor, PoolConfig::new(3));
/// for item in WorkflowTemplate::ParallelReview { reviewers: 5 }.build("PR #12") {
///     pool.add(item)?;
/// }
/// let result = pool.execute(&NoopObserver).await?;
/// ```
pub struct ParallelPool {
    workflow_id: WorkflowId,
    config: PoolConfig,
    items: Vec<WorkItem>,
    ids: HashSet<ItemId>,
    executor: Arc<dyn TaskExecutor>,
    store: Option<Arc<dyn CheckpointStore>>,
    checkpoint: Option<WorkflowCheckpoint>,
}

impl ParallelPool {
    /// Create a pool without checkpointing.
    pub fn new(workflow_id: WorkflowId, executor: Arc<dyn TaskExecutor>, config: PoolConfig) -> Self {
        Self {
            workflow_id,
            config,
            items: Vec::new(),
            ids: HashSet::new(),
            executor,
            store: None,
            checkpoint: None,
        }
    }

    /// Create a pool that writes its terminal checkpoint into `store`.
    ///
    /// Items recorded as completed in an existing checkpoint for the same
    /// workflow are not run again; failed ones are retried unless permanent.
    pub async fn with_store(
        workflow_id: WorkflowId,
        executor: Arc<dyn TaskExecutor>,
        config: PoolConfig,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let checkpoint = store.load(&workflow_id).await?;
        let mut pool = Self::new(workflow_id, executor, config);
        pool.store = Some(store);
        pool.checkpoint = checkpoint;
        Ok(pool)
    }

    pub fn workflow_id(&self) -> &WorkflowId {
        &self.workflow_id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add an independent item.
    ///
    /// # Errors
    /// - `DuplicateItem` if an item with the same id was already added
    /// - `UnsupportedDependency` if the item declares dependencies
    pub fn add(&mut self, item: WorkItem) -> Result<()> {
        if item.has_dependencies() {
            return Err(Error::UnsupportedDependency(item.item_id));
        }
        if !self.ids.insert(item.item_id.clone()) {
            return Err(Error::DuplicateItem(item.item_id));
        }
        self.items.push(item);
        Ok(())
    }

    /// Add several items, stopping at the first error.
    pub fn add_all(&mut self, items: impl IntoIterator<Item = WorkItem>) -> Result<()> {
        items.into_iter().try_for_each(|item| self.add(item))
    }

    /// Run every item, at most `max_workers` at a time.
    ///
    /// Never returns an execution failure as `Err`; failures and timeouts
    /// are recorded per item in the returned [`WorkflowResult`].
    pub async fn execute(&mut self, observer: &dyn ItemObserver) -> Result<WorkflowResult> {
        let notifier = Notifier::new(observer);
        let started_at = Utc::now();
        let mut statuses = vec![ItemStatus::Pending; self.items.len()];
        let mut responses: Vec<Response> = Vec::new();
        let mut executed: Vec<ItemId> = Vec::new();
        let mut permanent: HashSet<ItemId> = HashSet::new();

        if let Some(checkpoint) = &self.checkpoint {
            for (pos, item) in self.items.iter().enumerate() {
                if checkpoint.is_completed(&item.item_id) {
                    statuses[pos] = ItemStatus::Completed;
                    responses.extend(checkpoint.response_for(&item.item_id).cloned());
                } else if checkpoint.is_permanent_failure(&item.item_id) {
                    statuses[pos] = ItemStatus::Failed {
                        error: "failed permanently in a previous run".to_string(),
                        kind: FailureKind::Execution,
                    };
                    permanent.insert(item.item_id.clone());
                }
            }
        }

        let workers = self.config.max_workers();
        tracing::info!(
            workflow = %self.workflow_id.short(),
            items = self.items.len(),
            workers,
            "pool starting"
        );

        let semaphore = Arc::new(Semaphore::new(workers));
        let cancel = CancellationToken::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<PoolMessage>();
        let mut tasks = JoinSet::new();

        for (pos, item) in self.items.iter().enumerate() {
            if statuses[pos].is_terminal() {
                continue;
            }
            let item = item.clone();
            let semaphore = Arc::clone(&semaphore);
            let executor = Arc::clone(&self.executor);
            let token = cancel.child_token();
            let tx = tx.clone();
            let per_item_timeout = self.config.per_item_timeout;

            tasks.spawn(async move {
                let _permit = tokio::select! {
                    permit = semaphore.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                    _ = token.cancelled() => return,
                };
                let _ = tx.send(PoolMessage::Started(pos));

                let clock = Instant::now();
                let call = AssertUnwindSafe(executor.execute(&item)).catch_unwind();
                let outcome = tokio::select! {
                    result = tokio::time::timeout(per_item_timeout, call) => match result {
                        Ok(Ok(returned)) => ExecOutcome::Returned(returned),
                        Ok(Err(payload)) => ExecOutcome::Panicked(panic_message(payload.as_ref())),
                        Err(_) => ExecOutcome::TimedOut(per_item_timeout),
                    },
                    _ = token.cancelled() => return,
                };

                let settled = settle(&item, outcome, clock.elapsed());
                let _ = tx.send(PoolMessage::Finished(pos, settled));
            });
        }
        drop(tx);

        let run_clock = Instant::now();
        let deadline = run_clock
            .checked_add(self.config.pool_timeout)
            .unwrap_or_else(|| run_clock + FAR_FUTURE);
        let mut pool_timed_out = false;
        loop {
            match tokio::time::timeout_at(deadline, rx.recv()).await {
                Ok(Some(message)) => self.record(
                    message,
                    &notifier,
                    &mut statuses,
                    &mut responses,
                    &mut executed,
                    &mut permanent,
                ),
                // Every worker has finished and dropped its sender.
                Ok(None) => break,
                Err(_) => {
                    pool_timed_out = true;
                    break;
                }
            }
        }

        if pool_timed_out {
            cancel.cancel();
            tasks.abort_all();
            // Results that raced the deadline are still valid.
            while let Ok(message) = rx.try_recv() {
                self.record(
                    message,
                    &notifier,
                    &mut statuses,
                    &mut responses,
                    &mut executed,
                    &mut permanent,
                );
            }
            self.finalize_timed_out(&notifier, &mut statuses, &mut responses, run_clock.elapsed());
        }
        while tasks.join_next().await.is_some() {}

        let completed = statuses
            .iter()
            .filter(|status| matches!(status, ItemStatus::Completed))
            .count();
        let status = WorkflowStatus::from_counts(completed, self.items.len());

        let checkpoint = WorkflowCheckpoint::capture(
            self.workflow_id,
            status,
            self.items.iter().map(|item| &item.item_id).zip(statuses.iter()),
            permanent.iter(),
            &responses,
        );
        if let Some(store) = &self.store {
            if let Err(e) = store.save(&self.workflow_id, &checkpoint).await {
                tracing::error!(workflow = %self.workflow_id.short(), error = %e, "checkpoint write failed");
            }
        }
        self.checkpoint = Some(checkpoint);

        tracing::info!(
            workflow = %self.workflow_id.short(),
            %status,
            completed,
            total = self.items.len(),
            pool_timed_out,
            "pool finished"
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

    fn record(
        &self,
        message: PoolMessage,
        notifier: &Notifier<'_>,
        statuses: &mut [ItemStatus],
        responses: &mut Vec<Response>,
        executed: &mut Vec<ItemId>,
        permanent: &mut HashSet<ItemId>,
    ) {
        match message {
            PoolMessage::Started(pos) => {
                let item = &self.items[pos];
                statuses[pos] = ItemStatus::Running;
                executed.push(item.item_id.clone());
                tracing::debug!(item = %item.item_id, kind = %item.task_kind, "dispatching item");
                notifier.started(item);
            }
            PoolMessage::Finished(pos, settled) => {
                let item = &self.items[pos];
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
                        tracing::warn!(
                            item = %item.item_id,
                            error = %failure.error,
                            kind = ?failure.kind,
                            "item failed"
                        );
                        if failure.permanent {
                            permanent.insert(item.item_id.clone());
                        }
                        notifier.failed(item, failure);
                    }
                }
                statuses[pos] = settled.status;
                responses.push(settled.response);
            }
        }
    }

    /// Running items become timeout failures; undispatched items are skipped.
    ///
    /// Cancelled items are charged the run's elapsed time.
    fn finalize_timed_out(
        &self,
        notifier: &Notifier<'_>,
        statuses: &mut [ItemStatus],
        responses: &mut Vec<Response>,
        elapsed: Duration,
    ) {
        let limit = self.config.pool_timeout;
        let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        for (pos, item) in self.items.iter().enumerate() {
            match statuses[pos] {
                ItemStatus::Running => {
                    let error = format!("pool timed out after {:?}", limit);
                    let failure = ItemFailure {
                        error: error.clone(),
                        kind: FailureKind::Timeout,
                        permanent: false,
                    };
                    tracing::warn!(item = %item.item_id, %error, "item cancelled");
                    notifier.failed(item, &failure);
                    responses.push(
                        Response::failure(item.item_id.clone(), item.task_kind, error.clone())
                            .with_duration_ms(elapsed_ms),
                    );
                    statuses[pos] = ItemStatus::Failed {
                        error,
                        kind: FailureKind::Timeout,
                    };
                }
                ItemStatus::Pending => {
                    let reason = format!("pool timed out after {:?} before dispatch", limit);
                    notifier.skipped(item, &reason);
                    statuses[pos] = ItemStatus::Skipped { reason };
                }
                _ => {}
            }
        }
    }
}

impl std::fmt::Debug for ParallelPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelPool")
            .field("workflow_id", &self.workflow_id)
            .field("config", &self.config)
            .field("items", &self.items.len())
            .finish()
    }
}
