//! Progress notification for orchestrators.
//!
//! Observers are invoked synchronously, in-line with the run, in the order
//! events happen (execution order for the Chain, completion order for the
//! Pool). A panicking observer is contained and logged; it never aborts the
//! run.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::core::{FailureKind, ItemId, Response, WorkItem};
use crate::workflow::{WorkflowId, WorkflowStatus};

use super::executor::{panic_message, ItemFailure};

/// Receives item lifecycle notifications. Every hook defaults to a no-op.
pub trait ItemObserver: Send + Sync {
    fn on_item_started(&self, _item: &WorkItem) {}

    fn on_item_complete(&self, _item: &WorkItem, _response: &Response) {}

    fn on_item_failed(&self, _item: &WorkItem, _failure: &ItemFailure) {}

    fn on_item_skipped(&self, _item: &WorkItem, _reason: &str) {}

    fn on_workflow_finished(&self, _workflow_id: &WorkflowId, _status: WorkflowStatus) {}
}

/// Observer that ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl ItemObserver for NoopObserver {}

type CompleteFn = Box<dyn Fn(&WorkItem, &Response) + Send + Sync>;
type FailedFn = Box<dyn Fn(&WorkItem, &ItemFailure) + Send + Sync>;

/// Observer built from optional closures.
///
/// ```ignore
/// let observer = CallbackObserver::new()
///     .on_complete(|item, _| println!("{} done", item.item_id))
///     .on_failed(|item, failure| eprintln!("{}: {}", item.item_id, failure.error));
/// chain.execute(&observer).await?;
/// ```
#[derive(Default)]
pub struct CallbackObserver {
    on_complete: Option<CompleteFn>,
    on_failed: Option<FailedFn>,
}

impl CallbackObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(mut self, f: impl Fn(&WorkItem, &Response) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    pub fn on_failed(mut self, f: impl Fn(&WorkItem, &ItemFailure) + Send + Sync + 'static) -> Self {
        self.on_failed = Some(Box::new(f));
        self
    }
}

impl ItemObserver for CallbackObserver {
    fn on_item_complete(&self, item: &WorkItem, response: &Response) {
        if let Some(f) = &self.on_complete {
            f(item, response);
        }
    }

    fn on_item_failed(&self, item: &WorkItem, failure: &ItemFailure) {
        if let Some(f) = &self.on_failed {
            f(item, failure);
        }
    }
}

/// Events published by [`ChannelObserver`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event")]
pub enum WorkflowEvent {
    ItemStarted {
        item_id: ItemId,
    },
    ItemCompleted {
        item_id: ItemId,
        response: Response,
    },
    ItemFailed {
        item_id: ItemId,
        error: String,
        kind: FailureKind,
    },
    ItemSkipped {
        item_id: ItemId,
        reason: String,
    },
    WorkflowFinished {
        workflow_id: WorkflowId,
        status: WorkflowStatus,
    },
}

/// Observer that forwards events into a bounded channel.
///
/// Sending uses `try_send`, so a slow consumer never stalls the
/// orchestrator; events that do not fit are dropped and logged.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: Sender<WorkflowEvent>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its channel.
    pub fn bounded(capacity: usize) -> (Self, Receiver<WorkflowEvent>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx }, rx)
    }

    fn publish(&self, event: WorkflowEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                tracing::debug!(?event, "event channel full, dropping event");
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::trace!("event receiver dropped");
            }
        }
    }
}

impl ItemObserver for ChannelObserver {
    fn on_item_started(&self, item: &WorkItem) {
        self.publish(WorkflowEvent::ItemStarted {
            item_id: item.item_id.clone(),
        });
    }

    fn on_item_complete(&self, item: &WorkItem, response: &Response) {
        self.publish(WorkflowEvent::ItemCompleted {
            item_id: item.item_id.clone(),
            response: response.clone(),
        });
    }

    fn on_item_failed(&self, item: &WorkItem, failure: &ItemFailure) {
        self.publish(WorkflowEvent::ItemFailed {
            item_id: item.item_id.clone(),
            error: failure.error.clone(),
            kind: failure.kind,
        });
    }

    fn on_item_skipped(&self, item: &WorkItem, reason: &str) {
        self.publish(WorkflowEvent::ItemSkipped {
            item_id: item.item_id.clone(),
            reason: reason.to_string(),
        });
    }

    fn on_workflow_finished(&self, workflow_id: &WorkflowId, status: WorkflowStatus) {
        self.publish(WorkflowEvent::WorkflowFinished {
            workflow_id: *workflow_id,
            status,
        });
    }
}

/// Wraps an observer so that a panicking hook is logged and swallowed.
pub(crate) struct Notifier<'a> {
    observer: &'a dyn ItemObserver,
}

impl<'a> Notifier<'a> {
    pub(crate) fn new(observer: &'a dyn ItemObserver) -> Self {
        Self { observer }
    }

    pub(crate) fn started(&self, item: &WorkItem) {
        self.guard("on_item_started", &item.item_id, || self.observer.on_item_started(item));
    }

    pub(crate) fn complete(&self, item: &WorkItem, response: &Response) {
        self.guard("on_item_complete", &item.item_id, || {
            self.observer.on_item_complete(item, response)
        });
    }

    pub(crate) fn failed(&self, item: &WorkItem, failure: &ItemFailure) {
        self.guard("on_item_failed", &item.item_id, || {
            self.observer.on_item_failed(item, failure)
        });
    }

    pub(crate) fn skipped(&self, item: &WorkItem, reason: &str) {
        self.guard("on_item_skipped", &item.item_id, || {
            self.observer.on_item_skipped(item, reason)
        });
    }

    pub(crate) fn finished(&self, workflow_id: &WorkflowId, status: WorkflowStatus) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| {
            self.observer.on_workflow_finished(workflow_id, status)
        })) {
            tracing::warn!(
                workflow = %workflow_id.short(),
                panic = %panic_message(payload.as_ref()),
                "observer panicked in on_workflow_finished"
            );
        }
    }

    fn guard(&self, hook: &str, item_id: &ItemId, f: impl FnOnce()) {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(f)) {
            tracing::warn!(
                item = %item_id,
                hook,
                panic = %panic_message(payload.as_ref()),
                "observer panicked; continuing"
            );
        }
    }
}
