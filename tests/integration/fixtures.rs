//! Test fixtures for integration tests.
//!
//! Provides helpers for:
//! - A scriptable mock executor (delays, failures, panics, files)
//! - Concurrency tracking for pool limits
//! - Predefined item sets

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use agentflow::core::{AgentKind, FileChange, FileOperation, ItemId, Response, WorkItem};
use agentflow::orchestration::{ExecutorError, ItemFailure, ItemObserver, TaskExecutor};

/// How the mock executor should treat one item.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub delay: Duration,
    pub fail: Option<String>,
    pub permanent: bool,
    pub panic: bool,
    pub files: Vec<FileChange>,
    pub tokens: Option<u64>,
    pub duration_ms: u64,
}

/// Executor double that follows per-item scripts and records what it saw.
#[derive(Default)]
pub struct MockExecutor {
    scripts: HashMap<ItemId, Script>,
    calls: Mutex<Vec<ItemId>>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn script_mut(&mut self, id: &str) -> &mut Script {
        self.scripts.entry(ItemId::from(id)).or_default()
    }

    pub fn delay(mut self, id: &str, delay: Duration) -> Self {
        self.script_mut(id).delay = delay;
        self
    }

    pub fn fail(mut self, id: &str, message: &str) -> Self {
        self.script_mut(id).fail = Some(message.to_string());
        self
    }

    pub fn fail_permanently(mut self, id: &str, message: &str) -> Self {
        let script = self.script_mut(id);
        script.fail = Some(message.to_string());
        script.permanent = true;
        self
    }

    pub fn panic(mut self, id: &str) -> Self {
        self.script_mut(id).panic = true;
        self
    }

    pub fn file(mut self, id: &str, path: &str, operation: FileOperation) -> Self {
        self.script_mut(id).files.push(FileChange::new(path, operation));
        self
    }

    pub fn cost(mut self, id: &str, duration_ms: u64, tokens: u64) -> Self {
        let script = self.script_mut(id);
        script.duration_ms = duration_ms;
        script.tokens = Some(tokens);
        self
    }

    /// Item ids in the order they were handed to the executor.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    /// Highest number of simultaneous executions observed.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Decrements the in-flight counter even when the execution is cancelled.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl TaskExecutor for MockExecutor {
    async fn execute(&self, item: &WorkItem) -> Result<Response, ExecutorError> {
        self.calls.lock().unwrap().push(item.item_id.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let script = self.scripts.get(&item.item_id).cloned().unwrap_or_default();
        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        if script.panic {
            panic!("mock executor panicked on {}", item.item_id);
        }
        if let Some(message) = script.fail {
            return Err(if script.permanent {
                ExecutorError::permanent(message)
            } else {
                ExecutorError::new(message)
            });
        }

        let mut response = Response::success(
            item.item_id.clone(),
            item.task_kind,
            format!("{} finished\n{}", item.item_id, item.payload),
        )
        .with_duration_ms(script.duration_ms);
        response.files_touched = script.files;
        response.tokens_used = script.tokens;
        Ok(response)
    }
}

/// Observer that records every event as a short string.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<String>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Ids from `complete:` and `failed:` events, in notification order.
    pub fn finished_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| {
                e.strip_prefix("complete:")
                    .or_else(|| e.strip_prefix("failed:"))
                    .map(str::to_string)
            })
            .collect()
    }

    fn push(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl ItemObserver for RecordingObserver {
    fn on_item_started(&self, item: &WorkItem) {
        self.push(format!("started:{}", item.item_id));
    }

    fn on_item_complete(&self, item: &WorkItem, _response: &Response) {
        self.push(format!("complete:{}", item.item_id));
    }

    fn on_item_failed(&self, item: &WorkItem, _failure: &ItemFailure) {
        self.push(format!("failed:{}", item.item_id));
    }

    fn on_item_skipped(&self, item: &WorkItem, _reason: &str) {
        self.push(format!("skipped:{}", item.item_id));
    }
}

/// Create a work item with the given id.
pub fn item(id: &str) -> WorkItem {
    WorkItem::new(id, AgentKind::General, format!("do {}", id))
}

/// Create a work item depending on `deps`.
pub fn item_after(id: &str, deps: &[&str]) -> WorkItem {
    deps.iter().fold(item(id), |item, dep| item.depends_on(*dep))
}

/// `n` independent review items `r0..rn`.
pub fn independent_items(n: usize) -> Vec<WorkItem> {
    (0..n)
        .map(|i| WorkItem::new(format!("r{}", i), AgentKind::Review, "review"))
        .collect()
}

/// a -> b, a -> c, b -> d, c -> d
pub fn diamond_items() -> Vec<WorkItem> {
    vec![
        item("a"),
        item_after("b", &["a"]),
        item_after("c", &["a"]),
        item_after("d", &["b", "c"]),
    ]
}

/// Check that every item appears after all of its dependencies.
pub fn assert_respects_dependencies(items: &[WorkItem], order: &[String]) {
    let mut seen: HashSet<&str> = HashSet::new();
    for id in order {
        let item = items
            .iter()
            .find(|i| i.item_id.as_str() == id)
            .unwrap_or_else(|| panic!("unknown id {}", id));
        for dep in &item.dependencies {
            assert!(seen.contains(dep.as_str()), "{} ran before its dependency {}", id, dep);
        }
        seen.insert(id.as_str());
    }
}

pub fn shared(executor: MockExecutor) -> Arc<MockExecutor> {
    Arc::new(executor)
}
