//! Work item data model.
//!
//! A `WorkItem` is the unit of schedulable work handed to a task executor.
//! Items are immutable once added to an orchestrator; their lifecycle is
//! tracked separately through `ItemStatus`.

use serde::{Deserialize, Serialize};

/// Identifier of a work item, unique within one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl ItemId {
    /// Create an item identifier from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The kind of agent a work item is meant for.
///
/// This is a closed set so that anything grouping by kind (the aggregator's
/// per-agent statistics in particular) is exhaustive at compile time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Read and map the codebase.
    Explore,
    /// Produce a plan or design.
    Plan,
    /// Write or change code.
    Implement,
    /// Run or write tests.
    Test,
    /// Review changes.
    Review,
    /// Write documentation.
    Document,
    /// Anything else.
    #[default]
    General,
}

impl AgentKind {
    /// Every kind, in declaration order.
    pub const ALL: [AgentKind; 7] = [
        AgentKind::Explore,
        AgentKind::Plan,
        AgentKind::Implement,
        AgentKind::Test,
        AgentKind::Review,
        AgentKind::Document,
        AgentKind::General,
    ];

    /// Short lowercase name used in labels and serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            AgentKind::Explore => "explore",
            AgentKind::Plan => "plan",
            AgentKind::Implement => "implement",
            AgentKind::Test => "test",
            AgentKind::Review => "review",
            AgentKind::Document => "document",
            AgentKind::General => "general",
        }
    }

    /// Past-tense verb phrase used when narrating a finished item.
    pub fn verb(&self) -> &'static str {
        match self {
            AgentKind::Explore => "explored the codebase",
            AgentKind::Plan => "planned the change",
            AgentKind::Implement => "implemented the change",
            AgentKind::Test => "ran the tests",
            AgentKind::Review => "reviewed the result",
            AgentKind::Document => "wrote documentation",
            AgentKind::General => "completed a task",
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for AgentKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| crate::Error::Validation(format!("Unknown agent kind: {}", s)))
    }
}

/// Why an item ended in the failed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The executor returned an error (or panicked).
    Execution,
    /// The executor never returned within the allotted time.
    Timeout,
}

/// Lifecycle state of a work item inside one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ItemStatus {
    /// Not yet dispatched.
    #[default]
    Pending,
    /// Handed to the executor.
    Running,
    /// The executor returned a response.
    Completed,
    /// The executor errored or timed out.
    Failed {
        /// Error message describing the failure.
        error: String,
        /// Distinguishes an errored agent from one that never returned.
        kind: FailureKind,
    },
    /// Never dispatched because a dependency did not complete.
    Skipped {
        /// Reason the item was skipped.
        reason: String,
    },
}

impl ItemStatus {
    /// Completed, failed or skipped.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ItemStatus::Completed | ItemStatus::Failed { .. } | ItemStatus::Skipped { .. }
        )
    }

    /// Failed or skipped; dependents of such an item are skipped.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, ItemStatus::Failed { .. } | ItemStatus::Skipped { .. })
    }
}

impl std::fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ItemStatus::Pending => write!(f, "pending"),
            ItemStatus::Running => write!(f, "running"),
            ItemStatus::Completed => write!(f, "completed"),
            ItemStatus::Failed { error, kind } => match kind {
                FailureKind::Execution => write!(f, "failed: {}", error),
                FailureKind::Timeout => write!(f, "timed out: {}", error),
            },
            ItemStatus::Skipped { reason } => write!(f, "skipped: {}", reason),
        }
    }
}

/// One schedulable unit of agent work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Unique identifier within the workflow.
    pub item_id: ItemId,
    /// Which kind of agent should run this item.
    pub task_kind: AgentKind,
    /// Opaque task description handed to the executor.
    pub payload: String,
    /// Items that must complete successfully before this one may run.
    #[serde(default)]
    pub dependencies: Vec<ItemId>,
    /// Human-readable label.
    pub label: String,
}

impl WorkItem {
    /// Create an item with no dependencies. The label defaults to the id.
    pub fn new(item_id: impl Into<ItemId>, task_kind: AgentKind, payload: impl Into<String>) -> Self {
        let item_id = item_id.into();
        Self {
            label: item_id.to_string(),
            item_id,
            task_kind,
            payload: payload.into(),
            dependencies: Vec::new(),
        }
    }

    /// Set the human-readable label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Add a dependency. Repeated ids are ignored.
    pub fn depends_on(mut self, dependency: impl Into<ItemId>) -> Self {
        let dependency = dependency.into();
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
        self
    }

    /// Whether the item declares any dependency.
    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}
