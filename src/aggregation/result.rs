//! Aggregation options and the consolidated result type.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::{AgentKind, FileChange, ItemId};

/// What to do when two items touch the same file incompatibly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictStrategy {
    /// Record conflicts and leave the merged file list untouched.
    #[default]
    Report,
    /// Keep only the first contributing item's entries for a conflicting path.
    KeepFirst,
    /// Keep only the last contributing item's entries for a conflicting path.
    KeepLast,
    /// Refuse to aggregate.
    Fail,
}

impl std::str::FromStr for ConflictStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "report" => Ok(ConflictStrategy::Report),
            "keep_first" => Ok(ConflictStrategy::KeepFirst),
            "keep_last" => Ok(ConflictStrategy::KeepLast),
            "fail" => Ok(ConflictStrategy::Fail),
            other => Err(crate::Error::Validation(format!(
                "unknown conflict strategy '{}'",
                other
            ))),
        }
    }
}

/// Options for [`aggregate`](super::aggregate).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Collapse repeated `(path, operation)` and `(item_id, message)` pairs.
    pub deduplicate: bool,
    pub conflict_strategy: ConflictStrategy,
    /// Paths known to exist before the workflow ran. Modifying or deleting
    /// one of these after another item created it is not a conflict.
    pub pre_existing_paths: HashSet<String>,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            deduplicate: true,
            conflict_strategy: ConflictStrategy::Report,
            pre_existing_paths: HashSet::new(),
        }
    }
}

impl AggregateOptions {
    pub fn with_deduplicate(mut self, deduplicate: bool) -> Self {
        self.deduplicate = deduplicate;
        self
    }

    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    pub fn with_pre_existing<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_existing_paths.extend(paths.into_iter().map(Into::into));
        self
    }
}

/// The incompatible pair of operations behind a conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    CreateCreate,
    CreateModify,
    CreateDelete,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictKind::CreateCreate => write!(f, "create/create"),
            ConflictKind::CreateModify => write!(f, "create/modify"),
            ConflictKind::CreateDelete => write!(f, "create/delete"),
        }
    }
}

/// Two or more items touched one path incompatibly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    pub path: String,
    /// Contributing items, in order of appearance.
    pub conflicting_item_ids: Vec<ItemId>,
    pub kind: ConflictKind,
}

/// An error message attributed to the item that reported it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemError {
    pub item_id: ItemId,
    pub message: String,
}

/// Per-kind totals.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AgentStats {
    pub count: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub success_rate: f64,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregationMetrics {
    pub total_duration_ms: u64,
    /// Sum of every reported token count; responses without one add nothing.
    pub total_tokens: u64,
    /// `succeeded / (succeeded + failed)`, `0.0` when there were no responses.
    pub success_rate: f64,
    pub per_agent_stats: BTreeMap<AgentKind, AgentStats>,
}

/// One consolidated artifact built from many responses.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub merged_output_text: String,
    pub all_files: Vec<FileChange>,
    pub all_errors: Vec<ItemError>,
    pub conflicts: Vec<Conflict>,
    pub metrics: AggregationMetrics,
    pub summary_text: String,
}

impl AggregatedResult {
    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }

    /// Conflicts recorded for `path`.
    pub fn conflicts_on<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a Conflict> + 'a {
        self.conflicts.iter().filter(move |c| c.path == path)
    }
}
