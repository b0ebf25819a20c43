//! Executor output for a single work item.

use serde::{Deserialize, Serialize};

use super::item::{AgentKind, ItemId};

/// What an agent did to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOperation {
    Created,
    Modified,
    Deleted,
}

impl FileOperation {
    /// Short verb used in conflict kinds ("create", "modify", "delete").
    pub fn short(&self) -> &'static str {
        match self {
            FileOperation::Created => "create",
            FileOperation::Modified => "modify",
            FileOperation::Deleted => "delete",
        }
    }
}

impl std::fmt::Display for FileOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileOperation::Created => write!(f, "created"),
            FileOperation::Modified => write!(f, "modified"),
            FileOperation::Deleted => write!(f, "deleted"),
        }
    }
}

/// A file path paired with the operation performed on it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub operation: FileOperation,
}

impl FileChange {
    pub fn new(path: impl Into<String>, operation: FileOperation) -> Self {
        Self {
            path: path.into(),
            operation,
        }
    }
}

/// The executor's output for one work item.
///
/// Produced exactly once per executed item and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The item this response belongs to.
    pub item_id: ItemId,
    /// Kind of agent that produced the response.
    pub agent_kind: AgentKind,
    /// Whether the agent reported success.
    pub success: bool,
    /// Free-form agent output.
    #[serde(default)]
    pub output_text: String,
    /// Files the agent touched, in the order reported.
    #[serde(default)]
    pub files_touched: Vec<FileChange>,
    /// Error messages reported by the agent.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Wall-clock duration of the execution.
    #[serde(default)]
    pub duration_ms: u64,
    /// Cost in tokens, when the executor reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u64>,
}

impl Response {
    /// A successful response with the given output text.
    pub fn success(
        item_id: impl Into<ItemId>,
        agent_kind: AgentKind,
        output_text: impl Into<String>,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            agent_kind,
            success: true,
            output_text: output_text.into(),
            files_touched: Vec::new(),
            errors: Vec::new(),
            duration_ms: 0,
            tokens_used: None,
        }
    }

    /// An unsuccessful response carrying one error message.
    pub fn failure(item_id: impl Into<ItemId>, agent_kind: AgentKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            errors: vec![error.into()],
            ..Self::success(item_id, agent_kind, String::new())
        }
    }

    /// Record a touched file.
    pub fn with_file(mut self, path: impl Into<String>, operation: FileOperation) -> Self {
        self.files_touched.push(FileChange::new(path, operation));
        self
    }

    /// Record an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.errors.push(error.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    pub fn with_tokens(mut self, tokens: u64) -> Self {
        self.tokens_used = Some(tokens);
        self
    }

    /// First non-empty line of the output, used by summaries.
    pub fn headline(&self) -> Option<&str> {
        self.output_text
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
    }
}
