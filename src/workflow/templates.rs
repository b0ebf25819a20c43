//! Preconfigured work item sequences.

use serde::{Deserialize, Serialize};

use crate::core::{AgentKind, ItemId, WorkItem};

/// A canned workflow shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "template")]
pub enum WorkflowTemplate {
    /// explore → implement → test → review
    FeatureDevelopment,
    /// explore → implement → test
    BugFix,
    /// explore → plan → implement → test
    Refactor,
    /// Independent reviewers, meant for the parallel pool.
    ParallelReview {
        /// Number of reviewers.
        reviewers: usize,
    },
}

impl WorkflowTemplate {
    /// Agent kinds of the steps, in order.
    pub fn steps(&self) -> Vec<AgentKind> {
        match self {
            WorkflowTemplate::FeatureDevelopment => vec![
                AgentKind::Explore,
                AgentKind::Implement,
                AgentKind::Test,
                AgentKind::Review,
            ],
            WorkflowTemplate::BugFix => {
                vec![AgentKind::Explore, AgentKind::Implement, AgentKind::Test]
            }
            WorkflowTemplate::Refactor => vec![
                AgentKind::Explore,
                AgentKind::Plan,
                AgentKind::Implement,
                AgentKind::Test,
            ],
            WorkflowTemplate::ParallelReview { reviewers } => vec![AgentKind::Review; *reviewers],
        }
    }

    /// Whether every step depends on the one before it.
    pub fn is_sequential(&self) -> bool {
        !matches!(self, WorkflowTemplate::ParallelReview { .. })
    }

    /// Build the work items for a task description.
    ///
    /// Sequential templates use the agent kind as item id and chain each
    /// step onto the previous one. Parallel reviews get ids `review-1`,
    /// `review-2`, ... and no dependencies.
    pub fn build(&self, description: &str) -> Vec<WorkItem> {
        let steps = self.steps();
        let mut items: Vec<WorkItem> = Vec::with_capacity(steps.len());

        for (n, kind) in steps.into_iter().enumerate() {
            let item = if self.is_sequential() {
                let item = WorkItem::new(kind.label(), kind, step_payload(kind, description))
                    .with_label(step_label(kind, description));
                match items.last() {
                    Some(previous) => item.depends_on(previous.item_id.clone()),
                    None => item,
                }
            } else {
                let id = ItemId::new(format!("review-{}", n + 1));
                WorkItem::new(id, kind, step_payload(kind, description))
                    .with_label(format!("Review #{} of {}", n + 1, description))
            };
            items.push(item);
        }

        items
    }

    /// Narrative labels for the steps, as fed to sequential aggregation.
    pub fn phase_labels(&self, description: &str) -> Vec<String> {
        self.steps()
            .into_iter()
            .map(|kind| match kind {
                AgentKind::Explore => "explored the codebase".to_string(),
                AgentKind::Plan => format!("planned {}", description),
                AgentKind::Implement => format!("implemented {}", description),
                AgentKind::Test => "ran the tests".to_string(),
                AgentKind::Review => "reviewed the changes".to_string(),
                other => other.verb().to_string(),
            })
            .collect()
    }
}

fn step_label(kind: AgentKind, description: &str) -> String {
    match kind {
        AgentKind::Explore => format!("Explore codebase for: {}", description),
        AgentKind::Plan => format!("Plan: {}", description),
        AgentKind::Implement => format!("Implement: {}", description),
        AgentKind::Test => format!("Test: {}", description),
        AgentKind::Review => format!("Review: {}", description),
        AgentKind::Document => format!("Document: {}", description),
        AgentKind::General => description.to_string(),
    }
}

fn step_payload(kind: AgentKind, description: &str) -> String {
    match kind {
        AgentKind::Explore => format!(
            "Explore the codebase and report the files and modules relevant to: {}",
            description
        ),
        AgentKind::Plan => format!("Write a step-by-step plan for: {}", description),
        AgentKind::Implement => format!("Implement the following change: {}", description),
        AgentKind::Test => format!("Run and extend the tests covering: {}", description),
        AgentKind::Review => format!("Review the changes made for: {}", description),
        AgentKind::Document => format!("Document the changes made for: {}", description),
        AgentKind::General => description.to_string(),
    }
}
