//! Merging responses: files, errors, conflicts and metrics.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::core::{FileChange, FileOperation, ItemId, Response};
use crate::error::{Error, Result};

use super::result::{
    AggregateOptions, AggregatedResult, AgentStats, AggregationMetrics, Conflict, ConflictKind,
    ConflictStrategy, ItemError,
};
use super::summary;

/// Merge `responses` into one result.
///
/// An empty slice is not an error; it yields zero metrics and an
/// empty-state summary.
///
/// # Errors
/// `AggregationConflict` when conflicts are found and the strategy is
/// [`ConflictStrategy::Fail`].
pub fn aggregate(responses: &[Response], options: &AggregateOptions) -> Result<AggregatedResult> {
    let conflicts = detect_conflicts(responses, &options.pre_existing_paths);
    if options.conflict_strategy == ConflictStrategy::Fail {
        if let Some(first) = conflicts.first() {
            tracing::warn!(path = %first.path, count = conflicts.len(), "refusing to aggregate conflicting responses");
            return Err(Error::AggregationConflict {
                path: first.path.clone(),
                count: conflicts.len(),
            });
        }
    }

    let mut result = merge(responses, options, conflicts);
    result.summary_text = summary::overview(&result, responses.len());
    Ok(result)
}

/// Merge responses from a sequential run and describe them as a progression.
///
/// `phase_labels[i]` names the step that produced `responses[i]`; missing
/// labels fall back to the agent kind's verb.
pub fn aggregate_sequential_results(responses: &[Response], phase_labels: &[String]) -> AggregatedResult {
    let conflicts = detect_conflicts(responses, &HashSet::new());
    let mut result = merge(responses, &AggregateOptions::default(), conflicts);
    result.summary_text = summary::narrative(responses, phase_labels, &result.metrics);
    result
}

/// Merge responses from a parallel run and summarize them per agent kind.
pub fn aggregate_parallel_results(responses: &[Response]) -> AggregatedResult {
    let conflicts = detect_conflicts(responses, &HashSet::new());
    let mut result = merge(responses, &AggregateOptions::default(), conflicts);
    result.summary_text = summary::grouped(responses, &result.metrics);
    result
}

fn merge(responses: &[Response], options: &AggregateOptions, conflicts: Vec<Conflict>) -> AggregatedResult {
    if !conflicts.is_empty() {
        tracing::debug!(conflicts = conflicts.len(), "file conflicts detected");
    }
    AggregatedResult {
        merged_output_text: merge_output(responses),
        all_files: merge_files(responses, options, &conflicts),
        all_errors: merge_errors(responses, options.deduplicate),
        conflicts,
        metrics: compute_metrics(responses),
        summary_text: String::new(),
    }
}

/// One labelled section per response, in the order given.
fn merge_output(responses: &[Response]) -> String {
    let sections: Vec<String> = responses
        .iter()
        .map(|response| {
            let status = if response.success { "" } else { " [failed]" };
            let body = response.output_text.trim();
            let body = if body.is_empty() { "(no output)" } else { body };
            format!(
                "## {} ({}){}\n{}",
                summary::title(response.agent_kind),
                response.item_id,
                status,
                body
            )
        })
        .collect();
    sections.join("\n\n")
}

fn merge_files(responses: &[Response], options: &AggregateOptions, conflicts: &[Conflict]) -> Vec<FileChange> {
    let winners = conflict_winners(conflicts, options.conflict_strategy);

    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for response in responses {
        for change in &response.files_touched {
            if let Some(winner) = winners.get(change.path.as_str()) {
                if *winner != &response.item_id {
                    continue;
                }
            }
            if options.deduplicate && !seen.insert((change.path.as_str(), change.operation)) {
                continue;
            }
            files.push(change.clone());
        }
    }
    files
}

/// The item whose entries survive on each conflicting path, if the strategy picks one.
fn conflict_winners(conflicts: &[Conflict], strategy: ConflictStrategy) -> HashMap<&str, &ItemId> {
    let mut contributors: HashMap<&str, Vec<&ItemId>> = HashMap::new();
    for conflict in conflicts {
        let ids = contributors.entry(conflict.path.as_str()).or_default();
        for id in &conflict.conflicting_item_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
    }

    contributors
        .into_iter()
        .filter_map(|(path, ids)| {
            let winner = match strategy {
                ConflictStrategy::KeepFirst => ids.first().copied(),
                ConflictStrategy::KeepLast => ids.last().copied(),
                ConflictStrategy::Report | ConflictStrategy::Fail => None,
            };
            winner.map(|id| (path, id))
        })
        .collect()
}

fn merge_errors(responses: &[Response], deduplicate: bool) -> Vec<ItemError> {
    let mut seen = HashSet::new();
    let mut errors = Vec::new();
    for response in responses {
        for message in &response.errors {
            if deduplicate && !seen.insert((&response.item_id, message.as_str())) {
                continue;
            }
            errors.push(ItemError {
                item_id: response.item_id.clone(),
                message: message.clone(),
            });
        }
    }
    errors
}

/// Find incompatible operations by different items on the same path.
///
/// A path created by one item and then created, modified or deleted by
/// another is a conflict, except that modify and delete are fine when the
/// path existed before the workflow. One entry per `(path, kind)`.
pub(crate) fn detect_conflicts(responses: &[Response], pre_existing: &HashSet<String>) -> Vec<Conflict> {
    let mut creators: HashMap<&str, Vec<&ItemId>> = HashMap::new();
    let mut conflicts: Vec<Conflict> = Vec::new();
    let mut index: HashMap<(&str, ConflictKind), usize> = HashMap::new();

    for response in responses {
        let item_id = &response.item_id;
        for change in &response.files_touched {
            let path = change.path.as_str();
            let kind = match change.operation {
                FileOperation::Created => ConflictKind::CreateCreate,
                FileOperation::Modified => ConflictKind::CreateModify,
                FileOperation::Deleted => ConflictKind::CreateDelete,
            };
            let checks_creators = kind == ConflictKind::CreateCreate || !pre_existing.contains(path);

            if checks_creators {
                let earlier: Vec<&ItemId> = creators
                    .get(path)
                    .map(|ids| ids.iter().copied().filter(|id| *id != item_id).collect())
                    .unwrap_or_default();

                if !earlier.is_empty() {
                    let slot = *index.entry((path, kind)).or_insert_with(|| {
                        conflicts.push(Conflict {
                            path: path.to_string(),
                            conflicting_item_ids: Vec::new(),
                            kind,
                        });
                        conflicts.len() - 1
                    });
                    let ids = &mut conflicts[slot].conflicting_item_ids;
                    for id in earlier.into_iter().chain(std::iter::once(item_id)) {
                        if !ids.contains(id) {
                            ids.push(id.clone());
                        }
                    }
                }
            }

            if change.operation == FileOperation::Created {
                let ids = creators.entry(path).or_default();
                if !ids.contains(&item_id) {
                    ids.push(item_id);
                }
            }
        }
    }
    conflicts
}

pub(crate) fn compute_metrics(responses: &[Response]) -> AggregationMetrics {
    let mut metrics = AggregationMetrics::default();
    let mut per_agent: BTreeMap<_, AgentStats> = BTreeMap::new();
    let mut succeeded = 0usize;

    for response in responses {
        metrics.total_duration_ms = metrics.total_duration_ms.saturating_add(response.duration_ms);
        let tokens = response.tokens_used.unwrap_or(0);
        metrics.total_tokens = metrics.total_tokens.saturating_add(tokens);

        let stats = per_agent.entry(response.agent_kind).or_default();
        stats.count += 1;
        stats.total_duration_ms = stats.total_duration_ms.saturating_add(response.duration_ms);
        stats.total_tokens = stats.total_tokens.saturating_add(tokens);
        if response.success {
            stats.succeeded += 1;
            succeeded += 1;
        } else {
            stats.failed += 1;
        }
    }

    for stats in per_agent.values_mut() {
        stats.success_rate = rate(stats.succeeded, stats.count);
    }
    metrics.success_rate = rate(succeeded, responses.len());
    metrics.per_agent_stats = per_agent;
    metrics
}

fn rate(succeeded: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        succeeded as f64 / total as f64
    }
}
