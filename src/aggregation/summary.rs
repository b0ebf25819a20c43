//! Human-readable summaries of an aggregation.

use std::fmt::Write;

use crate::core::{AgentKind, Response};

use super::result::{AggregatedResult, AggregationMetrics};

const EMPTY_OVERVIEW: &str = "No responses to aggregate.";
const EMPTY_NARRATIVE: &str = "No steps were executed.";
const EMPTY_GROUPED: &str = "No agent results to summarize.";

/// Capitalized kind name for headings.
pub(crate) fn title(kind: AgentKind) -> String {
    capitalize(kind.label())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{} {}", n, word)
    } else {
        format!("{} {}s", n, word)
    }
}

fn totals_line(metrics: &AggregationMetrics) -> String {
    if metrics.total_tokens > 0 {
        format!("{} ms, {} tokens", metrics.total_duration_ms, metrics.total_tokens)
    } else {
        format!("{} ms", metrics.total_duration_ms)
    }
}

/// First error of a failed response, or a generic marker.
fn failure_note(response: &Response) -> String {
    match response.errors.first() {
        Some(error) => format!("failed: {}", error),
        None => "failed".to_string(),
    }
}

/// Counts-only summary used by the general `aggregate`.
pub(crate) fn overview(result: &AggregatedResult, responses: usize) -> String {
    if responses == 0 {
        return EMPTY_OVERVIEW.to_string();
    }
    let succeeded: usize = result.metrics.per_agent_stats.values().map(|s| s.succeeded).sum();
    format!(
        "{}: {} succeeded, {} failed. {} touched, {}, {}. Total {}.",
        plural(responses, "response"),
        succeeded,
        responses - succeeded,
        plural(result.all_files.len(), "file"),
        plural(result.conflicts.len(), "conflict"),
        plural(result.all_errors.len(), "error"),
        totals_line(&result.metrics)
    )
}

/// "Explored the codebase, then implemented X, then ran the tests."
pub(crate) fn narrative(responses: &[Response], phase_labels: &[String], metrics: &AggregationMetrics) -> String {
    if responses.is_empty() {
        return EMPTY_NARRATIVE.to_string();
    }

    let steps: Vec<String> = responses
        .iter()
        .enumerate()
        .map(|(i, response)| {
            let label = phase_labels
                .get(i)
                .map(String::as_str)
                .unwrap_or_else(|| response.agent_kind.verb());
            if response.success {
                label.to_string()
            } else {
                format!("{} ({})", label, failure_note(response))
            }
        })
        .collect();

    let succeeded = responses.iter().filter(|r| r.success).count();
    format!(
        "{}.\n\n{} of {} succeeded in {}.",
        capitalize(&steps.join(", then ")),
        succeeded,
        plural(responses.len(), "step"),
        totals_line(metrics)
    )
}

/// One block per agent kind, listing each item's headline.
pub(crate) fn grouped(responses: &[Response], metrics: &AggregationMetrics) -> String {
    if responses.is_empty() {
        return EMPTY_GROUPED.to_string();
    }

    let mut out = format!(
        "{} across {}.",
        plural(responses.len(), "result"),
        plural(metrics.per_agent_stats.len(), "agent kind")
    );
    for (kind, stats) in &metrics.per_agent_stats {
        let _ = write!(
            out,
            "\n\n{} ({}): {} succeeded, {} failed",
            title(*kind),
            stats.count,
            stats.succeeded,
            stats.failed
        );
        for response in responses.iter().filter(|r| r.agent_kind == *kind) {
            let line = if response.success {
                response.headline().unwrap_or("(no output)").to_string()
            } else {
                failure_note(response)
            };
            let _ = write!(out, "\n- {}: {}", response.item_id, line);
        }
    }
    out
}
