//! Result aggregation tests.
//!
//! These tests verify merging, conflict detection and metrics on responses
//! produced by real orchestrator runs as well as hand-built ones.

use std::time::Duration;

use agentflow::aggregation::{
    aggregate, aggregate_parallel_results, aggregate_sequential_results, AggregateOptions, AggregatedResult,
    ConflictKind, ConflictStrategy,
};
use agentflow::core::{AgentKind, FileOperation, Response};
use agentflow::orchestration::{Chain, NoopObserver, ParallelPool, PoolConfig};
use agentflow::workflow::{WorkflowId, WorkflowTemplate};
use agentflow::{Config, Error};

use crate::fixtures::{independent_items, shared, MockExecutor};

/// Test: Two items creating the same file
/// Given two responses that both create a.py
/// When aggregated
/// Then exactly one create/create conflict on a.py is reported
#[test]
fn test_double_create_single_conflict() {
    let responses = vec![
        Response::success("one", AgentKind::Implement, "").with_file("a.py", FileOperation::Created),
        Response::success("two", AgentKind::Implement, "").with_file("a.py", FileOperation::Created),
    ];

    let result = aggregate(&responses, &AggregateOptions::default()).unwrap();

    assert_eq!(result.conflicts.len(), 1);
    assert_eq!(result.conflicts[0].path, "a.py");
    assert_eq!(result.conflicts[0].kind, ConflictKind::CreateCreate);
    assert_eq!(result.conflicts[0].kind.to_string(), "create/create");
}

/// Test: Empty input is not an error
#[test]
fn test_empty_aggregation() {
    let result = aggregate(&[], &AggregateOptions::default()).unwrap();
    assert_eq!(result.metrics.success_rate, 0.0);
    assert_eq!(result.metrics.total_tokens, 0);
    assert!(result.all_files.is_empty());
    assert!(result.metrics.per_agent_stats.is_empty());
    assert!(!result.summary_text.is_empty(), "empty input still explains itself");
}

/// Test: Durations add up
#[test]
fn test_total_duration() {
    let responses = vec![
        Response::success("a", AgentKind::Test, "").with_duration_ms(100),
        Response::success("b", AgentKind::Test, "").with_duration_ms(200),
    ];
    let result = aggregate(&responses, &AggregateOptions::default()).unwrap();
    assert_eq!(result.metrics.total_duration_ms, 300);
    assert_eq!(result.metrics.success_rate, 1.0);
}

/// Test: Error deduplication follows the flag
/// Given one item reporting the same error twice
/// When aggregated with and without deduplication
/// Then one and two errors are kept respectively
#[test]
fn test_error_dedup_toggle() {
    let responses = vec![Response::failure("a", AgentKind::Test, "flaky").with_error("flaky")];

    let deduped = aggregate(&responses, &AggregateOptions::default()).unwrap();
    assert_eq!(deduped.all_errors.len(), 1);

    let raw = aggregate(&responses, &AggregateOptions::default().with_deduplicate(false)).unwrap();
    assert_eq!(raw.all_errors.len(), 2);
}

/// Test: Deduplication across separate responses
/// Given two responses from the same item that both report x
/// When aggregated
/// Then x appears once as an error and once as a file, with no conflict
#[test]
fn test_dedup_across_responses_of_one_item() {
    let responses = vec![
        Response::failure("a", AgentKind::Implement, "x").with_file("x", FileOperation::Created),
        Response::failure("a", AgentKind::Implement, "x").with_file("x", FileOperation::Created),
    ];

    let deduped = aggregate(&responses, &AggregateOptions::default()).unwrap();
    assert_eq!(deduped.all_errors.len(), 1);
    assert_eq!(deduped.all_files.len(), 1);
    assert!(deduped.conflicts.is_empty());

    let raw = aggregate(&responses, &AggregateOptions::default().with_deduplicate(false)).unwrap();
    assert_eq!(raw.all_errors.len(), 2);
    assert_eq!(raw.all_files.len(), 2);
}

/// Test: Options from config drive the strategy
#[test]
fn test_config_fail_strategy() {
    let mut config = Config::default();
    config.aggregation.conflict_strategy = ConflictStrategy::Fail;
    let responses = vec![
        Response::success("a", AgentKind::Implement, "").with_file("x.rs", FileOperation::Created),
        Response::success("b", AgentKind::Review, "").with_file("x.rs", FileOperation::Deleted),
    ];

    let err = aggregate(&responses, &config.aggregate_options()).unwrap_err();
    assert!(matches!(err, Error::AggregationConflict { count: 1, .. }));

    let options = config
        .aggregate_options()
        .with_pre_existing(["x.rs"]);
    assert!(aggregate(&responses, &options).is_ok(), "deleting a pre-existing file is not a conflict");
}

/// Test: Chain output aggregates into a narrative
/// Given a feature workflow where the test step fails
/// When its responses are aggregated sequentially
/// Then the summary reads as a progression and metrics count the failure
#[tokio::test]
async fn test_chain_into_narrative() {
    let executor = shared(
        MockExecutor::new()
            .file("implement", "src/login.rs", FileOperation::Created)
            .cost("explore", 120, 800)
            .cost("implement", 480, 4_000)
            .fail("test", "2 tests failed"),
    );
    let template = WorkflowTemplate::FeatureDevelopment;
    let mut chain = Chain::new(WorkflowId::new(), executor);
    chain.add_all(template.build("login form")).unwrap();

    let run = chain.execute(&NoopObserver).await.unwrap();
    let result: AggregatedResult = aggregate_sequential_results(&run.responses, &template.phase_labels("login form"));

    // review is skipped, so three responses
    assert_eq!(run.responses.len(), 3);
    assert!(result
        .summary_text
        .starts_with("Explored the codebase, then implemented login form, then ran the tests (failed: 2 tests failed)."));
    assert_eq!(result.metrics.total_tokens, 4_800);
    assert!((result.metrics.success_rate - 2.0 / 3.0).abs() < 1e-9);
    assert_eq!(result.all_files.len(), 1);
    assert_eq!(result.all_errors.len(), 1);
    assert!(result.merged_output_text.contains("## Test (test) [failed]"));
}

/// Test: Pool output aggregates into a grouped summary
#[tokio::test(start_paused = true)]
async fn test_pool_into_grouped_summary() {
    let executor = shared(
        MockExecutor::new()
            .delay("r0", Duration::from_millis(30))
            .file("r0", "NOTES.md", FileOperation::Created)
            .file("r1", "NOTES.md", FileOperation::Created)
            .fail("r2", "diff too large"),
    );
    let mut pool = ParallelPool::new(WorkflowId::new(), executor, PoolConfig::new(3));
    pool.add_all(independent_items(3)).unwrap();

    let run = pool.execute(&NoopObserver).await.unwrap();
    let result = aggregate_parallel_results(&run.responses);

    let review = &result.metrics.per_agent_stats[&AgentKind::Review];
    assert_eq!((review.count, review.succeeded, review.failed), (3, 2, 1));
    assert!(result.summary_text.contains("Review (3): 2 succeeded, 1 failed"));
    assert_eq!(result.conflicts_on("NOTES.md").count(), 1);
}

/// Test: AggregatedResult survives a JSON round trip
#[test]
fn test_aggregated_result_json_round_trip() {
    let responses = vec![
        Response::success("a", AgentKind::Plan, "plan").with_tokens(10),
        Response::success("b", AgentKind::Implement, "").with_file("a.py", FileOperation::Created),
        Response::failure("c", AgentKind::Implement, "oops").with_file("a.py", FileOperation::Created),
        Response::failure("d", AgentKind::Plan, "no plan"),
    ];
    let result = aggregate(&responses, &AggregateOptions::default()).unwrap();

    let json = serde_json::to_string(&result).unwrap();
    let parsed: AggregatedResult = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, result);
}
