//! Sequential execution tests.
//!
//! These tests verify that the Chain runs items in dependency order,
//! rejects bad graphs before running anything, and isolates failures.

use agentflow::core::ItemStatus;
use agentflow::orchestration::{Chain, ChannelObserver, NoopObserver, WorkflowEvent};
use agentflow::workflow::{WorkflowId, WorkflowStatus, WorkflowTemplate};
use agentflow::Error;

use crate::fixtures::{
    assert_respects_dependencies, diamond_items, item, item_after, shared, MockExecutor, RecordingObserver,
};

/// Test: Diamond graph runs in a valid, stable order
/// Given a -> {b, c} -> d
/// When the chain executes
/// Then every item runs after its dependencies, ties broken by insertion order
#[tokio::test]
async fn test_diamond_runs_in_dependency_order() {
    let executor = shared(MockExecutor::new());
    let mut chain = Chain::new(WorkflowId::new(), executor.clone());
    let items = diamond_items();
    chain.add_all(items.clone()).unwrap();

    let result = chain.execute(&NoopObserver).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_respects_dependencies(&items, &executor.calls());
    assert_eq!(executor.calls(), vec!["a", "b", "c", "d"]);
}

/// Test: Insertion order breaks ties even when items are added out of order
/// Given d depends on a, and items are added as [d, b, a]
/// When the chain executes
/// Then b (ready, inserted before a) runs first, then a, then d
#[tokio::test]
async fn test_insertion_order_tie_break() {
    let executor = shared(MockExecutor::new());
    let mut chain = Chain::new(WorkflowId::new(), executor.clone());
    chain
        .add_all([item_after("d", &["a"]), item("b"), item("a")])
        .unwrap();

    chain.execute(&NoopObserver).await.unwrap();
    assert_eq!(executor.calls(), vec!["b", "a", "d"]);
}

/// Test: Cycles are rejected before execution
/// Given a <-> b
/// When the chain executes
/// Then CyclicDependency is returned and the executor is never called
#[tokio::test]
async fn test_cycle_rejected_before_any_execution() {
    let executor = shared(MockExecutor::new());
    let mut chain = Chain::new(WorkflowId::new(), executor.clone());
    chain
        .add_all([item("z"), item_after("a", &["b"]), item_after("b", &["a"])])
        .unwrap();

    let err = chain.execute(&NoopObserver).await.unwrap_err();
    assert!(matches!(err, Error::CyclicDependency(_)));
    assert!(err.is_configuration());
    assert!(executor.calls().is_empty(), "no item may run when the graph is cyclic");
}

/// Test: Unknown dependencies are rejected
#[tokio::test]
async fn test_unknown_dependency_rejected() {
    let executor = shared(MockExecutor::new());
    let mut chain = Chain::new(WorkflowId::new(), executor.clone());
    chain.add(item_after("a", &["ghost"])).unwrap();

    let err = chain.execute(&NoopObserver).await.unwrap_err();
    assert!(matches!(err, Error::UnknownDependency { ref dependency, .. } if dependency.as_str() == "ghost"));
    assert!(executor.calls().is_empty());
}

/// Test: Duplicate ids are rejected at add time
#[tokio::test]
async fn test_duplicate_rejected() {
    let mut chain = Chain::new(WorkflowId::new(), shared(MockExecutor::new()));
    chain.add(item("a")).unwrap();
    assert!(matches!(chain.add(item("a")), Err(Error::DuplicateItem(_))));
    assert_eq!(chain.len(), 1);
}

/// Test: Failure skips dependents transitively, siblings keep running
/// Given a -> b -> c and an independent d, with a failing
/// When the chain executes
/// Then b and c are skipped without running, d completes, status is partial
#[tokio::test]
async fn test_failure_skips_dependents_only() {
    let executor = shared(MockExecutor::new().fail("a", "agent crashed"));
    let mut chain = Chain::new(WorkflowId::new(), executor.clone());
    chain
        .add_all([item("a"), item_after("b", &["a"]), item_after("c", &["b"]), item("d")])
        .unwrap();
    let observer = RecordingObserver::default();

    let result = chain.execute(&observer).await.unwrap();

    assert_eq!(executor.calls(), vec!["a", "d"]);
    assert_eq!(result.status, WorkflowStatus::Partial);
    assert!(matches!(result.status_of(&"b".into()), Some(ItemStatus::Skipped { .. })));
    assert!(matches!(result.status_of(&"c".into()), Some(ItemStatus::Skipped { .. })));
    assert_eq!(result.status_of(&"d".into()), Some(&ItemStatus::Completed));
    assert_eq!(
        observer.events(),
        vec!["started:a", "failed:a", "skipped:b", "skipped:c", "started:d", "complete:d"]
    );
    // The failed item still contributes a response.
    assert!(!result.response_for(&"a".into()).unwrap().success);
}

/// Test: Every item failing yields a failed workflow
#[tokio::test]
async fn test_all_failed() {
    let executor = shared(MockExecutor::new().fail("a", "x").fail("b", "y"));
    let mut chain = Chain::new(WorkflowId::new(), executor);
    chain.add_all([item("a"), item("b")]).unwrap();

    let result = chain.execute(&NoopObserver).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Failed);
    assert!(!result.is_success());
}

/// Test: A panicking executor is contained
/// Given b panics and c is independent
/// When the chain executes
/// Then b is failed and c still completes
#[tokio::test]
async fn test_executor_panic_is_isolated() {
    let executor = shared(MockExecutor::new().panic("b"));
    let mut chain = Chain::new(WorkflowId::new(), executor);
    chain.add_all([item("b"), item("c")]).unwrap();

    let result = chain.execute(&NoopObserver).await.unwrap();
    match result.status_of(&"b".into()) {
        Some(ItemStatus::Failed { error, .. }) => assert!(error.contains("panicked")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(result.status_of(&"c".into()), Some(&ItemStatus::Completed));
}

/// Test: Templates run end to end through the channel observer
#[tokio::test]
async fn test_bug_fix_template_streams_events() {
    let executor = shared(MockExecutor::new());
    let mut chain = Chain::new(WorkflowId::new(), executor.clone());
    chain.add_all(WorkflowTemplate::BugFix.build("null deref")).unwrap();
    let (observer, rx) = ChannelObserver::bounded(32);

    let result = chain.execute(&observer).await.unwrap();
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(executor.calls(), vec!["explore", "implement", "test"]);

    let events: Vec<WorkflowEvent> = rx.try_iter().collect();
    let completed = events
        .iter()
        .filter(|e| matches!(e, WorkflowEvent::ItemCompleted { .. }))
        .count();
    assert_eq!(completed, 3);
    assert!(matches!(
        events.last(),
        Some(WorkflowEvent::WorkflowFinished {
            status: WorkflowStatus::Completed,
            ..
        })
    ));
}
