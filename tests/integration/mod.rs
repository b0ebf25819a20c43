//! Integration test suite for agentflow.
//!
//! These tests drive the public API end to end with a scripted executor:
//! items are built, run by an orchestrator, checkpointed, and aggregated.
//!
//! # Test Categories
//!
//! - `chain_execution`: Dependency-ordered sequential runs
//! - `parallel_pool`: Bounded concurrency, timeouts and streaming
//! - `aggregation`: Merging, conflicts, metrics and summaries
//! - `recovery`: Checkpoint persistence and resume
//!
//! # CI Compatibility
//!
//! No agent is ever launched; the mock executor only sleeps and returns
//! canned responses, so the suite is safe to run anywhere.

mod fixtures;

mod aggregation;
mod chain_execution;
