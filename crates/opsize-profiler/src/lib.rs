//! # opsize-profiler
//!
//! Sequential, failure-aware profiling of a containerized pipeline.
//!
//! Handles:
//! - **Runner**: one operator at a time, with provisioning, sampling, and teardown.
//! - **Aggregate**: average and maximum statistics plus suggested requests.
//! - **Policy**: continue, stop, or prompt after a failed operator.
//! - **Report**: console tables, per-operator metrics files, and a JSON run report.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod aggregate;
pub mod event;
pub mod execution;
pub mod metrics_file;
pub mod policy;
pub mod report;
pub mod runner;
pub mod workspace;

pub use execution::{OperatorExecution, PipelineReport, RunOutcome};
pub use runner::PipelineRunner;
