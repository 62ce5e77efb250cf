//! Per-operator execution records and the run report.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use opsize_common::config::SizingPolicy;
use opsize_common::types::{ContainerId, ExecutionStatus, MetricSample, MetricSummary};
use serde::{Deserialize, Serialize};

/// Outcome of one operator.
///
/// Created when the operator begins, filled in by the lifecycle and the
/// sampler, and finalized with its summary. Never reused.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorExecution {
    /// Operator name.
    pub operator: String,
    /// Container identifier, once known.
    pub container_id: Option<ContainerId>,
    /// When the identifier was confirmed.
    pub started_at: Option<DateTime<Utc>>,
    /// When exit or termination was observed.
    pub finished_at: Option<DateTime<Utc>>,
    /// Exit code; negative when the container was forcibly terminated.
    pub exit_code: Option<i32>,
    /// Samples taken while the container ran.
    #[serde(skip)]
    pub samples: Vec<MetricSample>,
    /// Statistics over `samples`.
    pub summary: Option<MetricSummary>,
    /// Terminal status.
    pub status: ExecutionStatus,
    /// Why the operator failed, timed out, or was skipped.
    pub reason: Option<String>,
    /// Command line that reproduces the operator launch.
    pub launch_command: Option<String>,
    /// Per-operator metrics file, when one was written.
    pub metrics_file: Option<PathBuf>,
}

impl OperatorExecution {
    /// Creates the record of an operator about to start.
    ///
    /// The status stays `failed` until an exit code of zero is recorded.
    #[must_use]
    pub fn begin(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            container_id: None,
            started_at: None,
            finished_at: None,
            exit_code: None,
            samples: Vec::new(),
            summary: None,
            status: ExecutionStatus::Failed,
            reason: None,
            launch_command: None,
            metrics_file: None,
        }
    }

    /// Creates the record of an operator that was never started.
    #[must_use]
    pub fn skipped(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Skipped,
            reason: Some(reason.into()),
            ..Self::begin(operator)
        }
    }

    /// Records the container's exit code and the resulting status.
    pub fn record_exit(&mut self, code: i32) {
        self.exit_code = Some(code);
        if code == 0 {
            self.status = ExecutionStatus::Succeeded;
            self.reason = None;
        } else {
            self.status = ExecutionStatus::Failed;
            self.reason = Some(format!("exited with code {code}"));
        }
    }

    /// Marks the operator as failed with a reason.
    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = ExecutionStatus::Failed;
        self.reason = Some(reason.into());
    }

    /// Returns the wall-clock window during which the container ran.
    #[must_use]
    pub fn window(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        self.started_at.zip(self.finished_at)
    }
}

/// Terminal outcome of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every operator exited with code zero.
    AllSucceeded,
    /// The run stopped before every operator was attempted.
    AbortedEarly,
    /// Every operator was attempted and at least one failed.
    CompletedWithFailures,
}

impl std::fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllSucceeded => write!(f, "all succeeded"),
            Self::AbortedEarly => write!(f, "aborted early"),
            Self::CompletedWithFailures => write!(f, "completed with failures"),
        }
    }
}

/// Ordered execution records plus the run outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Pipeline name.
    pub pipeline: String,
    /// One record per declared operator, in declared order.
    pub executions: Vec<OperatorExecution>,
    /// Terminal outcome.
    pub outcome: RunOutcome,
    /// Sizing rule used for the suggestions.
    pub sizing: SizingPolicy,
}

impl PipelineReport {
    /// Builds the report and derives the outcome.
    #[must_use]
    pub fn new(
        pipeline: impl Into<String>,
        executions: Vec<OperatorExecution>,
        aborted: bool,
        sizing: SizingPolicy,
    ) -> Self {
        let outcome = if aborted {
            RunOutcome::AbortedEarly
        } else if executions.iter().any(|e| e.status.is_failure()) {
            RunOutcome::CompletedWithFailures
        } else {
            RunOutcome::AllSucceeded
        };
        Self {
            pipeline: pipeline.into(),
            executions,
            outcome,
            sizing,
        }
    }

    /// Number of operators that were started.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.executions
            .iter()
            .filter(|e| e.status != ExecutionStatus::Skipped)
            .count()
    }

    /// Number of operators that were never started.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.executions.len() - self.attempted()
    }

    /// Number of failed or timed-out operators.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.executions
            .iter()
            .filter(|e| e.status.is_failure())
            .count()
    }

    /// Process exit status for this outcome.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self.outcome {
            RunOutcome::AllSucceeded => 0,
            RunOutcome::AbortedEarly | RunOutcome::CompletedWithFailures => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_drives_status() {
        let mut e = OperatorExecution::begin("a");
        assert_eq!(e.status, ExecutionStatus::Failed);
        e.record_exit(0);
        assert_eq!(e.status, ExecutionStatus::Succeeded);
        e.record_exit(137);
        assert_eq!(e.status, ExecutionStatus::Failed);
        assert_eq!(e.reason.as_deref(), Some("exited with code 137"));
    }

    #[test]
    fn outcome_is_derived() {
        let mut ok = OperatorExecution::begin("a");
        ok.record_exit(0);
        let mut bad = OperatorExecution::begin("b");
        bad.record_exit(1);

        let all = PipelineReport::new("p", vec![ok.clone()], false, SizingPolicy::default());
        assert_eq!(all.outcome, RunOutcome::AllSucceeded);
        assert_eq!(all.exit_code(), 0);

        let failed = PipelineReport::new("p", vec![ok.clone(), bad.clone()], false, SizingPolicy::default());
        assert_eq!(failed.outcome, RunOutcome::CompletedWithFailures);
        assert_eq!(failed.failures(), 1);
        assert_eq!(failed.exit_code(), 1);

        let aborted = PipelineReport::new(
            "p",
            vec![ok, bad, OperatorExecution::skipped("c", "run stopped")],
            true,
            SizingPolicy::default(),
        );
        assert_eq!(aborted.outcome, RunOutcome::AbortedEarly);
        assert_eq!(aborted.attempted(), 2);
        assert_eq!(aborted.skipped(), 1);
    }

    #[test]
    fn report_serializes_without_samples() {
        let mut e = OperatorExecution::begin("a");
        e.samples.push(MetricSample {
            timestamp: Utc::now(),
            cpu_percent: 1.0,
            memory_mb: 1.0,
        });
        let report = PipelineReport::new("p", vec![e], false, SizingPolicy::default());
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(json.contains("\"outcome\":\"completed_with_failures\""), "got: {json}");
        assert!(!json.contains("samples"));
    }
}
