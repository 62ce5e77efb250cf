//! Progress events emitted by the pipeline runner.
//!
//! The runner never prints; front ends subscribe through [`RunObserver`].

use opsize_common::types::ContainerId;

use crate::execution::{OperatorExecution, PipelineReport};

/// A step of a profiling run.
#[derive(Debug, Clone, Copy)]
pub enum RunEvent<'a> {
    /// The run passed its preconditions.
    RunStarted {
        /// Pipeline name.
        pipeline: &'a str,
        /// Number of declared operators.
        operators: usize,
    },
    /// An operator is being provisioned.
    OperatorStarted {
        /// Zero-based position in declared order.
        index: usize,
        /// Number of declared operators.
        total: usize,
        /// Operator name.
        operator: &'a str,
    },
    /// The operator's container identifier was confirmed.
    ContainerStarted {
        /// Operator name.
        operator: &'a str,
        /// Container identifier.
        id: &'a ContainerId,
    },
    /// An operator finished, successfully or not.
    OperatorFinished {
        /// The finalized record.
        execution: &'a OperatorExecution,
    },
    /// An operator was not started because the run stopped.
    OperatorSkipped {
        /// Operator name.
        operator: &'a str,
    },
    /// The run finished and every resource was released.
    RunFinished {
        /// The final report.
        report: &'a PipelineReport,
    },
}

/// Receives run events.
pub trait RunObserver: Send + Sync {
    /// Handles one event.
    fn on_event(&self, event: &RunEvent<'_>);
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl RunObserver for NullObserver {
    fn on_event(&self, _event: &RunEvent<'_>) {}
}
