//! Domain primitive types used across the opsize workspace.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of a running container as reported by the runtime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the 12-character prefix used in console output.
    #[must_use]
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Image name plus tag, e.g. `nvcr.io/clara/reader:0.8.1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRef {
    /// Repository, optionally prefixed by a registry host.
    pub image: String,
    /// Image tag.
    pub tag: String,
}

impl ImageRef {
    /// Creates an image reference from its repository and tag.
    #[must_use]
    pub fn new(image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            tag: tag.into(),
        }
    }

    /// Returns the registry host this image is pulled from.
    ///
    /// The first path segment names a registry when it contains a `.` or
    /// a `:`, or is `localhost`; otherwise the default registry is used.
    #[must_use]
    pub fn registry(&self) -> &str {
        match self.image.split_once('/') {
            Some((first, _))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                first
            }
            _ => "docker.io",
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.image, self.tag)
    }
}

/// Terminal status of one operator execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The container exited with code zero.
    Succeeded,
    /// The container exited non-zero, or could not be provisioned.
    Failed,
    /// The runtime never reported a container ID and the launch was killed.
    TimedOut,
    /// The operator was never started because the run stopped earlier.
    Skipped,
}

impl ExecutionStatus {
    /// Returns whether this status counts as a failure for the run outcome.
    #[must_use]
    pub const fn is_failure(self) -> bool {
        matches!(self, Self::Failed | Self::TimedOut)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// One resource reading of a running container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    /// Wall-clock time of the reading.
    pub timestamp: DateTime<Utc>,
    /// CPU usage in percent of one core; exceeds 100 under multi-core load.
    pub cpu_percent: f64,
    /// Working-set memory in megabytes.
    pub memory_mb: f64,
}

/// Summary statistics of one operator's sample series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    /// Mean CPU percent.
    pub cpu_avg: f64,
    /// Maximum CPU percent.
    pub cpu_max: f64,
    /// Mean memory in megabytes.
    pub memory_avg: f64,
    /// Maximum memory in megabytes.
    pub memory_max: f64,
    /// Suggested CPU request in whole cores.
    pub suggested_cpu_cores: u32,
    /// Suggested memory request in megabytes.
    pub suggested_memory_mb: u64,
    /// Number of samples the statistics were computed from.
    pub sample_count: usize,
    /// False when no sample was collected and the statistics are zeroed.
    pub reliable: bool,
}
