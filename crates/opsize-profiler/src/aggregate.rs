//! Reduction of a sample series into summary statistics.

use chrono::{DateTime, Utc};
use opsize_common::config::SizingPolicy;
use opsize_common::types::{MetricSample, MetricSummary};

/// Computes average and maximum CPU and memory, and the suggested requests.
///
/// An empty series yields all zeros with `reliable = false`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn summarize(samples: &[MetricSample], policy: &SizingPolicy) -> MetricSummary {
    if samples.is_empty() {
        return MetricSummary {
            cpu_avg: 0.0,
            cpu_max: 0.0,
            memory_avg: 0.0,
            memory_max: 0.0,
            suggested_cpu_cores: 0,
            suggested_memory_mb: 0,
            sample_count: 0,
            reliable: false,
        };
    }

    let count = samples.len() as f64;
    let cpu_avg = samples.iter().map(|s| s.cpu_percent).sum::<f64>() / count;
    let memory_avg = samples.iter().map(|s| s.memory_mb).sum::<f64>() / count;
    let cpu_max = samples.iter().map(|s| s.cpu_percent).fold(0.0, f64::max);
    let memory_max = samples.iter().map(|s| s.memory_mb).fold(0.0, f64::max);

    MetricSummary {
        cpu_avg,
        cpu_max,
        memory_avg,
        memory_max,
        suggested_cpu_cores: policy.suggest_cpu_cores(cpu_max),
        suggested_memory_mb: policy.suggest_memory_mb(memory_max),
        sample_count: samples.len(),
        reliable: true,
    }
}

/// Keeps only the samples taken strictly inside `(start, end)`.
#[must_use]
pub fn within_window(
    samples: Vec<MetricSample>,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<MetricSample> {
    samples
        .into_iter()
        .filter(|s| s.timestamp > start && s.timestamp < end)
        .collect()
}
