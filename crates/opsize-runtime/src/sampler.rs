//! Real-time resource sampling of a running operator.
//!
//! Polls cumulative cgroup counters at a fixed interval and turns
//! consecutive readings into CPU percent and working-set memory samples.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use opsize_common::constants::BYTES_PER_MEGABYTE;
use opsize_common::error::Result;
use opsize_common::types::{ContainerId, MetricSample};
use opsize_core::{CounterSource, RawCounters};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Turns two consecutive readings into one sample.
///
/// CPU percent is the container's share of the host CPU time elapsed
/// between the readings, scaled by the online CPU count so that one fully
/// busy core reads 100. It is never clamped.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_sample(
    previous: &RawCounters,
    current: &RawCounters,
    timestamp: DateTime<Utc>,
) -> MetricSample {
    let container_delta = current.container_cpu_ns.saturating_sub(previous.container_cpu_ns);
    let host_delta = current.host_cpu_ns.saturating_sub(previous.host_cpu_ns);
    let cpu_percent = if host_delta == 0 {
        0.0
    } else {
        container_delta as f64 / host_delta as f64 * f64::from(current.online_cpus) * 100.0
    };
    MetricSample {
        timestamp,
        cpu_percent,
        memory_mb: current.memory_bytes as f64 / BYTES_PER_MEGABYTE,
    }
}

/// Periodic sampler over a counter source.
#[derive(Clone)]
pub struct Sampler {
    source: Arc<dyn CounterSource>,
    interval: Duration,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Sampler {
    /// Creates a sampler reading `source` every `interval`.
    #[must_use]
    pub fn new(source: Arc<dyn CounterSource>, interval: Duration) -> Self {
        Self { source, interval }
    }

    /// Takes one reading of `id` against `baseline`.
    ///
    /// The first reading only establishes the baseline and yields no sample.
    ///
    /// # Errors
    ///
    /// Returns the counter source's error; `baseline` is then left unchanged.
    pub fn sample(
        &self,
        id: &ContainerId,
        baseline: &mut Option<RawCounters>,
    ) -> Result<Option<MetricSample>> {
        let current = self.source.read(id)?;
        let sample = baseline
            .as_ref()
            .map(|previous| compute_sample(previous, &current, Utc::now()));
        *baseline = Some(current);
        Ok(sample)
    }

    /// Starts sampling `id` on a background task.
    ///
    /// Every sample is also sent to `sink` when one is given. The task runs
    /// until `cancel` fires or the container's cgroup disappears.
    #[must_use]
    pub fn spawn(
        &self,
        id: ContainerId,
        sink: Option<UnboundedSender<MetricSample>>,
        cancel: CancellationToken,
    ) -> SamplingTask {
        let token = cancel.clone();
        let handle = tokio::spawn(sample_loop(self.clone(), id, sink, token));
        SamplingTask { cancel, handle }
    }
}

/// A running sampling loop.
#[derive(Debug)]
pub struct SamplingTask {
    cancel: CancellationToken,
    handle: JoinHandle<Vec<MetricSample>>,
}

impl SamplingTask {
    /// Stops the loop and returns every sample it produced.
    pub async fn stop(self) -> Vec<MetricSample> {
        self.cancel.cancel();
        match self.handle.await {
            Ok(samples) => samples,
            Err(e) => {
                tracing::warn!(error = %e, "sampling task failed");
                Vec::new()
            }
        }
    }
}

async fn sample_loop(
    sampler: Sampler,
    id: ContainerId,
    sink: Option<UnboundedSender<MetricSample>>,
    cancel: CancellationToken,
) -> Vec<MetricSample> {
    let interval = sampler.interval;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut baseline: Option<RawCounters> = None;
    let mut samples = Vec::new();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let started = Instant::now();
        match sampler.sample(&id, &mut baseline) {
            Ok(Some(sample)) => {
                if let Some(sink) = &sink {
                    let _ = sink.send(sample.clone());
                }
                samples.push(sample);
            }
            Ok(None) => {}
            Err(e) if e.is_not_found() => {
                if baseline.is_some() {
                    tracing::debug!(id = %id.short(), "cgroup gone, sampling ends");
                    break;
                }
                tracing::trace!(id = %id.short(), "cgroup not created yet");
            }
            Err(e) => {
                tracing::debug!(id = %id.short(), error = %e, "sample dropped");
            }
        }

        let elapsed = started.elapsed();
        if elapsed > interval {
            tracing::warn!(
                id = %id.short(),
                elapsed_ms = elapsed.as_millis(),
                interval_ms = interval.as_millis(),
                "sampling pass slower than interval"
            );
        }
    }

    tracing::debug!(id = %id.short(), samples = samples.len(), "sampling stopped");
    samples
}
