//! Run configuration passed explicitly through every component.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::OpsizeError;
use crate::types::ImageRef;

/// What to do when an operator fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Ask for a continue-or-stop decision; no answer means stop.
    #[default]
    None,
    /// Record the failure and continue with the next operator.
    Cont,
    /// Abort the remaining pipeline.
    Stop,
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Cont => write!(f, "cont"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = OpsizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(Self::None),
            "cont" => Ok(Self::Cont),
            "stop" => Ok(Self::Stop),
            other => Err(OpsizeError::Config {
                message: format!("unknown failure policy \"{other}\" (expected none, cont or stop)"),
            }),
        }
    }
}

/// Turns observed maxima into resource requests.
///
/// `cpu_cores = ceil(cpu_max * (1 + cpu_margin) / 100)` and
/// `memory_mb = ceil((memory_max + memory_headroom_mb) / memory_round_mb) * memory_round_mb`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizingPolicy {
    /// Fractional margin applied to the CPU maximum (0.2 = +20%).
    pub cpu_margin: f64,
    /// Megabytes added to the memory maximum.
    pub memory_headroom_mb: f64,
    /// Memory requests are rounded up to a multiple of this many megabytes.
    pub memory_round_mb: u64,
}

impl SizingPolicy {
    /// Converts a maximum CPU percentage into whole cores.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn suggest_cpu_cores(&self, cpu_max_percent: f64) -> u32 {
        let scaled = cpu_max_percent.max(0.0) * (1.0 + self.cpu_margin.max(0.0));
        (scaled / 100.0).ceil() as u32
    }

    /// Converts a maximum memory reading into a rounded request.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn suggest_memory_mb(&self, memory_max_mb: f64) -> u64 {
        let base = self.memory_round_mb.max(1);
        let wanted = memory_max_mb.max(0.0) + self.memory_headroom_mb.max(0.0);
        ((wanted / base as f64).ceil() as u64) * base
    }

    /// One-line description printed next to every summary table.
    #[must_use]
    pub fn describe(&self) -> String {
        format!(
            "cpu = ceil(max% x {:.2} / 100) cores; memory = max + {} MB rounded up to {} MB",
            1.0 + self.cpu_margin,
            self.memory_headroom_mb,
            self.memory_round_mb
        )
    }
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self {
            cpu_margin: constants::DEFAULT_CPU_MARGIN,
            memory_headroom_mb: constants::DEFAULT_MEMORY_HEADROOM_MB,
            memory_round_mb: constants::DEFAULT_MEMORY_ROUND_MB,
        }
    }
}

/// Per-invocation state of a profiling run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Input payload directory mounted into operators without a `from` input.
    pub input_dir: PathBuf,
    /// Models directory, required when any operator declares `models`.
    pub models_dir: Option<PathBuf>,
    /// Metrics output directory; `None` writes to the console only.
    pub metrics_dir: Option<PathBuf>,
    /// Failure handling mode for the whole run.
    pub failure_policy: FailurePolicy,
    /// Whether to print launch parameters and raw samples.
    pub verbose: bool,
    /// Reserved name of the operator/service network.
    pub network_name: String,
    /// Bound on waiting for a container ID.
    pub id_timeout: Duration,
    /// Interval between two metric samples.
    pub sample_interval: Duration,
    /// Bound on waiting for a service to become ready.
    pub service_ready_timeout: Duration,
    /// HTTP path polled on a service's first HTTP connection.
    pub service_ready_path: String,
    /// Image of the inference server synthesized for `models` operators.
    pub inference_image: ImageRef,
    /// Sizing rule for suggested requests.
    pub sizing: SizingPolicy,
    /// Parent directory for per-operator scratch output; system temp if `None`.
    pub data_root: Option<PathBuf>,
}

impl RunContext {
    /// Creates a context with default settings for the given input payload.
    #[must_use]
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            models_dir: None,
            metrics_dir: None,
            failure_policy: FailurePolicy::default(),
            verbose: false,
            network_name: constants::DEFAULT_NETWORK_NAME.into(),
            id_timeout: Duration::from_secs(constants::ID_WAIT_TIMEOUT_SECS),
            sample_interval: Duration::from_millis(constants::SAMPLE_INTERVAL_MS),
            service_ready_timeout: Duration::from_secs(constants::SERVICE_READY_TIMEOUT_SECS),
            service_ready_path: constants::SERVICE_READY_PATH.into(),
            inference_image: ImageRef::new(
                constants::INFERENCE_SERVER_IMAGE,
                constants::INFERENCE_SERVER_TAG,
            ),
            sizing: SizingPolicy::default(),
            data_root: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_policy_parses_case_insensitive() {
        assert_eq!("none".parse::<FailurePolicy>().ok(), Some(FailurePolicy::None));
        assert_eq!("CONT".parse::<FailurePolicy>().ok(), Some(FailurePolicy::Cont));
        assert_eq!("Stop".parse::<FailurePolicy>().ok(), Some(FailurePolicy::Stop));
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn default_policy_is_none() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::None);
        assert_eq!(FailurePolicy::default().to_string(), "none");
    }

    #[test]
    fn cpu_cores_round_up() {
        let policy = SizingPolicy::default();
        assert_eq!(policy.suggest_cpu_cores(0.0), 0);
        assert_eq!(policy.suggest_cpu_cores(1.0), 1);
        assert_eq!(policy.suggest_cpu_cores(100.0), 1);
        assert_eq!(policy.suggest_cpu_cores(100.5), 2);
        assert_eq!(policy.suggest_cpu_cores(350.0), 4);
    }

    #[test]
    fn cpu_margin_is_applied() {
        let policy = SizingPolicy {
            cpu_margin: 0.5,
            ..SizingPolicy::default()
        };
        assert_eq!(policy.suggest_cpu_cores(100.0), 2);
        assert_eq!(policy.suggest_cpu_cores(60.0), 1);
    }

    #[test]
    fn memory_gets_headroom_and_rounding() {
        let policy = SizingPolicy::default();
        assert_eq!(policy.suggest_memory_mb(0.0), 256);
        assert_eq!(policy.suggest_memory_mb(156.0), 256);
        assert_eq!(policy.suggest_memory_mb(156.1), 512);
        assert_eq!(policy.suggest_memory_mb(1000.0), 1280);
    }

    #[test]
    fn zero_rounding_base_does_not_divide_by_zero() {
        let policy = SizingPolicy {
            memory_round_mb: 0,
            memory_headroom_mb: 0.0,
            ..SizingPolicy::default()
        };
        assert_eq!(policy.suggest_memory_mb(10.2), 11);
    }

    #[test]
    fn run_context_defaults() {
        let ctx = RunContext::new("/data/input");
        assert_eq!(ctx.network_name, "opsize-net");
        assert_eq!(ctx.id_timeout, Duration::from_secs(15));
        assert_eq!(ctx.sample_interval, Duration::from_millis(200));
        assert!(ctx.metrics_dir.is_none());
        assert_eq!(ctx.inference_image.tag, "20.07-v1-py3");
    }
}
