//! Command-line arguments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use opsize_common::config::{FailurePolicy, RunContext, SizingPolicy};
use opsize_common::constants::{
    DEFAULT_CPU_MARGIN, DEFAULT_MEMORY_HEADROOM_MB, DEFAULT_MEMORY_ROUND_MB, DEFAULT_NETWORK_NAME,
    ID_WAIT_TIMEOUT_SECS, SAMPLE_INTERVAL_MS,
};

/// Profile the CPU and memory usage of every operator of a pipeline.
#[derive(Parser, Debug)]
#[command(name = opsize_common::constants::BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Pipeline definition file (YAML).
    pub pipeline: PathBuf,

    /// Input payload directory, mounted into operators that read no upstream output.
    pub input_dir: PathBuf,

    /// Directory receiving one metrics file per operator and the run report.
    #[arg(long, env = "OPSIZE_METRICS_DIR")]
    pub metrics_dir: Option<PathBuf>,

    /// Models directory served by the inference server.
    #[arg(long, env = "OPSIZE_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Print launch commands, raw samples, and debug logs.
    #[arg(short, long)]
    pub verbose: bool,

    /// What to do when an operator fails.
    #[arg(long, value_enum, default_value_t = ForceMode::None, env = "OPSIZE_FORCE")]
    pub force: ForceMode,

    /// Name of the network shared by an operator and its services.
    #[arg(long, default_value = DEFAULT_NETWORK_NAME, env = "OPSIZE_NETWORK")]
    pub network: String,

    /// Seconds to wait for a launched container to report its ID.
    #[arg(long, default_value_t = ID_WAIT_TIMEOUT_SECS, env = "OPSIZE_ID_TIMEOUT",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub id_timeout: u64,

    /// Milliseconds between two samples.
    #[arg(long, default_value_t = SAMPLE_INTERVAL_MS, env = "OPSIZE_INTERVAL_MS",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub interval_ms: u64,

    /// Margin applied to the CPU maximum before rounding (0.2 = +20%).
    #[arg(long, default_value_t = DEFAULT_CPU_MARGIN, env = "OPSIZE_CPU_MARGIN")]
    pub cpu_margin: f64,

    /// Megabytes added to the memory maximum before rounding.
    #[arg(long, default_value_t = DEFAULT_MEMORY_HEADROOM_MB, env = "OPSIZE_MEMORY_HEADROOM_MB")]
    pub memory_headroom_mb: f64,

    /// Memory suggestions are rounded up to a multiple of this many megabytes.
    #[arg(long, default_value_t = DEFAULT_MEMORY_ROUND_MB, env = "OPSIZE_MEMORY_ROUND_MB",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub memory_round_mb: u64,
}

/// Failure handling mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForceMode {
    /// Ask after each failure; no answer stops the run.
    None,
    /// Keep going after failures.
    Cont,
    /// Stop at the first failure.
    Stop,
}

impl From<ForceMode> for FailurePolicy {
    fn from(mode: ForceMode) -> Self {
        match mode {
            ForceMode::None => Self::None,
            ForceMode::Cont => Self::Cont,
            ForceMode::Stop => Self::Stop,
        }
    }
}

impl Cli {
    /// Checks the paths and builds the run context.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline file or input directory is missing,
    /// or a margin is negative.
    pub fn run_context(&self) -> anyhow::Result<RunContext> {
        if !self.pipeline.is_file() {
            anyhow::bail!("pipeline definition not found: {}", self.pipeline.display());
        }
        require_dir(&self.input_dir, "input payload directory")?;
        if self.cpu_margin < 0.0 || self.memory_headroom_mb < 0.0 {
            anyhow::bail!("--cpu-margin and --memory-headroom-mb must not be negative");
        }

        let mut ctx = RunContext::new(self.input_dir.clone());
        ctx.models_dir.clone_from(&self.models_dir);
        ctx.metrics_dir.clone_from(&self.metrics_dir);
        ctx.failure_policy = self.force.into();
        ctx.verbose = self.verbose;
        ctx.network_name.clone_from(&self.network);
        ctx.id_timeout = Duration::from_secs(self.id_timeout);
        ctx.sample_interval = Duration::from_millis(self.interval_ms);
        ctx.sizing = SizingPolicy {
            cpu_margin: self.cpu_margin,
            memory_headroom_mb: self.memory_headroom_mb,
            memory_round_mb: self.memory_round_mb,
        };
        Ok(ctx)
    }
}

fn require_dir(path: &Path, what: &str) -> anyhow::Result<()> {
    if path.is_dir() {
        Ok(())
    } else {
        anyhow::bail!("{what} not found: {}", path.display())
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_match_constants() {
        let cli = Cli::try_parse_from(["opsize", "p.yaml", "in"]).expect("parse");
        assert_eq!(cli.force, ForceMode::None);
        assert_eq!(cli.network, "opsize-net");
        assert_eq!(cli.id_timeout, 15);
        assert_eq!(cli.interval_ms, 200);
        assert_eq!(cli.memory_round_mb, 256);
        assert!(cli.metrics_dir.is_none());
    }

    #[test]
    fn force_accepts_policy_names_only() {
        let cli = Cli::try_parse_from(["opsize", "p.yaml", "in", "--force", "cont"]).expect("parse");
        assert_eq!(FailurePolicy::from(cli.force), FailurePolicy::Cont);
        assert!(Cli::try_parse_from(["opsize", "p.yaml", "in", "--force", "retry"]).is_err());
        assert!(Cli::try_parse_from(["opsize", "p.yaml", "in", "--interval-ms", "0"]).is_err());
    }

    #[test]
    fn run_context_checks_paths() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pipeline = dir.path().join("pipeline.yaml");
        std::fs::write(&pipeline, "name: p\n").expect("write");
        let pipeline_arg = pipeline.to_string_lossy().into_owned();
        let input_arg = dir.path().to_string_lossy().into_owned();

        let cli = Cli::try_parse_from([
            "opsize",
            pipeline_arg.as_str(),
            input_arg.as_str(),
            "-v",
            "--force",
            "stop",
            "--interval-ms",
            "50",
        ])
        .expect("parse");
        let ctx = cli.run_context().expect("context");
        assert!(ctx.verbose);
        assert_eq!(ctx.failure_policy, FailurePolicy::Stop);
        assert_eq!(ctx.sample_interval, Duration::from_millis(50));

        let missing = Cli::try_parse_from(["opsize", pipeline_arg.as_str(), "/no/such/dir"]).expect("parse");
        assert!(missing.run_context().is_err());
    }
}
