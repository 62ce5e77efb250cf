//! The profiling command: wire the runtime, counters, and console together
//! and run the pipeline.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use opsize_core::cgroup::CgroupReader;
use opsize_profiler::PipelineRunner;
use opsize_runtime::backend::docker::DockerCli;
use opsize_runtime::backend::ContainerRuntime;
use tokio_util::sync::CancellationToken;

use crate::cli::Cli;
use crate::console::{ConsolePrompt, ConsoleReporter};

/// Runs the profiler and maps the outcome to the process exit status.
///
/// # Errors
///
/// Returns an error when a precondition fails before any container starts.
pub async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let ctx = cli.run_context()?;
    let manifest = opsize_manifest::load(&cli.pipeline)
        .with_context(|| format!("invalid pipeline definition {}", cli.pipeline.display()))?;

    let docker = DockerCli::new();
    if !docker.is_available() {
        anyhow::bail!(
            "`{}` was not found in PATH; install Docker to profile operators",
            docker.binary()
        );
    }
    let counters = CgroupReader::detect().context("cannot read host CPU properties")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    ctrlc::set_handler(move || {
        tracing::warn!("interrupted, stopping the current operator");
        on_interrupt.cancel();
    })
    .context("failed to set Ctrl+C handler")?;

    let console = Arc::new(ConsoleReporter::new(
        ctx.verbose,
        ctx.metrics_dir.is_some(),
        ctx.sizing.clone(),
    ));
    let runner = PipelineRunner::new(Arc::new(docker.clone()), Arc::new(counters))
        .with_runtime_binary(docker.binary())
        .with_observer(console)
        .with_prompt(Arc::new(ConsolePrompt));

    let report = runner.run(&manifest, &ctx, &cancel).await?;
    Ok(ExitCode::from(report.exit_code()))
}
