//! Pipeline runner that profiles operators one at a time.
//!
//! For each operator in declared order: provision images, network and
//! services, launch the container, sample it until it exits, aggregate,
//! tear everything down, then let the failure policy decide whether the
//! run goes on.

use std::sync::Arc;

use chrono::Utc;
use opsize_common::config::RunContext;
use opsize_common::constants::{FORCED_TERMINATION_EXIT_CODE, OPERATOR_BASE_ENV};
use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::{ExecutionStatus, ImageRef};
use opsize_core::CounterSource;
use opsize_manifest::model::{OperatorSpec, PipelineManifest, ServiceSpec};
use opsize_runtime::backend::{ContainerRuntime, LaunchSpec};
use opsize_runtime::lifecycle::{self, Completion, ContainerHandle, LifecycleManager, ServiceOptions};
use opsize_runtime::network::NetworkHandle;
use opsize_runtime::sampler::Sampler;
use opsize_runtime::service;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{summarize, within_window};
use crate::event::{NullObserver, RunEvent, RunObserver};
use crate::execution::{OperatorExecution, PipelineReport};
use crate::metrics_file::MetricsFile;
use crate::policy::{Decision, DecisionPrompt, FailurePolicyEngine};
use crate::report;
use crate::workspace::DataWorkspace;

/// Drives a profiling run over a container runtime and a counter source.
pub struct PipelineRunner {
    lifecycle: LifecycleManager,
    counters: Arc<dyn CounterSource>,
    prompt: Option<Arc<dyn DecisionPrompt>>,
    observer: Arc<dyn RunObserver>,
    runtime_bin: String,
}

impl std::fmt::Debug for PipelineRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("runtime_bin", &self.runtime_bin)
            .finish_non_exhaustive()
    }
}

/// Resources held by the operator in flight, released by teardown.
#[derive(Debug, Default)]
struct Held {
    containers: Vec<String>,
    network: Option<NetworkHandle>,
}

/// Per-run state shared by every operator.
struct Scope<'a> {
    ctx: &'a RunContext,
    workspace: &'a DataWorkspace,
    sampler: &'a Sampler,
}

impl PipelineRunner {
    /// Creates a runner with no prompt and no observer.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>, counters: Arc<dyn CounterSource>) -> Self {
        Self {
            lifecycle: LifecycleManager::new(runtime),
            counters,
            prompt: None,
            observer: Arc::new(NullObserver),
            runtime_bin: opsize_common::constants::DOCKER_BIN.to_string(),
        }
    }

    /// Sets the decision source used by the `none` failure policy.
    #[must_use]
    pub fn with_prompt(mut self, prompt: Arc<dyn DecisionPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Sets the receiver of progress events.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Sets the runtime binary shown in reproducible launch commands.
    #[must_use]
    pub fn with_runtime_binary(mut self, bin: impl Into<String>) -> Self {
        self.runtime_bin = bin.into();
        self
    }

    /// Profiles every operator of `manifest` in declared order.
    ///
    /// Cancelling `cancel` kills the operator in flight and skips the rest.
    ///
    /// # Errors
    ///
    /// Returns an error only for precondition failures, before any
    /// container is started: invalid manifest, inconsistent models
    /// directory, reserved network already present, or an unusable
    /// metrics or scratch directory. Operator failures are recorded in the
    /// report instead.
    pub async fn run(
        &self,
        manifest: &PipelineManifest,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<PipelineReport> {
        opsize_manifest::validator::validate(manifest)?;
        let models = opsize_manifest::models::check_models_directory(manifest, ctx.models_dir.as_deref())?;
        if !models.is_empty() {
            tracing::info!(?models, "models directory verified");
        }
        self.lifecycle.ensure_network_free(&ctx.network_name).await?;
        if let Some(dir) = &ctx.metrics_dir {
            std::fs::create_dir_all(dir).map_err(|e| OpsizeError::Io {
                path: dir.clone(),
                source: e,
            })?;
        }
        let workspace = DataWorkspace::new(ctx.data_root.as_deref(), &ctx.input_dir)?;
        let sampler = Sampler::new(Arc::clone(&self.counters), ctx.sample_interval);
        let policy = FailurePolicyEngine::new(ctx.failure_policy, self.prompt.clone());
        let scope = Scope {
            ctx,
            workspace: &workspace,
            sampler: &sampler,
        };

        let total = manifest.operators.len();
        tracing::info!(pipeline = %manifest.name, operators = total, policy = %ctx.failure_policy, "profiling run started");
        self.observer.on_event(&RunEvent::RunStarted {
            pipeline: &manifest.name,
            operators: total,
        });

        let mut executions = Vec::with_capacity(total);
        let mut stopped = false;
        for (index, op) in manifest.operators.iter().enumerate() {
            if stopped || cancel.is_cancelled() {
                stopped = true;
                tracing::info!(operator = %op.name, "operator skipped");
                self.observer
                    .on_event(&RunEvent::OperatorSkipped { operator: &op.name });
                executions.push(OperatorExecution::skipped(&op.name, "run stopped before this operator"));
                continue;
            }

            self.observer.on_event(&RunEvent::OperatorStarted {
                index,
                total,
                operator: &op.name,
            });
            let exec = self.run_operator(op, &scope, cancel).await;
            self.observer
                .on_event(&RunEvent::OperatorFinished { execution: &exec });

            if exec.status.is_failure() {
                stopped = cancel.is_cancelled() || policy.on_failure(&exec).await == Decision::Stop;
            }
            executions.push(exec);
        }

        if manifest.operators.iter().any(OperatorSpec::needs_network) {
            self.lifecycle.remove_network(&ctx.network_name).await;
        }
        workspace.close();

        let aborted = cancel.is_cancelled()
            || executions
                .iter()
                .any(|e| e.status == ExecutionStatus::Skipped);
        let report = PipelineReport::new(&manifest.name, executions, aborted, ctx.sizing.clone());
        if let Some(dir) = &ctx.metrics_dir {
            if let Err(e) = report::write_json(&report, dir) {
                tracing::warn!(error = %e, "run report not written");
            }
        }
        tracing::info!(outcome = %report.outcome, attempted = report.attempted(), skipped = report.skipped(), "profiling run finished");
        self.observer.on_event(&RunEvent::RunFinished { report: &report });
        Ok(report)
    }

    /// Runs one operator and always tears down what it provisioned.
    async fn run_operator(
        &self,
        op: &OperatorSpec,
        scope: &Scope<'_>,
        cancel: &CancellationToken,
    ) -> OperatorExecution {
        let op_cancel = cancel.child_token();
        let mut exec = OperatorExecution::begin(&op.name);
        let mut held = Held::default();

        let result = self
            .execute(op, scope, &op_cancel, &mut exec, &mut held)
            .await;
        self.lifecycle
            .teardown(&held.containers, held.network.as_ref())
            .await;

        if let Err(e) = result {
            tracing::warn!(operator = %op.name, error = %e, "operator failed");
            record_error(&mut exec, &e);
        }
        exec
    }

    async fn execute(
        &self,
        op: &OperatorSpec,
        scope: &Scope<'_>,
        cancel: &CancellationToken,
        exec: &mut OperatorExecution,
        held: &mut Held,
    ) -> Result<()> {
        let ctx = scope.ctx;
        let aborted = || OpsizeError::Aborted {
            operator: op.name.clone(),
        };

        let services = effective_services(op, &ctx.inference_image);
        self.lifecycle.ensure_image(&op.container.image_ref()).await?;
        for spec in &services {
            self.lifecycle.ensure_image(&spec.container.image_ref()).await?;
        }
        if cancel.is_cancelled() {
            return Err(aborted());
        }

        let mut env: Vec<(String, String)> = OPERATOR_BASE_ENV
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();

        if op.needs_network() {
            held.network = Some(self.lifecycle.provision_network(&ctx.network_name).await?);
        }
        if let Some(network) = &held.network {
            let models: Vec<String> = op.models.iter().map(|m| m.name.clone()).collect();
            let options = ServiceOptions {
                models_dir: ctx.models_dir.as_deref(),
                models: &models,
                ready_path: &ctx.service_ready_path,
                ready_timeout: ctx.service_ready_timeout,
            };
            for spec in &services {
                let name = lifecycle::container_name(&op.name, Some(&spec.name));
                held.containers.push(name.clone());
                let handle = tokio::select! {
                    () = cancel.cancelled() => return Err(aborted()),
                    started = self.lifecycle.start_service(spec, &name, network, options) => started?,
                };
                env.extend(handle.env);
            }
        }
        env.extend(op.variables.iter().map(|(k, v)| (k.clone(), v.clone())));

        let mut launch = LaunchSpec::new(
            lifecycle::container_name(&op.name, None),
            op.container.image_ref(),
        );
        launch.command.clone_from(&op.container.command);
        launch.env = env;
        launch.mounts = scope.workspace.mounts(op)?;
        launch.network = held.network.as_ref().map(|n| n.name().to_string());
        launch.gpus = op.requests.gpu;
        let command_line = launch.command_line(&self.runtime_bin);
        tracing::debug!(operator = %op.name, command = %command_line, "operator launch command");
        exec.launch_command = Some(command_line);
        held.containers.push(launch.name.clone());

        let pending = self.lifecycle.start_operator(&op.name, launch);
        let handle = self
            .lifecycle
            .await_identifier(pending, ctx.id_timeout, cancel)
            .await?;
        self.observe(op, scope, cancel, &handle, exec).await
    }

    /// Samples a started operator until it exits or the run is cancelled,
    /// then records its window, samples, and summary.
    async fn observe(
        &self,
        op: &OperatorSpec,
        scope: &Scope<'_>,
        cancel: &CancellationToken,
        handle: &ContainerHandle,
        exec: &mut OperatorExecution,
    ) -> Result<()> {
        let started = Utc::now();
        exec.container_id = Some(handle.id.clone());
        exec.started_at = Some(started);
        self.observer.on_event(&RunEvent::ContainerStarted {
            operator: &op.name,
            id: &handle.id,
        });

        let metrics_file = match &scope.ctx.metrics_dir {
            Some(dir) => match MetricsFile::create(dir, &op.name) {
                Ok(file) => Some(file),
                Err(e) => {
                    tracing::warn!(operator = %op.name, error = %e, "metrics file unavailable");
                    None
                }
            },
            None => None,
        };
        let sampling = scope.sampler.spawn(
            handle.id.clone(),
            metrics_file.as_ref().map(MetricsFile::sink),
            cancel.child_token(),
        );

        let completion = self.lifecycle.await_completion(handle, cancel).await;
        let finished = Utc::now();
        if !matches!(completion, Ok(Completion::Exited(_))) {
            self.lifecycle.terminate(&handle.name).await;
        }
        let samples = sampling.stop().await;
        exec.finished_at = Some(finished);

        if let Some(file) = metrics_file {
            let path = file.path().to_path_buf();
            match file.finish().await {
                Ok(_) => exec.metrics_file = Some(path),
                Err(e) => tracing::warn!(operator = %op.name, error = %e, "metrics file incomplete"),
            }
        }
        exec.samples = within_window(samples, started, finished);
        exec.summary = Some(summarize(&exec.samples, &scope.ctx.sizing));

        match completion? {
            Completion::Exited(code) => {
                exec.record_exit(code);
                Ok(())
            }
            Completion::Cancelled => Err(OpsizeError::Aborted {
                operator: op.name.clone(),
            }),
        }
    }
}

/// Declared services, or a synthesized inference server for an operator
/// that declares models without any service.
fn effective_services(op: &OperatorSpec, inference_image: &ImageRef) -> Vec<ServiceSpec> {
    if op.services.is_empty() && !op.models.is_empty() {
        vec![service::inference_server(inference_image, &op.models)]
    } else {
        op.services.clone()
    }
}

fn record_error(exec: &mut OperatorExecution, err: &OpsizeError) {
    match err {
        OpsizeError::IdentifierTimeout { .. } => {
            exec.status = ExecutionStatus::TimedOut;
            exec.exit_code = Some(FORCED_TERMINATION_EXIT_CODE);
            exec.reason = Some(err.to_string());
        }
        OpsizeError::Aborted { .. } => {
            exec.fail("aborted");
            if exec.container_id.is_some() {
                exec.exit_code = Some(FORCED_TERMINATION_EXIT_CODE);
            }
        }
        _ => exec.fail(err.to_string()),
    }
}
