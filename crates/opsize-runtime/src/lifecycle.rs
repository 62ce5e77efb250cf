//! Lifecycle manager that provisions, runs, and tears down containers.
//!
//! Provides a high-level API over a [`ContainerRuntime`]: network
//! provisioning, side-service startup, detached operator launch with a
//! bounded identifier wait, cancellable exit wait, and best-effort teardown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use opsize_common::constants::{CONTAINER_NAME_PREFIX, MODELS_MOUNT_PATH};
use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::{ContainerId, ImageRef};
use opsize_manifest::model::ServiceSpec;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::{ContainerRuntime, LaunchSpec, Mount};
use crate::network::NetworkHandle;
use crate::service::{self, ServiceHandle};

/// An operator launch whose identifier has not been observed yet.
#[derive(Debug)]
pub struct PendingLaunch {
    operator: String,
    name: String,
    task: JoinHandle<Result<ContainerId>>,
}

impl PendingLaunch {
    /// Container name the launch was issued under.
    #[must_use]
    pub fn container_name(&self) -> &str {
        &self.name
    }
}

/// A running operator container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHandle {
    /// Operator name.
    pub operator: String,
    /// Container name.
    pub name: String,
    /// Runtime identifier.
    pub id: ContainerId,
}

/// How an exit wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The container exited with this code.
    Exited(i32),
    /// The wait was cancelled before the container exited.
    Cancelled,
}

/// Settings for starting a side-service.
#[derive(Debug, Clone, Copy)]
pub struct ServiceOptions<'a> {
    /// Models directory mounted into model-repository services.
    pub models_dir: Option<&'a Path>,
    /// Models the operator expects the model-repository service to serve.
    pub models: &'a [String],
    /// Status path probed on the first HTTP connection of a
    /// model-repository service.
    pub ready_path: &'a str,
    /// Bound on the readiness wait.
    pub ready_timeout: Duration,
}

/// Coordinates all container operations of a profiling run.
#[derive(Clone)]
pub struct LifecycleManager {
    runtime: Arc<dyn ContainerRuntime>,
}

impl std::fmt::Debug for LifecycleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleManager").finish_non_exhaustive()
    }
}

impl LifecycleManager {
    /// Creates a manager over the given runtime.
    #[must_use]
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self { runtime }
    }

    /// Returns the underlying runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    /// Makes sure an image is available locally, pulling it if needed.
    ///
    /// # Errors
    ///
    /// Returns `ImagePull` if the pull fails.
    pub async fn ensure_image(&self, image: &ImageRef) -> Result<()> {
        if self.runtime.image_present(image).await? {
            tracing::debug!(image = %image, "image present locally");
            return Ok(());
        }
        tracing::info!(image = %image, "image not found locally");
        self.runtime.pull_image(image).await
    }

    /// Fails if the reserved network name is already taken.
    ///
    /// # Errors
    ///
    /// Returns `NetworkConflict` if a network with this name exists.
    pub async fn ensure_network_free(&self, name: &str) -> Result<()> {
        if self.runtime.network_exists(name).await? {
            return Err(OpsizeError::NetworkConflict {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Creates the reserved network.
    ///
    /// # Errors
    ///
    /// Returns `NetworkConflict` if the name is taken, or a runtime error.
    pub async fn provision_network(&self, name: &str) -> Result<NetworkHandle> {
        self.ensure_network_free(name).await?;
        self.runtime.create_network(name).await?;
        Ok(NetworkHandle::new(name))
    }

    /// Starts a side-service on the network. A model-repository service
    /// is then polled until the server and every model in
    /// `options.models` report ready.
    ///
    /// The container is launched under `container_name`, which the caller
    /// records for teardown before calling.
    ///
    /// # Errors
    ///
    /// Returns `ServiceStartup` if the service cannot be started, has no
    /// address, or never becomes ready.
    pub async fn start_service(
        &self,
        spec: &ServiceSpec,
        container_name: &str,
        network: &NetworkHandle,
        options: ServiceOptions<'_>,
    ) -> Result<ServiceHandle> {
        let startup = |message: String| OpsizeError::ServiceStartup {
            service: spec.name.clone(),
            message,
        };

        let mut launch = LaunchSpec::new(container_name, spec.container.image_ref());
        launch.command = service::service_command(&spec.container.command);
        launch.network = Some(network.name().to_string());
        launch.gpus = spec.requests.gpu;
        if spec.model_repository {
            let models = options
                .models_dir
                .ok_or_else(|| startup("model repository requested without a models directory".into()))?;
            launch.mounts.push(Mount {
                source: models.to_path_buf(),
                target: MODELS_MOUNT_PATH.to_string(),
                read_only: true,
            });
        }

        tracing::info!(service = %spec.name, image = %launch.image, "starting service");
        let id = self
            .runtime
            .run_detached(&launch)
            .await
            .map_err(|e| startup(e.to_string()))?;
        let address = self
            .runtime
            .address(&id, network.name())
            .await
            .map_err(|e| startup(e.to_string()))?;

        match spec.connections.http.first() {
            Some(http) if spec.model_repository => {
                let url = format!("http://{address}:{}{}", http.port, options.ready_path);
                service::wait_models_ready(&spec.name, &url, options.models, options.ready_timeout)
                    .await?;
            }
            _ => tracing::debug!(service = %spec.name, "no readiness probe for this service"),
        }

        Ok(ServiceHandle {
            name: spec.name.clone(),
            container_name: container_name.to_string(),
            env: service::endpoint_env(&spec.connections, &address),
            id,
            address,
        })
    }

    /// Issues a detached operator launch without waiting for it.
    #[must_use]
    pub fn start_operator(&self, operator: &str, launch: LaunchSpec) -> PendingLaunch {
        let runtime = Arc::clone(&self.runtime);
        let name = launch.name.clone();
        tracing::info!(operator, container = %name, image = %launch.image, "launching operator");
        let task = tokio::spawn(async move { runtime.run_detached(&launch).await });
        PendingLaunch {
            operator: operator.to_string(),
            name,
            task,
        }
    }

    /// Waits up to `timeout` for a launch to report its container ID.
    ///
    /// On timeout or cancellation the launch attempt is aborted and the
    /// container, if it was created anyway, is killed.
    ///
    /// # Errors
    ///
    /// Returns `IdentifierTimeout` when the bound elapses, `Aborted` when
    /// `cancel` fires first, or `Launch` if the runtime rejected the launch.
    pub async fn await_identifier(
        &self,
        mut pending: PendingLaunch,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<ContainerHandle> {
        let outcome = tokio::select! {
            () = cancel.cancelled() => None,
            joined = tokio::time::timeout(timeout, &mut pending.task) => Some(joined),
        };
        let launch_error = |message: String| OpsizeError::Launch {
            operator: pending.operator.clone(),
            message,
        };
        match outcome {
            Some(Ok(Ok(Ok(id)))) => {
                tracing::info!(operator = %pending.operator, id = %id.short(), "container started");
                Ok(ContainerHandle {
                    operator: pending.operator.clone(),
                    name: pending.name.clone(),
                    id,
                })
            }
            Some(Ok(Ok(Err(e @ OpsizeError::Launch { .. })))) => Err(e),
            Some(Ok(Ok(Err(e)))) => Err(launch_error(e.to_string())),
            Some(Ok(Err(join))) => Err(launch_error(join.to_string())),
            Some(Err(_)) => {
                pending.task.abort();
                tracing::warn!(
                    operator = %pending.operator,
                    waited_secs = timeout.as_secs_f64(),
                    "no container ID reported, killing launch"
                );
                self.terminate(&pending.name).await;
                Err(OpsizeError::IdentifierTimeout {
                    operator: pending.operator.clone(),
                    waited_secs: timeout.as_secs_f64(),
                })
            }
            None => {
                pending.task.abort();
                self.terminate(&pending.name).await;
                Err(OpsizeError::Aborted {
                    operator: pending.operator.clone(),
                })
            }
        }
    }

    /// Waits for the container to exit, or for `cancel` to fire.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime wait fails.
    pub async fn await_completion(
        &self,
        handle: &ContainerHandle,
        cancel: &CancellationToken,
    ) -> Result<Completion> {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::warn!(operator = %handle.operator, "exit wait cancelled");
                Ok(Completion::Cancelled)
            }
            code = self.runtime.wait(&handle.id) => {
                let code = code?;
                tracing::info!(operator = %handle.operator, code, "container exited");
                Ok(Completion::Exited(code))
            }
        }
    }

    /// Force-kills a container by name. Failures are logged only.
    pub async fn terminate(&self, container_name: &str) {
        if let Err(e) = self.runtime.kill(container_name).await {
            tracing::warn!(container = container_name, error = %e, "kill failed");
        }
    }

    /// Removes the given containers, then the network.
    ///
    /// Every step is attempted; failures are logged and never returned so
    /// they cannot mask the failure that led here.
    pub async fn teardown(&self, containers: &[String], network: Option<&NetworkHandle>) {
        for name in containers {
            match self.runtime.remove(name).await {
                Ok(()) => tracing::debug!(container = %name, "container removed"),
                Err(e) => tracing::warn!(container = %name, error = %e, "container removal failed"),
            }
        }
        if let Some(network) = network {
            self.remove_network(network.name()).await;
        }
    }

    /// Removes a network by name, logging failures.
    pub async fn remove_network(&self, name: &str) {
        match self.runtime.remove_network(name).await {
            Ok(()) => tracing::debug!(network = name, "network removed"),
            Err(e) => tracing::warn!(network = name, error = %e, "network removal failed"),
        }
    }
}

/// Returns a unique, runtime-safe container name for an operator or one of
/// its services.
#[must_use]
pub fn container_name(operator: &str, service: Option<&str>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let mut name = format!("{CONTAINER_NAME_PREFIX}-{}", sanitize(operator));
    if let Some(service) = service {
        name.push('-');
        name.push_str(&sanitize(service));
    }
    name.push('-');
    name.push_str(&suffix[..8]);
    name
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}
