//! Side-services started before an operator.
//!
//! A service publishes its named connection ports to the operator as
//! `NAME=<address>:<port>` environment variables. Operators declaring
//! `models` without any service get a synthesized inference server.
//! Only model-serving services are polled for readiness.

use std::time::Duration;

use opsize_common::constants::{
    INFERENCE_GRPC_ENV_VAR, INFERENCE_GRPC_PORT, INFERENCE_HTTP_ENV_VARS, INFERENCE_HTTP_PORT,
    INFERENCE_SERVICE_NAME, MODELS_MOUNT_PATH, SERVICE_DATA_PATH_PLACEHOLDER,
    SERVICE_READY_POLL_MS,
};
use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::{ContainerId, ImageRef};
use opsize_manifest::model::{Connection, Connections, ContainerSpec, ModelRef, ServiceSpec};

/// A started and ready side-service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceHandle {
    /// Service name from the manifest.
    pub name: String,
    /// Container name used for teardown.
    pub container_name: String,
    /// Container identifier.
    pub id: ContainerId,
    /// Address of the service on the shared network.
    pub address: String,
    /// Environment variables exposing the service's endpoints.
    pub env: Vec<(String, String)>,
}

/// Builds the `NAME=<address>:<port>` variables for every connection.
#[must_use]
pub fn endpoint_env(connections: &Connections, address: &str) -> Vec<(String, String)> {
    connections
        .all()
        .map(|c| (c.name.clone(), format!("{address}:{}", c.port)))
        .collect()
}

/// Returns the service command with the data path placeholder removed,
/// so `$(NVIDIA_CLARA_SERVICE_DATA_PATH)/models` becomes `/models`.
#[must_use]
pub fn service_command(command: &[String]) -> Vec<String> {
    command
        .iter()
        .map(|token| token.replace(SERVICE_DATA_PATH_PLACEHOLDER, ""))
        .collect()
}

/// Synthesizes the inference server serving `models` from the models mount.
#[must_use]
pub fn inference_server(image: &ImageRef, models: &[ModelRef]) -> ServiceSpec {
    let mut command = vec![
        "tritonserver".to_string(),
        format!("--model-repository={MODELS_MOUNT_PATH}"),
        "--model-control-mode=explicit".to_string(),
    ];
    command.extend(models.iter().map(|m| format!("--load-model={}", m.name)));

    let http = INFERENCE_HTTP_ENV_VARS
        .iter()
        .map(|name| Connection {
            name: (*name).to_string(),
            port: INFERENCE_HTTP_PORT,
        })
        .collect();
    let grpc = vec![Connection {
        name: INFERENCE_GRPC_ENV_VAR.to_string(),
        port: INFERENCE_GRPC_PORT,
    }];

    ServiceSpec {
        name: INFERENCE_SERVICE_NAME.to_string(),
        container: ContainerSpec {
            image: image.image.clone(),
            tag: image.tag.clone(),
            command,
        },
        connections: Connections { http, grpc },
        model_repository: true,
        requests: opsize_manifest::model::ResourceRequests {
            gpu: 1,
            ..Default::default()
        },
    }
}

/// Polls `status_url` until the server answers, then `status_url/<model>`
/// for every model, all within one `timeout`.
///
/// # Errors
///
/// Returns `ServiceStartup` if the server or one of the models is not
/// ready in time.
pub async fn wait_models_ready(
    service: &str,
    status_url: &str,
    models: &[String],
    timeout: Duration,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + timeout;
    wait_ready(service, status_url, timeout).await?;
    for model in models {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        wait_ready(service, &format!("{status_url}/{model}"), remaining).await?;
        tracing::debug!(service, model = %model, "model ready");
    }
    Ok(())
}

/// Polls `url` until it answers HTTP 200 or `timeout` elapses.
///
/// # Errors
///
/// Returns `ServiceStartup` if the service never becomes ready.
pub async fn wait_ready(service: &str, url: &str, timeout: Duration) -> Result<()> {
    let poll = Duration::from_millis(SERVICE_READY_POLL_MS);
    let client = reqwest::Client::builder()
        .timeout(poll)
        .build()
        .map_err(|e| OpsizeError::ServiceStartup {
            service: service.to_string(),
            message: e.to_string(),
        })?;

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let last_error = match client.get(url).send().await {
            Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
                tracing::info!(service, url, "service ready");
                return Ok(());
            }
            Ok(resp) => format!("HTTP {}", resp.status()),
            Err(e) => e.to_string(),
        };
        if tokio::time::Instant::now() + poll > deadline {
            return Err(OpsizeError::ServiceStartup {
                service: service.to_string(),
                message: format!(
                    "not ready at {url} after {:.0}s: {last_error}",
                    timeout.as_secs_f64()
                ),
            });
        }
        tracing::debug!(service, url, %last_error, "service not ready yet");
        tokio::time::sleep(poll).await;
    }
}
