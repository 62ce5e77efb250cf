//! Data model of a pipeline definition.
//!
//! Field names follow the kebab-case YAML layout of the pipeline
//! definition (`pull-secrets`, `model-repository`, ...).

use std::collections::BTreeMap;

use opsize_common::types::ImageRef;
use serde::{Deserialize, Serialize};

/// Root of a pipeline definition. Immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PipelineManifest {
    /// Schema version of the definition, if declared.
    #[serde(default)]
    pub api_version: Option<String>,
    /// Pipeline name.
    pub name: String,
    /// Orchestrator tag, e.g. `Clara`.
    #[serde(default)]
    pub orchestrator: Option<String>,
    /// Registry pull secrets referenced by the pipeline.
    #[serde(default)]
    pub pull_secrets: Vec<String>,
    /// Operators in declared execution order.
    #[serde(default)]
    pub operators: Vec<OperatorSpec>,
}

impl PipelineManifest {
    /// Returns whether any operator or service needs the models directory:
    /// an operator declaring `models`, or a service marked
    /// `model-repository`.
    #[must_use]
    pub fn needs_models_dir(&self) -> bool {
        self.operators
            .iter()
            .any(|op| !op.models.is_empty() || op.services.iter().any(|s| s.model_repository))
    }

    /// Returns the distinct model names declared across all operators.
    #[must_use]
    pub fn model_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .operators
            .iter()
            .flat_map(|op| op.models.iter().map(|m| m.name.as_str()))
            .collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

/// Container image, tag and command of an operator or service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSpec {
    /// Image repository.
    pub image: String,
    /// Image tag.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Command tokens overriding the image entrypoint arguments.
    #[serde(default)]
    pub command: Vec<String>,
}

impl ContainerSpec {
    /// Returns the `image:tag` reference.
    #[must_use]
    pub fn image_ref(&self) -> ImageRef {
        ImageRef::new(&self.image, &self.tag)
    }
}

fn default_tag() -> String {
    "latest".into()
}

/// One stage of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OperatorSpec {
    /// Unique operator name.
    pub name: String,
    /// Container to run.
    pub container: ContainerSpec,
    /// Environment variables passed to the container.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Input mounts.
    #[serde(default, rename = "input")]
    pub inputs: Vec<InputSpec>,
    /// Output mounts.
    #[serde(default, rename = "output")]
    pub outputs: Vec<OutputSpec>,
    /// Side-services started before the operator.
    #[serde(default)]
    pub services: Vec<ServiceSpec>,
    /// Models the operator expects an inference server to serve.
    #[serde(default)]
    pub models: Vec<ModelRef>,
    /// Declared resource hints.
    #[serde(default)]
    pub requests: ResourceRequests,
}

impl OperatorSpec {
    /// Names of the upstream operators this one reads from.
    pub fn upstream(&self) -> impl Iterator<Item = &str> {
        self.inputs.iter().filter_map(|i| i.from.as_deref())
    }

    /// Returns whether the operator must share a network with services.
    #[must_use]
    pub fn needs_network(&self) -> bool {
        !self.services.is_empty() || !self.models.is_empty()
    }
}

/// An input mount of an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    /// Upstream operator whose output is mounted; the input payload if absent.
    #[serde(default)]
    pub from: Option<String>,
    /// Named output of the upstream operator.
    #[serde(default)]
    pub name: Option<String>,
    /// Mount path inside the container.
    pub path: String,
}

/// An output mount of an operator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Output name; creates a dedicated sub-directory when present.
    #[serde(default)]
    pub name: Option<String>,
    /// Mount path inside the container.
    pub path: String,
}

/// A side-service container, e.g. an inference server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServiceSpec {
    /// Service name.
    pub name: String,
    /// Container to run.
    pub container: ContainerSpec,
    /// Named connection ports exposed to the operator.
    #[serde(default)]
    pub connections: Connections,
    /// Whether the models directory is mounted into this service.
    #[serde(default)]
    pub model_repository: bool,
    /// Declared resource hints.
    #[serde(default)]
    pub requests: ResourceRequests,
}

/// Connection ports of a service, grouped by protocol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connections {
    /// HTTP endpoints.
    #[serde(default)]
    pub http: Vec<Connection>,
    /// gRPC endpoints.
    #[serde(default)]
    pub grpc: Vec<Connection>,
}

impl Connections {
    /// Iterates over all connections regardless of protocol.
    pub fn all(&self) -> impl Iterator<Item = &Connection> {
        self.http.iter().chain(self.grpc.iter())
    }
}

/// A named port; `name` is the environment variable the operator receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    /// Environment variable name.
    pub name: String,
    /// Port inside the service container.
    pub port: u16,
}

/// Reference to a model in the models directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Model name, matching a sub-directory of the models directory.
    pub name: String,
}

/// Declared resource hints of an operator or service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequests {
    /// Number of GPUs.
    #[serde(default)]
    pub gpu: u32,
    /// CPU cores.
    #[serde(default)]
    pub cpu: Option<f64>,
    /// Memory in megabytes.
    #[serde(default)]
    pub memory: Option<u64>,
}
