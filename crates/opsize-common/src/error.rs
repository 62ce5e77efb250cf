//! Unified error types for the opsize workspace.
//!
//! Variants are grouped the way the runner treats them: precondition
//! failures abort before any container starts, provisioning and execution
//! failures are caught at the operator boundary, and observation failures
//! are dropped by the sampler.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type shared across the workspace.
#[derive(Debug, Error)]
pub enum OpsizeError {
    /// An I/O operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// Path where the I/O error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A configuration value is invalid.
    #[error("invalid configuration: {message}")]
    Config {
        /// Description of the invalid configuration.
        message: String,
    },

    /// A required resource was not found.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Type of the missing resource.
        kind: &'static str,
        /// Identifier of the missing resource.
        id: String,
    },

    /// The pipeline manifest is malformed or inconsistent.
    #[error("invalid pipeline manifest: {message}")]
    Manifest {
        /// Description of the validation failure.
        message: String,
    },

    /// The reserved network already exists, most likely left over by a
    /// previous run that crashed.
    #[error(
        "network \"{name}\" already exists; remove it with `docker network rm {name}` \
         or choose another name with --network"
    )]
    NetworkConflict {
        /// Name of the conflicting network.
        name: String,
    },

    /// An image was missing locally and could not be pulled.
    #[error(
        "failed to pull image {image} from {registry}: {stderr}\n\
         verify registry access (docker login {registry}) and the pipeline definition"
    )]
    ImagePull {
        /// Image reference that failed to pull.
        image: String,
        /// Registry host the image is pulled from.
        registry: String,
        /// Runtime error output.
        stderr: String,
    },

    /// An operator container could not be launched.
    #[error("failed to launch operator {operator}: {message}")]
    Launch {
        /// Operator name.
        operator: String,
        /// Description of the launch failure.
        message: String,
    },

    /// The runtime did not report a container ID within the bound.
    #[error("operator {operator} did not report a container ID within {waited_secs:.1}s")]
    IdentifierTimeout {
        /// Operator name.
        operator: String,
        /// Seconds waited before giving up.
        waited_secs: f64,
    },

    /// The run was cancelled while the operator was in flight.
    #[error("operator {operator} aborted")]
    Aborted {
        /// Operator name.
        operator: String,
    },

    /// A side-service failed to start or never became ready.
    #[error("service {service} failed to start: {message}")]
    ServiceStartup {
        /// Service name.
        service: String,
        /// Description of the failure.
        message: String,
    },

    /// A container runtime command returned an error.
    #[error("`{command}` failed with exit code {code:?}: {stderr}")]
    Runtime {
        /// Command line that failed.
        command: String,
        /// Exit code, if the process exited normally.
        code: Option<i32>,
        /// Runtime error output.
        stderr: String,
    },

    /// A cgroup counter file could not be read or parsed.
    #[error("cgroup read failed at {path}: {message}")]
    CgroupRead {
        /// Counter file path.
        path: PathBuf,
        /// Description of the failure.
        message: String,
    },

    /// Serialization or deserialization failed.
    #[error("serialization error: {source}")]
    Serialization {
        /// Underlying serialization error.
        #[from]
        source: serde_json::Error,
    },
}

impl OpsizeError {
    /// Returns whether this error means the target no longer (or not yet)
    /// exists, as opposed to a genuine read or runtime failure.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OpsizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_conflict_message_is_actionable() {
        let err = OpsizeError::NetworkConflict {
            name: "opsize-net".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("docker network rm opsize-net"), "got: {msg}");
    }

    #[test]
    fn image_pull_message_names_registry() {
        let err = OpsizeError::ImagePull {
            image: "nvcr.io/clara/reader:1.0".into(),
            registry: "nvcr.io".into(),
            stderr: "unauthorized".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("docker login nvcr.io"), "got: {msg}");
        assert!(msg.contains("unauthorized"), "got: {msg}");
    }

    #[test]
    fn not_found_is_detected() {
        let err = OpsizeError::NotFound {
            kind: "cgroup",
            id: "abc".into(),
        };
        assert!(err.is_not_found());
        let other = OpsizeError::Config {
            message: "x".into(),
        };
        assert!(!other.is_not_found());
    }
}
