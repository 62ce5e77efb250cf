//! Container runtime adapter driving the `docker` CLI.
//!
//! Every operation spawns one `docker` subcommand through
//! `tokio::process` with `kill_on_drop`, so dropping an in-flight
//! operation (for example an identifier wait that timed out) also kills
//! the client process.

use std::path::PathBuf;
use std::process::{Output, Stdio};

use async_trait::async_trait;
use opsize_common::constants::{CONTAINER_ID_LENGTH, DOCKER_BIN};
use opsize_common::error::{OpsizeError, Result};
use opsize_common::types::{ContainerId, ImageRef};
use tokio::process::Command;

use super::{ContainerRuntime, LaunchSpec};

/// Adapter over the `docker` command-line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    bin: PathBuf,
}

impl DockerCli {
    /// Creates an adapter using `docker` from `PATH`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bin: PathBuf::from(DOCKER_BIN),
        }
    }

    /// Creates an adapter using an explicit client binary.
    #[must_use]
    pub fn with_binary(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }

    /// Returns the client binary name for reproducible command lines.
    #[must_use]
    pub fn binary(&self) -> String {
        self.bin.display().to_string()
    }

    async fn output(&self, args: &[String]) -> Result<Output> {
        tracing::debug!(bin = %self.bin.display(), ?args, "invoking container runtime");
        Command::new(&self.bin)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| OpsizeError::Io {
                path: self.bin.clone(),
                source: e,
            })
    }

    /// Runs a subcommand and returns its trimmed stdout, or a `Runtime`
    /// error carrying its stderr.
    async fn checked(&self, args: &[String]) -> Result<String> {
        let output = self.output(args).await?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(self.failure(args, &output))
        }
    }

    /// Like [`Self::checked`], but treats a "no such object" failure as success.
    async fn idempotent(&self, args: &[String]) -> Result<()> {
        let output = self.output(args).await?;
        if output.status.success() || is_absent(&String::from_utf8_lossy(&output.stderr)) {
            Ok(())
        } else {
            Err(self.failure(args, &output))
        }
    }

    fn failure(&self, args: &[String], output: &Output) -> OpsizeError {
        OpsizeError::Runtime {
            command: format!("{} {}", self.bin.display(), args.join(" ")),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

fn args<const N: usize>(items: [&str; N]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    async fn image_present(&self, image: &ImageRef) -> Result<bool> {
        let reference = image.to_string();
        let stdout = self
            .checked(&args([
                "images",
                &reference,
                "--format",
                "{{.Repository}}:{{.Tag}}",
            ]))
            .await?;
        Ok(image_listed(&stdout, &reference))
    }

    async fn pull_image(&self, image: &ImageRef) -> Result<()> {
        let reference = image.to_string();
        tracing::info!(image = %reference, registry = image.registry(), "pulling image");
        let output = self.output(&args(["pull", &reference])).await?;
        if output.status.success() {
            return Ok(());
        }
        Err(OpsizeError::ImagePull {
            image: reference,
            registry: image.registry().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    async fn network_exists(&self, name: &str) -> Result<bool> {
        let filter = format!("name=^{name}$");
        let stdout = self
            .checked(&args([
                "network",
                "ls",
                "--filter",
                &filter,
                "--format",
                "{{.Name}}",
            ]))
            .await?;
        Ok(stdout.lines().any(|line| line.trim() == name))
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        let _ = self.checked(&args(["network", "create", name])).await?;
        tracing::info!(network = name, "network created");
        Ok(())
    }

    async fn remove_network(&self, name: &str) -> Result<()> {
        self.idempotent(&args(["network", "rm", name])).await
    }

    async fn run_detached(&self, spec: &LaunchSpec) -> Result<ContainerId> {
        let stdout = self.checked(&spec.run_args()).await?;
        parse_container_id(&stdout).ok_or_else(|| OpsizeError::Launch {
            operator: spec.name.clone(),
            message: format!("runtime printed no container ID: \"{stdout}\""),
        })
    }

    async fn wait(&self, id: &ContainerId) -> Result<i32> {
        let stdout = self.checked(&args(["wait", id.as_str()])).await?;
        stdout.trim().parse().map_err(|_| OpsizeError::Runtime {
            command: format!("{} wait {id}", self.bin.display()),
            code: None,
            stderr: format!("unexpected exit status \"{stdout}\""),
        })
    }

    async fn kill(&self, name: &str) -> Result<()> {
        self.idempotent(&args(["kill", name])).await
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.idempotent(&args(["rm", "-f", name])).await
    }

    async fn address(&self, id: &ContainerId, network: &str) -> Result<String> {
        let stdout = self
            .checked(&args([
                "inspect",
                id.as_str(),
                "--format",
                "{{json .NetworkSettings.Networks}}",
            ]))
            .await?;
        parse_network_address(&stdout, network)?.ok_or_else(|| OpsizeError::NotFound {
            kind: "network address",
            id: format!("{} on {network}", id.short()),
        })
    }

    fn is_available(&self) -> bool {
        which::which(&self.bin).is_ok()
    }
}

/// Extracts a full container ID from `docker run -d` output.
fn parse_container_id(stdout: &str) -> Option<ContainerId> {
    let line = stdout.lines().rev().map(str::trim).find(|l| !l.is_empty())?;
    (line.len() == CONTAINER_ID_LENGTH && line.chars().all(|c| c.is_ascii_hexdigit()))
        .then(|| ContainerId::new(line))
}

fn image_listed(stdout: &str, reference: &str) -> bool {
    stdout.lines().any(|line| line.trim() == reference)
}

/// Reads `<network>.IPAddress` from the JSON network map of `docker inspect`.
fn parse_network_address(json: &str, network: &str) -> Result<Option<String>> {
    let networks: serde_json::Value = serde_json::from_str(json)?;
    Ok(networks
        .get(network)
        .and_then(|n| n.get("IPAddress"))
        .and_then(serde_json::Value::as_str)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned))
}

fn is_absent(stderr: &str) -> bool {
    let stderr = stderr.to_ascii_lowercase();
    stderr.contains("no such container")
        || stderr.contains("no such network")
        || stderr.contains("is not running")
        || (stderr.contains("network") && stderr.contains("not found"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0f1e2d3c4b5a69788796a5b4c3d2e1f00f1e2d3c4b5a69788796a5b4c3d2e1f0";

    #[test]
    fn container_id_is_last_line() {
        let out = format!("Unable to find image locally\n{ID}\n");
        assert_eq!(parse_container_id(&out).expect("id").as_str(), ID);
    }

    #[test]
    fn short_or_garbage_id_is_rejected() {
        assert!(parse_container_id("abc123\n").is_none());
        assert!(parse_container_id("").is_none());
        let bad = ID.replace('0', "z");
        assert!(parse_container_id(&bad).is_none());
    }

    #[test]
    fn image_listing_matches_exact_reference() {
        let out = "clara/reader:0.8\nclara/reader:0.9\n";
        assert!(image_listed(out, "clara/reader:0.9"));
        assert!(!image_listed(out, "clara/reader:1.0"));
        assert!(!image_listed("", "clara/reader:0.8"));
    }

    #[test]
    fn network_address_is_read_from_json() {
        let json = r#"{"opsize-net":{"IPAddress":"172.18.0.2","Gateway":"172.18.0.1"},"bridge":{"IPAddress":""}}"#;
        assert_eq!(
            parse_network_address(json, "opsize-net").expect("parse").as_deref(),
            Some("172.18.0.2")
        );
        assert_eq!(parse_network_address(json, "bridge").expect("parse"), None);
        assert_eq!(parse_network_address(json, "other").expect("parse"), None);
        assert!(parse_network_address("not json", "x").is_err());
    }

    #[test]
    fn absent_objects_are_recognized() {
        assert!(is_absent("Error: No such container: opsize-a-1"));
        assert!(is_absent("Error response from daemon: network opsize-net not found"));
        assert!(is_absent("Error response from daemon: Container abc is not running"));
        assert!(!is_absent("permission denied while trying to connect"));
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let cli = DockerCli::with_binary("/nonexistent/opsize-docker");
        assert!(!cli.is_available());
    }
}
