//! Container runtime abstraction.
//!
//! The lifecycle manager only talks to the runtime through
//! [`ContainerRuntime`]; [`docker::DockerCli`] is the production adapter.

pub mod docker;

use std::path::PathBuf;

use async_trait::async_trait;
use opsize_common::error::Result;
use opsize_common::types::{ContainerId, ImageRef};

/// A bind mount from the host into a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    /// Host path.
    pub source: PathBuf,
    /// Path inside the container.
    pub target: String,
    /// Whether the container sees the mount read-only.
    pub read_only: bool,
}

impl Mount {
    /// Formats the mount as a `-v` argument value.
    #[must_use]
    pub fn to_volume_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.source.display(), self.target);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Everything needed to launch one detached container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Unique container name, used to kill or remove it before its ID is known.
    pub name: String,
    /// Image to run.
    pub image: ImageRef,
    /// Command tokens appended after the image.
    pub command: Vec<String>,
    /// Environment variables.
    pub env: Vec<(String, String)>,
    /// Bind mounts.
    pub mounts: Vec<Mount>,
    /// Network to attach to.
    pub network: Option<String>,
    /// Number of GPUs to expose; zero exposes none.
    pub gpus: u32,
}

impl LaunchSpec {
    /// Creates a launch spec with no env, mounts or network.
    #[must_use]
    pub fn new(name: impl Into<String>, image: ImageRef) -> Self {
        Self {
            name: name.into(),
            image,
            command: Vec::new(),
            env: Vec::new(),
            mounts: Vec::new(),
            network: None,
            gpus: 0,
        }
    }

    /// Builds the `run` argument vector, without the runtime binary.
    #[must_use]
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec![
            "run".to_string(),
            "-d".to_string(),
            "--name".to_string(),
            self.name.clone(),
        ];
        if let Some(network) = &self.network {
            args.push(format!("--network={network}"));
        }
        if self.gpus > 0 {
            args.push(format!("--gpus={}", self.gpus));
        }
        for (key, value) in &self.env {
            args.push("-e".into());
            args.push(format!("{key}={value}"));
        }
        for mount in &self.mounts {
            args.push("-v".into());
            args.push(mount.to_volume_arg());
        }
        args.push(self.image.to_string());
        args.extend(self.command.iter().cloned());
        args
    }

    /// Returns the full command line, suitable for reproducing the launch.
    #[must_use]
    pub fn command_line(&self, runtime_bin: &str) -> String {
        std::iter::once(runtime_bin.to_string())
            .chain(self.run_args().into_iter().map(|a| quote_arg(&a)))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn quote_arg(arg: &str) -> String {
    if !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@+".contains(c))
    {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Operations the profiler needs from a container runtime.
///
/// Removal operations are idempotent: removing an absent container or
/// network succeeds.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Returns whether the image is available locally.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    async fn image_present(&self, image: &ImageRef) -> Result<bool>;

    /// Pulls an image from its registry.
    ///
    /// # Errors
    ///
    /// Returns `ImagePull` naming the image and registry on failure.
    async fn pull_image(&self, image: &ImageRef) -> Result<()>;

    /// Returns whether a network with this exact name exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be queried.
    async fn network_exists(&self, name: &str) -> Result<bool>;

    /// Creates a bridge network.
    ///
    /// # Errors
    ///
    /// Returns an error if the network cannot be created.
    async fn create_network(&self, name: &str) -> Result<()>;

    /// Removes a network; absent networks are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing network cannot be removed.
    async fn remove_network(&self, name: &str) -> Result<()>;

    /// Starts a detached container and returns its full identifier.
    ///
    /// # Errors
    ///
    /// Returns an error if the container cannot be started.
    async fn run_detached(&self, spec: &LaunchSpec) -> Result<ContainerId>;

    /// Blocks until the container exits and returns its exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait cannot be performed.
    async fn wait(&self, id: &ContainerId) -> Result<i32>;

    /// Sends SIGKILL to a container by name; stopped or absent containers are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime rejects the kill.
    async fn kill(&self, name: &str) -> Result<()>;

    /// Force-removes a container by name; absent containers are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing container cannot be removed.
    async fn remove(&self, name: &str) -> Result<()>;

    /// Returns the container's IP address on the given network.
    ///
    /// # Errors
    ///
    /// Returns an error if the container is not attached to the network.
    async fn address(&self, id: &ContainerId, network: &str) -> Result<String>;

    /// Returns whether this runtime is operational on the current host.
    fn is_available(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> LaunchSpec {
        let mut spec = LaunchSpec::new("opsize-reader-1a2b3c4d", ImageRef::new("clara/reader", "0.8"));
        spec.command = vec!["python".into(), "run.py".into()];
        spec.env = vec![("LOG_LEVEL".into(), "debug".into())];
        spec.mounts = vec![
            Mount {
                source: PathBuf::from("/data/in"),
                target: "/input".into(),
                read_only: true,
            },
            Mount {
                source: PathBuf::from("/tmp/out"),
                target: "/output".into(),
                read_only: false,
            },
        ];
        spec
    }

    #[test]
    fn run_args_place_options_before_image() {
        let args = spec().run_args();
        assert_eq!(&args[..4], ["run", "-d", "--name", "opsize-reader-1a2b3c4d"]);
        let image_pos = args.iter().position(|a| a == "clara/reader:0.8").expect("image");
        assert!(args.iter().position(|a| a == "LOG_LEVEL=debug").expect("env") < image_pos);
        assert!(args.contains(&"/data/in:/input:ro".to_string()));
        assert!(args.contains(&"/tmp/out:/output".to_string()));
        assert_eq!(&args[image_pos + 1..], ["python", "run.py"]);
    }

    #[test]
    fn network_and_gpus_are_optional() {
        let mut s = spec();
        assert!(!s.run_args().iter().any(|a| a.starts_with("--network")));
        assert!(!s.run_args().iter().any(|a| a.starts_with("--gpus")));
        s.network = Some("opsize-net".into());
        s.gpus = 2;
        let args = s.run_args();
        assert!(args.contains(&"--network=opsize-net".to_string()));
        assert!(args.contains(&"--gpus=2".to_string()));
    }

    #[test]
    fn command_line_quotes_unsafe_tokens() {
        let mut s = spec();
        s.command = vec!["sh".into(), "-c".into(), "echo hi".into()];
        let line = s.command_line("docker");
        assert!(line.starts_with("docker run -d --name opsize-reader-1a2b3c4d"));
        assert!(line.ends_with("sh -c 'echo hi'"), "got: {line}");
    }
}
