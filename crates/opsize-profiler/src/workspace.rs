//! Scratch data directory shared by the operators of one run.
//!
//! Each operator writes into `<root>/<operator>` (or a named sub-directory
//! of it); downstream operators mount those directories as inputs. The
//! root is a temporary directory removed when the run ends.

use std::path::{Path, PathBuf};

use opsize_common::error::{OpsizeError, Result};
use opsize_manifest::model::OperatorSpec;
use opsize_runtime::backend::Mount;
use tempfile::TempDir;

/// Temporary directory tree holding operator outputs.
#[derive(Debug)]
pub struct DataWorkspace {
    root: TempDir,
    input_dir: PathBuf,
}

impl DataWorkspace {
    /// Creates the scratch root under `parent`, or the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn new(parent: Option<&Path>, input_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        let _ = builder.prefix("opsize-data-");
        let root = match parent {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
        .map_err(|e| OpsizeError::Io {
            path: parent.map_or_else(std::env::temp_dir, Path::to_path_buf),
            source: e,
        })?;
        tracing::debug!(root = %root.path().display(), "data workspace created");
        Ok(Self {
            root,
            input_dir: input_dir.into(),
        })
    }

    /// Scratch root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Output directory of an operator.
    #[must_use]
    pub fn output_dir(&self, operator: &str) -> PathBuf {
        self.root.path().join(operator)
    }

    /// Creates the operator's output directories and returns every mount
    /// it needs, inputs first.
    ///
    /// # Errors
    ///
    /// Returns an error if an output directory cannot be created.
    pub fn mounts(&self, op: &OperatorSpec) -> Result<Vec<Mount>> {
        let out_dir = self.output_dir(&op.name);
        create_dir(&out_dir)?;

        let mut mounts: Vec<Mount> = op
            .inputs
            .iter()
            .map(|input| {
                let source = match (&input.from, &input.name) {
                    (None, _) => self.input_dir.clone(),
                    (Some(from), None) => self.output_dir(from),
                    (Some(from), Some(name)) => self.output_dir(from).join(name),
                };
                Mount {
                    source,
                    target: input.path.clone(),
                    read_only: false,
                }
            })
            .collect();

        for output in &op.outputs {
            let source = match &output.name {
                Some(name) => {
                    let dir = out_dir.join(name);
                    create_dir(&dir)?;
                    dir
                }
                None => out_dir.clone(),
            };
            mounts.push(Mount {
                source,
                target: output.path.clone(),
                read_only: false,
            });
        }
        Ok(mounts)
    }

    /// Removes the scratch tree, logging failures.
    pub fn close(self) {
        let path = self.root.path().to_path_buf();
        if let Err(e) = self.root.close() {
            tracing::warn!(root = %path.display(), error = %e, "data workspace cleanup failed");
        }
    }
}

fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| OpsizeError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use opsize_manifest::model::{ContainerSpec, InputSpec, OutputSpec};

    use super::*;

    fn op(name: &str, inputs: Vec<InputSpec>, outputs: Vec<OutputSpec>) -> OperatorSpec {
        OperatorSpec {
            name: name.into(),
            container: ContainerSpec {
                image: "x".into(),
                tag: "1".into(),
                command: Vec::new(),
            },
            inputs,
            outputs,
            ..OperatorSpec::default()
        }
    }

    #[test]
    fn inputs_resolve_to_payload_or_upstream_outputs() {
        let parent = tempfile::tempdir().expect("tempdir");
        let ws = DataWorkspace::new(Some(parent.path()), "/data/payload").expect("workspace");
        let spec = op(
            "writer",
            vec![
                InputSpec {
                    from: None,
                    name: None,
                    path: "/dcm".into(),
                },
                InputSpec {
                    from: Some("seg".into()),
                    name: Some("masks".into()),
                    path: "/masks".into(),
                },
                InputSpec {
                    from: Some("reader".into()),
                    name: None,
                    path: "/input".into(),
                },
            ],
            vec![OutputSpec {
                name: None,
                path: "/output".into(),
            }],
        );
        let mounts = ws.mounts(&spec).expect("mounts");
        assert_eq!(mounts[0].source, PathBuf::from("/data/payload"));
        assert_eq!(mounts[1].source, ws.root().join("seg").join("masks"));
        assert_eq!(mounts[2].source, ws.root().join("reader"));
        assert_eq!(mounts[3].source, ws.root().join("writer"));
        assert_eq!(mounts[3].target, "/output");
        assert!(ws.root().join("writer").is_dir());
    }

    #[test]
    fn named_outputs_get_subdirectories() {
        let ws = DataWorkspace::new(None, "/in").expect("workspace");
        let spec = op(
            "seg",
            Vec::new(),
            vec![
                OutputSpec {
                    name: Some("masks".into()),
                    path: "/out/masks".into(),
                },
                OutputSpec {
                    name: Some("scores".into()),
                    path: "/out/scores".into(),
                },
            ],
        );
        let mounts = ws.mounts(&spec).expect("mounts");
        assert_eq!(mounts.len(), 2);
        assert!(ws.output_dir("seg").join("masks").is_dir());
        assert!(ws.output_dir("seg").join("scores").is_dir());
    }

    #[test]
    fn close_removes_tree() {
        let ws = DataWorkspace::new(None, "/in").expect("workspace");
        let root = ws.root().to_path_buf();
        assert!(root.is_dir());
        ws.close();
        assert!(!root.exists());
    }
}
