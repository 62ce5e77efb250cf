//! # opsize-manifest
//!
//! Loader and validator for pipeline definitions.
//!
//! Handles:
//! - **Model**: serde types for the YAML pipeline definition.
//! - **Validator**: name uniqueness, `from` references, and ordering checks.
//! - **Graph**: operator dependency graph and cycle detection.
//! - **Models**: consistency checks of the models directory.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod graph;
pub mod model;
pub mod models;
pub mod validator;

use std::path::Path;

use opsize_common::error::{OpsizeError, Result};

pub use model::PipelineManifest;

/// Parses and validates a pipeline definition from YAML text.
///
/// # Errors
///
/// Returns a `Manifest` error if the text is not a well-formed pipeline
/// definition or fails validation.
pub fn parse_manifest(source: &str) -> Result<PipelineManifest> {
    let manifest: PipelineManifest =
        serde_yaml::from_str(source).map_err(|e| OpsizeError::Manifest {
            message: e.to_string(),
        })?;
    validator::validate(&manifest)?;
    tracing::debug!(
        pipeline = %manifest.name,
        operators = manifest.operators.len(),
        "pipeline manifest parsed"
    );
    Ok(manifest)
}

/// Reads, parses and validates a pipeline definition file.
///
/// # Errors
///
/// Returns an `Io` error if the file cannot be read, or a `Manifest`
/// error if its content is invalid.
pub fn load(path: &Path) -> Result<PipelineManifest> {
    let source = std::fs::read_to_string(path).map_err(|e| OpsizeError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    tracing::info!(path = %path.display(), "loading pipeline definition");
    parse_manifest(&source)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PIPELINE: &str = r#"
api-version: 0.4.0
name: liver-segmentation
orchestrator: Clara
pull-secrets:
  - ngc-clara
operators:
- name: dicom-reader
  container:
    image: clara/dicom-reader
    tag: 0.8.1
    command: ["python", "reader.py"]
  variables:
    LOG_LEVEL: debug
  input:
  - path: /input
  output:
  - path: /output
- name: segmentation
  container:
    image: clara/ai-liver
  input:
  - from: dicom-reader
    path: /input
  output:
  - name: masks
    path: /output
  models:
  - name: segmentation_liver_v1
  requests:
    gpu: 1
    memory: 4096
- name: writer
  container:
    image: clara/dicom-writer
    tag: "1.0"
  input:
  - from: segmentation
    name: masks
    path: /input
  - path: /dcm
  output:
  - path: /output
"#;

    #[test]
    fn parses_full_pipeline() {
        let m = parse_manifest(PIPELINE).expect("should parse");
        assert_eq!(m.name, "liver-segmentation");
        assert_eq!(m.api_version.as_deref(), Some("0.4.0"));
        assert_eq!(m.pull_secrets, vec!["ngc-clara"]);
        assert_eq!(m.operators.len(), 3);

        let reader = &m.operators[0];
        assert_eq!(reader.container.image_ref().to_string(), "clara/dicom-reader:0.8.1");
        assert_eq!(reader.container.command, vec!["python", "reader.py"]);
        assert_eq!(reader.variables.get("LOG_LEVEL").map(String::as_str), Some("debug"));
        assert!(!reader.needs_network());

        let seg = &m.operators[1];
        assert_eq!(seg.container.tag, "latest");
        assert_eq!(seg.requests.gpu, 1);
        assert_eq!(seg.requests.memory, Some(4096));
        assert!(seg.needs_network());
        assert_eq!(seg.outputs[0].name.as_deref(), Some("masks"));

        let writer = &m.operators[2];
        assert_eq!(writer.upstream().collect::<Vec<_>>(), vec!["segmentation"]);
        assert!(m.needs_models_dir());
        assert_eq!(m.model_names(), vec!["segmentation_liver_v1"]);
    }

    #[test]
    fn malformed_yaml_is_manifest_error() {
        let err = parse_manifest("name: [unterminated").unwrap_err();
        assert!(matches!(err, OpsizeError::Manifest { .. }), "got: {err}");
    }

    #[test]
    fn operator_without_container_is_rejected() {
        let err = parse_manifest("name: p\noperators:\n- name: a\n").unwrap_err();
        assert!(err.to_string().contains("container"), "got: {err}");
    }

    #[test]
    fn parse_runs_validation() {
        let src = "name: p\noperators:\n- name: a\n  container:\n    image: x\n  input:\n  - from: b\n    path: /in\n";
        let err = parse_manifest(src).unwrap_err();
        assert!(err.to_string().contains("undefined operator"), "got: {err}");
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, PIPELINE).expect("write");
        let m = load(&path).expect("should load");
        assert_eq!(m.operators.len(), 3);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, OpsizeError::Io { .. }), "got: {err}");
    }
}
