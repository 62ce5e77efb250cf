//! Consistency checks between declared models and the models directory.
//!
//! Every model named by an operator must exist as `<models>/<name>/` and
//! carry a `config.pbtxt` whose first line is `name: "<name>"`. A service
//! marked `model-repository` needs the directory even when no operator
//! names a model.

use std::path::Path;

use opsize_common::constants::MODEL_CONFIG_FILE;
use opsize_common::error::{OpsizeError, Result};

use crate::model::PipelineManifest;

/// Verifies that every model the pipeline declares is present and
/// consistently named in `models_dir`.
///
/// Returns the checked model names, empty if the pipeline declares none.
///
/// # Errors
///
/// Returns a `Config` error if models or a model-repository service are
/// declared but no directory was given, if a model directory or its
/// configuration is missing, or if the configured name does not match the
/// directory name.
pub fn check_models_directory(
    manifest: &PipelineManifest,
    models_dir: Option<&Path>,
) -> Result<Vec<String>> {
    if !manifest.needs_models_dir() {
        return Ok(Vec::new());
    }
    let names = manifest.model_names();
    let Some(dir) = models_dir else {
        let needed_by = if names.is_empty() {
            "a model-repository service".to_string()
        } else {
            format!("models ({})", names.join(", "))
        };
        return Err(OpsizeError::Config {
            message: format!(
                "pipeline \"{}\" declares {needed_by} but no models directory was given",
                manifest.name
            ),
        });
    };
    if !dir.is_dir() {
        return Err(OpsizeError::Config {
            message: format!("models directory {} does not exist", dir.display()),
        });
    }

    for name in &names {
        check_model(dir, name)?;
        tracing::debug!(model = name, "model configuration verified");
    }
    Ok(names.into_iter().map(str::to_owned).collect())
}

fn check_model(dir: &Path, name: &str) -> Result<()> {
    let config = dir.join(name).join(MODEL_CONFIG_FILE);
    let content = std::fs::read_to_string(&config).map_err(|e| OpsizeError::Config {
        message: format!("model \"{name}\": cannot read {}: {e}", config.display()),
    })?;
    let first = content.lines().next().unwrap_or_default();
    match parse_name_line(first) {
        Some(configured) if configured == name => Ok(()),
        Some(configured) => Err(OpsizeError::Config {
            message: format!(
                "model \"{name}\": {} names the model \"{configured}\"; \
                 the directory and the configured name must match",
                config.display()
            ),
        }),
        None => Err(OpsizeError::Config {
            message: format!(
                "model \"{name}\": first line of {} must be name: \"{name}\"",
                config.display()
            ),
        }),
    }
}

/// Extracts `X` from a line of the form `name: "X"`.
fn parse_name_line(line: &str) -> Option<&str> {
    let value = line.trim().strip_prefix("name")?.trim_start().strip_prefix(':')?;
    value.trim().strip_prefix('"')?.strip_suffix('"')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerSpec, ModelRef, OperatorSpec, ServiceSpec};

    fn manifest_with_models(models: &[&str]) -> PipelineManifest {
        PipelineManifest {
            name: "p".into(),
            operators: vec![OperatorSpec {
                name: "infer".into(),
                container: ContainerSpec {
                    image: "clara/ai".into(),
                    tag: "1".into(),
                    command: Vec::new(),
                },
                models: models
                    .iter()
                    .map(|m| ModelRef {
                        name: (*m).into(),
                    })
                    .collect(),
                ..OperatorSpec::default()
            }],
            ..PipelineManifest::default()
        }
    }

    fn write_model(root: &Path, dir: &str, first_line: &str) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).expect("mkdir");
        std::fs::write(
            path.join(MODEL_CONFIG_FILE),
            format!("{first_line}\nplatform: \"tensorflow_graphdef\"\n"),
        )
        .expect("write");
    }

    #[test]
    fn no_models_needs_no_directory() {
        let names = check_models_directory(&manifest_with_models(&[]), None).expect("ok");
        assert!(names.is_empty());
    }

    #[test]
    fn models_without_directory_fail() {
        let err = check_models_directory(&manifest_with_models(&["seg"]), None).unwrap_err();
        assert!(err.to_string().contains("no models directory"), "got: {err}");
    }

    #[test]
    fn model_repository_service_needs_directory() {
        let mut manifest = manifest_with_models(&[]);
        manifest.operators[0].services = vec![ServiceSpec {
            name: "triton".into(),
            model_repository: true,
            ..ServiceSpec::default()
        }];
        let err = check_models_directory(&manifest, None).unwrap_err();
        assert!(matches!(err, OpsizeError::Config { .. }), "got: {err}");
        assert!(err.to_string().contains("model-repository service"), "got: {err}");

        let dir = tempfile::tempdir().expect("tempdir");
        let names = check_models_directory(&manifest, Some(dir.path())).expect("ok");
        assert!(names.is_empty());
    }

    #[test]
    fn consistent_models_pass() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_model(dir.path(), "seg", "name: \"seg\"");
        write_model(dir.path(), "cls", "name:\"cls\"");
        let names = check_models_directory(&manifest_with_models(&["seg", "cls"]), Some(dir.path()))
            .expect("ok");
        assert_eq!(names, vec!["cls", "seg"]);
    }

    #[test]
    fn missing_model_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err =
            check_models_directory(&manifest_with_models(&["seg"]), Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("cannot read"), "got: {err}");
    }

    #[test]
    fn mismatched_name_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_model(dir.path(), "seg", "name: \"segmentation\"");
        let err =
            check_models_directory(&manifest_with_models(&["seg"]), Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("must match"), "got: {err}");
    }

    #[test]
    fn name_line_parsing() {
        assert_eq!(parse_name_line("name: \"a\""), Some("a"));
        assert_eq!(parse_name_line("  name :  \"b\"  "), Some("b"));
        assert_eq!(parse_name_line("platform: \"x\""), None);
        assert_eq!(parse_name_line("name: a"), None);
    }
}
