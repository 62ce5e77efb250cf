//! Semantic validation of a loaded manifest.
//!
//! Checks for duplicate names, dangling or forward `from` references,
//! dependency cycles, and incomplete container declarations before any
//! container is started.

use std::collections::{HashMap, HashSet};

use opsize_common::error::{OpsizeError, Result};

use crate::graph::DependencyGraph;
use crate::model::PipelineManifest;

/// Validates a manifest for semantic correctness.
///
/// # Checks performed
///
/// 1. At least one operator is declared.
/// 2. Operator names are unique and usable as a single path component.
/// 3. Every operator and service declares an image.
/// 4. Every `from` references a declared operator.
/// 5. The `from` graph is acyclic.
/// 6. Every `from` references an operator declared earlier.
/// 7. An operator declaring both `models` and `services` marks one
///    service as the model repository.
///
/// # Errors
///
/// Returns a `Manifest` error describing the first failed check.
pub fn validate(manifest: &PipelineManifest) -> Result<()> {
    tracing::debug!(pipeline = %manifest.name, "validating pipeline manifest");
    if manifest.operators.is_empty() {
        return Err(invalid(format!(
            "pipeline \"{}\" declares no operators",
            manifest.name
        )));
    }
    check_operator_names(manifest)?;
    check_duplicate_operators(manifest)?;
    check_images(manifest)?;
    check_from_references(manifest)?;
    check_acyclic(manifest)?;
    check_declared_order(manifest)?;
    check_model_serving(manifest)?;
    Ok(())
}

fn invalid(message: String) -> OpsizeError {
    OpsizeError::Manifest { message }
}

/// Operator names become directory and file names under the scratch and
/// metrics directories.
fn check_operator_names(manifest: &PipelineManifest) -> Result<()> {
    for op in &manifest.operators {
        let name = op.name.as_str();
        if name.trim().is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0'])
        {
            return Err(invalid(format!(
                "operator name \"{name}\" must be a non-empty name without path separators"
            )));
        }
    }
    Ok(())
}

fn check_duplicate_operators(manifest: &PipelineManifest) -> Result<()> {
    let mut seen = HashSet::new();
    for op in &manifest.operators {
        if !seen.insert(op.name.as_str()) {
            return Err(invalid(format!("duplicate operator name: \"{}\"", op.name)));
        }
    }
    Ok(())
}

fn check_images(manifest: &PipelineManifest) -> Result<()> {
    for op in &manifest.operators {
        if op.container.image.trim().is_empty() {
            return Err(invalid(format!("operator \"{}\" has no image", op.name)));
        }
        for service in &op.services {
            if service.container.image.trim().is_empty() {
                return Err(invalid(format!(
                    "service \"{}\" of operator \"{}\" has no image",
                    service.name, op.name
                )));
            }
        }
    }
    Ok(())
}

fn check_from_references(manifest: &PipelineManifest) -> Result<()> {
    let names: HashSet<&str> = manifest.operators.iter().map(|o| o.name.as_str()).collect();
    for op in &manifest.operators {
        for upstream in op.upstream() {
            if !names.contains(upstream) {
                return Err(invalid(format!(
                    "operator \"{}\" reads from undefined operator \"{upstream}\"",
                    op.name
                )));
            }
        }
    }
    Ok(())
}

fn check_acyclic(manifest: &PipelineManifest) -> Result<()> {
    let mut graph = DependencyGraph::new();
    let mut nodes = HashMap::new();
    for op in &manifest.operators {
        let _ = nodes.insert(op.name.as_str(), graph.add_operator(&op.name));
    }
    for op in &manifest.operators {
        for upstream in op.upstream() {
            if let (Some(&dependent), Some(&dependency)) =
                (nodes.get(op.name.as_str()), nodes.get(upstream))
            {
                graph.add_dependency(dependent, dependency);
            }
        }
    }
    let order = graph.resolve_order()?;
    tracing::debug!(?order, "operator dependency order resolved");
    Ok(())
}

fn check_declared_order(manifest: &PipelineManifest) -> Result<()> {
    let position: HashMap<&str, usize> = manifest
        .operators
        .iter()
        .enumerate()
        .map(|(i, op)| (op.name.as_str(), i))
        .collect();
    for (idx, op) in manifest.operators.iter().enumerate() {
        for upstream in op.upstream() {
            if position.get(upstream).is_some_and(|&p| p >= idx) {
                return Err(invalid(format!(
                    "operator \"{}\" reads from \"{upstream}\", which is declared after it; \
                     reorder the operators so dependencies come first",
                    op.name
                )));
            }
        }
    }
    Ok(())
}

fn check_model_serving(manifest: &PipelineManifest) -> Result<()> {
    for op in &manifest.operators {
        if !op.models.is_empty()
            && !op.services.is_empty()
            && !op.services.iter().any(|s| s.model_repository)
        {
            return Err(invalid(format!(
                "operator \"{}\" declares models and services, but no service sets \
                 model-repository: true",
                op.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ContainerSpec, InputSpec, ModelRef, OperatorSpec, ServiceSpec};

    fn make_operator(name: &str, from: Option<&str>) -> OperatorSpec {
        OperatorSpec {
            name: name.into(),
            container: ContainerSpec {
                image: format!("clara/{name}"),
                tag: "1.0".into(),
                command: Vec::new(),
            },
            inputs: vec![InputSpec {
                from: from.map(Into::into),
                name: None,
                path: "/input".into(),
            }],
            ..OperatorSpec::default()
        }
    }

    fn manifest(operators: Vec<OperatorSpec>) -> PipelineManifest {
        PipelineManifest {
            name: "test".into(),
            operators,
            ..PipelineManifest::default()
        }
    }

    #[test]
    fn validate_linear_pipeline_succeeds() {
        let m = manifest(vec![
            make_operator("reader", None),
            make_operator("inference", Some("reader")),
            make_operator("writer", Some("inference")),
        ]);
        assert!(validate(&m).is_ok());
    }

    #[test]
    fn validate_empty_pipeline_fails() {
        let msg = validate(&manifest(Vec::new())).unwrap_err().to_string();
        assert!(msg.contains("no operators"), "got: {msg}");
    }

    #[test]
    fn validate_duplicate_operator_name_fails() {
        let m = manifest(vec![make_operator("a", None), make_operator("a", None)]);
        let msg = validate(&m).unwrap_err().to_string();
        assert!(msg.contains("duplicate operator name"), "got: {msg}");
    }

    #[test]
    fn validate_path_like_operator_name_fails() {
        for name in ["../escape", "a/b", "..", "", "a\\b"] {
            let msg = validate(&manifest(vec![make_operator(name, None)]))
                .unwrap_err()
                .to_string();
            assert!(msg.contains("path separators"), "{name:?} got: {msg}");
        }
        assert!(validate(&manifest(vec![make_operator("dicom-reader_v2.1", None)])).is_ok());
    }

    #[test]
    fn validate_undefined_from_fails() {
        let m = manifest(vec![make_operator("writer", Some("ghost"))]);
        let msg = validate(&m).unwrap_err().to_string();
        assert!(msg.contains("ghost"), "got: {msg}");
    }

    #[test]
    fn validate_forward_reference_fails() {
        let m = manifest(vec![
            make_operator("writer", Some("reader")),
            make_operator("reader", None),
        ]);
        let msg = validate(&m).unwrap_err().to_string();
        assert!(msg.contains("declared after it"), "got: {msg}");
    }

    #[test]
    fn validate_cycle_fails() {
        let m = manifest(vec![make_operator("a", Some("b")), make_operator("b", Some("a"))]);
        let msg = validate(&m).unwrap_err().to_string();
        assert!(msg.contains("cyclic"), "got: {msg}");
    }

    #[test]
    fn validate_missing_image_fails() {
        let mut op = make_operator("a", None);
        op.container.image = String::new();
        let msg = validate(&manifest(vec![op])).unwrap_err().to_string();
        assert!(msg.contains("has no image"), "got: {msg}");
    }

    #[test]
    fn validate_models_with_unmarked_services_fails() {
        let mut op = make_operator("a", None);
        op.models = vec![ModelRef {
            name: "seg".into(),
        }];
        op.services = vec![ServiceSpec {
            name: "cache".into(),
            container: ContainerSpec {
                image: "redis".into(),
                tag: "7".into(),
                command: Vec::new(),
            },
            ..ServiceSpec::default()
        }];
        let msg = validate(&manifest(vec![op.clone()])).unwrap_err().to_string();
        assert!(msg.contains("model-repository"), "got: {msg}");

        op.services[0].model_repository = true;
        assert!(validate(&manifest(vec![op])).is_ok());
    }
}
