//! Workflow Validation
//!
//! Checks applied while a graph is being built and before it is saved:
//! - Scatter resolution (named inputs exist, combination mode present)
//! - Per-binding type compatibility, including scattered and multi-source inputs
//! - Round-trip validation of a rendered workflow document

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use indexmap::IndexMap;
use log::{debug, info, warn};
use serde_yaml::Value;

use super::model::{
    id_fragment, Binding, InputPort, Scatter, ScatterMethod, StepClass, StepInstance, StepTemplate,
};
use super::reference::Reference;
use super::types::CwlType;
use crate::error::{BuildError, SaveError};
use crate::library::loader::{classify, DocumentLoader};

/// Resolves the scatter request of an instantiation.
///
/// Input names may be given by declared name or alias; they come back as
/// declared names, without duplicates.
pub fn resolve_scatter(
    template: &StepTemplate,
    inputs: &[String],
    method: Option<ScatterMethod>,
) -> Result<Option<Scatter>, BuildError> {
    if inputs.is_empty() {
        return match method {
            Some(_) => Err(BuildError::MissingScatter {
                step: template.name().to_string(),
            }),
            None => Ok(None),
        };
    }

    let mut resolved: Vec<String> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let name = template
            .resolve_input_name(input)
            .ok_or_else(|| BuildError::InvalidScatterInput {
                step: template.name().to_string(),
                input: input.clone(),
            })?;
        if !resolved.iter().any(|r| r == name) {
            resolved.push(name.to_string());
        }
    }

    if resolved.len() > 1 && method.is_none() {
        return Err(BuildError::MissingScatterMethod {
            step: template.name().to_string(),
        });
    }

    Ok(Some(Scatter {
        inputs: resolved,
        method,
    }))
}

/// Type-checks one wired input against the types of its sources.
///
/// `source_type` resolves a reference to the type it carries; unknown
/// references are reported through it.
pub fn check_binding<F>(
    step: &str,
    port: &InputPort,
    binding: &Binding,
    scattered: bool,
    source_type: F,
) -> Result<(), BuildError>
where
    F: Fn(&Reference) -> Result<CwlType, BuildError>,
{
    let expected = if scattered {
        port.cwl_type.scattered()
    } else {
        port.cwl_type.clone()
    };

    let mismatch = |reference: &Reference, found: &CwlType, wanted: &CwlType| BuildError::TypeMismatch {
        input: port.name.clone(),
        source_name: reference.to_string(),
        from_workflow_input: reference.refers_to_wf_input(),
        scattered,
        source_type: found.to_string(),
        expected_type: wanted.to_string(),
    };

    match binding {
        Binding::Single(reference) => {
            let found = source_type(reference)?;
            if found.compatible_with(&expected) {
                Ok(())
            } else {
                Err(mismatch(reference, &found, &expected))
            }
        }
        Binding::Multiple(references) => {
            let Some(first) = references.first() else {
                return Err(BuildError::EmptySourceList {
                    step: step.to_string(),
                    input: port.name.clone(),
                });
            };

            let types = references
                .iter()
                .map(|r| source_type(r))
                .collect::<Result<Vec<_>, _>>()?;

            let agree = types
                .iter()
                .enumerate()
                .all(|(i, a)| types[i + 1..].iter().all(|b| a.compatible_with(b)));
            if !agree {
                return Err(BuildError::SourceTypesDiffer {
                    input: port.name.clone(),
                    sources: references
                        .iter()
                        .zip(&types)
                        .map(|(r, t)| (r.to_string(), t.to_string()))
                        .collect(),
                });
            }

            // Merged sources feed the elements of an array input.
            if expected.is_complex() {
                return Ok(());
            }
            match expected.items() {
                Some(items) if types[0].compatible_with(&items) => Ok(()),
                _ => Err(mismatch(first, &types[0], &expected)),
            }
        }
    }
}

/// A problem found while validating a rendered workflow document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentIssue {
    NotAWorkflow(String),
    MissingSteps,
    UnknownStep(String),
    MissingRun(String),
    UnloadableRun { step: String, message: String },
    PortsDiffer {
        step: String,
        section: &'static str,
        expected: Vec<String>,
        found: Vec<String>,
    },
}

impl fmt::Display for DocumentIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAWorkflow(reason) => write!(f, "Document is not a valid workflow: {}", reason),
            Self::MissingSteps => write!(f, "Document has no 'steps' mapping"),
            Self::UnknownStep(step) => write!(f, "Step '{}' is not part of the graph", step),
            Self::MissingRun(step) => write!(f, "Step '{}' has no 'run'", step),
            Self::UnloadableRun { step, message } => {
                write!(f, "Step '{}': run target cannot be loaded: {}", step, message)
            }
            Self::PortsDiffer {
                step,
                section,
                expected,
                found,
            } => write!(
                f,
                "Step '{}': {} differ (expected [{}], found [{}])",
                step,
                section,
                expected.join(", "),
                found.join(", ")
            ),
        }
    }
}

/// Validates a rendered (absolute or packed) workflow document.
///
/// The document must classify as a workflow, and every step's `run` target
/// must load and declare the same input and output names as the template
/// the step was instantiated from.
pub fn validate_document(
    document: &Value,
    steps: &IndexMap<String, StepInstance>,
    loader: &dyn DocumentLoader,
) -> Result<(), SaveError> {
    let issues = document_issues(document, steps, loader);

    if issues.is_empty() {
        info!("Workflow document is valid ({} steps)", steps.len());
        return Ok(());
    }

    for issue in &issues {
        warn!("{}", issue);
    }
    Err(SaveError::Validation(
        issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; "),
    ))
}

fn document_issues(
    document: &Value,
    steps: &IndexMap<String, StepInstance>,
    loader: &dyn DocumentLoader,
) -> Vec<DocumentIssue> {
    let mut issues = Vec::new();

    match classify(document) {
        Ok(StepClass::Workflow) => {}
        Ok(other) => {
            issues.push(DocumentIssue::NotAWorkflow(format!("class is {}", other.as_str())));
            return issues;
        }
        Err(err) => {
            issues.push(DocumentIssue::NotAWorkflow(format!("{:?}", err)));
            return issues;
        }
    }

    let Some(Value::Mapping(entries)) = document.get("steps") else {
        issues.push(DocumentIssue::MissingSteps);
        return issues;
    };

    // Several occurrences of one template share a run target.
    let mut loaded: HashMap<String, Result<(BTreeSet<String>, BTreeSet<String>), String>> =
        HashMap::new();

    for (key, entry) in entries {
        let name = key.as_str().unwrap_or_default().to_string();
        let Some(instance) = steps.get(&name) else {
            issues.push(DocumentIssue::UnknownStep(name));
            continue;
        };

        let ports = match entry.get("run") {
            Some(Value::String(location)) => loaded
                .entry(location.clone())
                .or_insert_with(|| {
                    debug!("Validating run target {}", location);
                    loader
                        .load(location)
                        .and_then(StepTemplate::from_loaded)
                        .map(|t| port_names(&t))
                        .map_err(|e| e.to_string())
                })
                .clone(),
            Some(embedded @ Value::Mapping(_)) => embedded_port_names(embedded),
            _ => {
                issues.push(DocumentIssue::MissingRun(name));
                continue;
            }
        };

        let (found_inputs, found_outputs) = match ports {
            Ok(ports) => ports,
            Err(message) => {
                issues.push(DocumentIssue::UnloadableRun { step: name, message });
                continue;
            }
        };

        let (expected_inputs, expected_outputs) = port_names(instance.template());
        for (section, expected, found) in [
            ("inputs", expected_inputs, found_inputs),
            ("outputs", expected_outputs, found_outputs),
        ] {
            if expected != found {
                issues.push(DocumentIssue::PortsDiffer {
                    step: name.clone(),
                    section,
                    expected: expected.into_iter().collect(),
                    found: found.into_iter().collect(),
                });
            }
        }
    }

    issues
}

fn port_names(template: &StepTemplate) -> (BTreeSet<String>, BTreeSet<String>) {
    (
        template.inputs().iter().map(|p| p.name.clone()).collect(),
        template.outputs().iter().map(|p| p.name.clone()).collect(),
    )
}

/// Port names of a packed step body, ids reduced to their last segment.
fn embedded_port_names(body: &Value) -> Result<(BTreeSet<String>, BTreeSet<String>), String> {
    classify(body).map_err(|e| format!("{:?}", e))?;

    let names = |section: &str| -> BTreeSet<String> {
        match body.get(section) {
            Some(Value::Mapping(map)) => map
                .keys()
                .filter_map(Value::as_str)
                .map(|k| last_segment(k).to_string())
                .collect(),
            Some(Value::Sequence(entries)) => entries
                .iter()
                .filter_map(|e| e.get("id").and_then(Value::as_str))
                .map(|id| last_segment(id).to_string())
                .collect(),
            _ => BTreeSet::new(),
        }
    };

    Ok((names("inputs"), names("outputs")))
}

fn last_segment(id: &str) -> &str {
    let fragment = id_fragment(id);
    fragment.rsplit('/').next().unwrap_or(fragment)
}
