//! Symbolic references to data sources inside a workflow.
//!
//! A [`Reference`] points either at a workflow input (`wfmessage`) or at the
//! output of a step occurrence (`echo/echoed`). References are what the graph
//! hands back from `add_input` and `instantiate`, and what callers wire into
//! later steps.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::ReferenceError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reference {
    /// A workflow-level input.
    WorkflowInput { input_name: String },
    /// An output of a step occurrence.
    StepOutput {
        step_name: String,
        output_name: String,
    },
}

impl Reference {
    pub fn workflow_input(input_name: impl Into<String>) -> Self {
        Self::WorkflowInput {
            input_name: input_name.into(),
        }
    }

    pub fn step_output(step_name: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self::StepOutput {
            step_name: step_name.into(),
            output_name: output_name.into(),
        }
    }

    /// Builds a reference from loose parts.
    ///
    /// Either `input_name` must be given, or both `step_name` and
    /// `output_name`. Empty strings count as missing.
    pub fn from_parts(
        input_name: Option<&str>,
        step_name: Option<&str>,
        output_name: Option<&str>,
    ) -> Result<Self, ReferenceError> {
        fn present(s: Option<&str>) -> Option<&str> {
            s.filter(|s| !s.is_empty())
        }

        match (present(input_name), present(step_name), present(output_name)) {
            (Some(input), _, _) => Ok(Self::workflow_input(input)),
            (None, Some(step), Some(output)) => Ok(Self::step_output(step, output)),
            _ => Err(ReferenceError::Incomplete),
        }
    }

    pub fn refers_to_wf_input(&self) -> bool {
        matches!(self, Self::WorkflowInput { .. })
    }

    pub fn refers_to_step_output(&self) -> bool {
        matches!(self, Self::StepOutput { .. })
    }

    pub fn input_name(&self) -> Option<&str> {
        match self {
            Self::WorkflowInput { input_name } => Some(input_name),
            Self::StepOutput { .. } => None,
        }
    }

    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::StepOutput { step_name, .. } => Some(step_name),
            Self::WorkflowInput { .. } => None,
        }
    }

    pub fn output_name(&self) -> Option<&str> {
        match self {
            Self::StepOutput { output_name, .. } => Some(output_name),
            Self::WorkflowInput { .. } => None,
        }
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowInput { input_name } => write!(f, "{}", input_name),
            Self::StepOutput {
                step_name,
                output_name,
            } => write!(f, "{}/{}", step_name, output_name),
        }
    }
}

/// Parses the canonical textual form: `name` or `step/output`.
impl FromStr for Reference {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once('/') {
            None => Self::from_parts(Some(s), None, None),
            Some((step, output)) if !output.contains('/') => {
                Self::from_parts(None, Some(step), Some(output))
                    .map_err(|_| ReferenceError::Malformed(s.to_string()))
            }
            Some(_) => Err(ReferenceError::Malformed(s.to_string())),
        }
    }
}

// Written to documents as its canonical string.
impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
