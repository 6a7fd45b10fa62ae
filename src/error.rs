//! Error Types
//!
//! One enum per failure domain:
//!
//! - [`ReferenceError`]: malformed references
//! - [`LoadError`]: a single step document could not be loaded
//! - [`BuildError`]: a graph operation was rejected
//! - [`SaveError`]: the graph could not be rendered or written
//! - [`RecipeError`]: a recipe file could not be replayed

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while constructing or parsing a [`Reference`](crate::Reference).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    #[error("Invalid input when constructing Reference: expected an input name or a step and output name")]
    Incomplete,

    #[error("Invalid reference '{0}'")]
    Malformed(String),
}

/// Coarse classification of a failed load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    /// The document is readable but is not a step we can use.
    Unsupported,
    /// The document could not be read or does not have a valid structure.
    Validation,
}

impl fmt::Display for LoadFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "unsupported"),
            Self::Validation => write!(f, "validation error"),
        }
    }
}

/// Failure to load a single step document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to fetch '{location}': {message}")]
    Fetch { location: String, message: String },

    #[error("Not loading '{location}', because it is a packed workflow")]
    Packed { location: String },

    #[error("'{location}' is unsupported: {reason}")]
    Unsupported { location: String, reason: String },

    #[error("'{location}' failed validation: {message}")]
    Validation { location: String, message: String },
}

impl LoadError {
    pub fn kind(&self) -> LoadFailureKind {
        match self {
            Self::Packed { .. } | Self::Unsupported { .. } => LoadFailureKind::Unsupported,
            Self::Io { .. } | Self::Fetch { .. } | Self::Validation { .. } => {
                LoadFailureKind::Validation
            }
        }
    }

    pub fn location(&self) -> &str {
        match self {
            Self::Io { location, .. }
            | Self::Fetch { location, .. }
            | Self::Packed { location }
            | Self::Unsupported { location, .. }
            | Self::Validation { location, .. } => location,
        }
    }

    pub(crate) fn validation(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// A graph operation was rejected. The graph is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Operation on closed workflow")]
    Closed,

    #[error("'{0}' not found in steps library. Please check your spelling or load additional steps")]
    UnknownStep(String),

    #[error("Step '{step}': expecting '{input}' as an input binding")]
    MissingInput { step: String, input: String },

    #[error("Step '{step}': invalid input '{input}'")]
    UnknownInput { step: String, input: String },

    #[error("Step '{step}': input '{input}' is bound more than once")]
    DuplicateBinding { step: String, input: String },

    #[error("Step '{step}': the list of sources for input '{input}' is empty")]
    EmptySourceList { step: String, input: String },

    #[error("Step '{step}': expecting 'scatter' when a scatter method is given")]
    MissingScatter { step: String },

    #[error("Step '{step}': invalid variable '{input}' for scatter")]
    InvalidScatterInput { step: String, input: String },

    #[error("Step '{step}': expecting a scatter combination mode when scattering over more than one input")]
    MissingScatterMethod { step: String },

    #[error("Invalid scatter combination mode '{0}'. Please use one of (dotproduct, nested_crossproduct, flat_crossproduct)")]
    InvalidScatterMethod(String),

    #[error(
        "{} '{source_name}' of type '{source_type}' is not compatible with{} step input '{input}' of type '{expected_type}'",
        source_label(.from_workflow_input),
        scattered_label(.scattered)
    )]
    TypeMismatch {
        input: String,
        source_name: String,
        from_workflow_input: bool,
        scattered: bool,
        source_type: String,
        expected_type: String,
    },

    #[error(
        "The types of the workflow inputs/step outputs for '{input}' are not equal: {}",
        list_sources(.sources)
    )]
    SourceTypesDiffer {
        input: String,
        sources: Vec<(String, String)>,
    },

    #[error("Unknown reference '{0}': it is neither a workflow input nor an output of an earlier step")]
    UnknownReference(String),

    #[error("'{0}' is already used as a workflow input. Please use a different name")]
    DuplicateInput(String),

    #[error("'{0}' is already used as a workflow output. Please use a different name")]
    DuplicateOutput(String),

    #[error("No input name specified")]
    MissingInputName,

    #[error("Too many parameters, not clear which one names the input: {}", join_names(.0))]
    AmbiguousInputName(Vec<String>),

    #[error("Input '{0}': please specify the enum's symbols")]
    MissingEnumSymbols(String),

    #[error("Input '{0}': the enum's symbols cannot be empty")]
    EmptyEnumSymbols(String),

    #[error("Input '{name}': invalid declaration: {reason}")]
    InvalidInputDeclaration { name: String, reason: String },
}

fn source_label(from_workflow_input: &bool) -> &'static str {
    if *from_workflow_input {
        "Workflow input"
    } else {
        "Step output"
    }
}

fn scattered_label(scattered: &bool) -> &'static str {
    if *scattered {
        " (scattered)"
    } else {
        ""
    }
}

fn list_sources(sources: &[(String, String)]) -> String {
    sources
        .iter()
        .map(|(name, typ)| format!("{} ({})", name, typ))
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_names(names: &[String]) -> String {
    names.join(", ")
}

/// Failure to render or write a workflow document.
#[derive(Debug, Error)]
pub enum SaveError {
    #[error("Working directory not set")]
    MissingWorkingDir,

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode workflow document: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Workflow validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Build(#[from] BuildError),
}

impl SaveError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure to replay a recipe file.
#[derive(Debug, Error)]
pub enum RecipeError {
    #[error("Failed to read recipe '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse recipe: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Step #{index} ('{step}'): {source}")]
    Step {
        index: usize,
        step: String,
        #[source]
        source: BuildError,
    },

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Reference(#[from] ReferenceError),
}
