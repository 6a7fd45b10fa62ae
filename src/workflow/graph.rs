//! Workflow Graph
//!
//! The mutable builder a caller grows step by step: declare workflow inputs,
//! instantiate library templates wired to earlier references, expose
//! outputs, then render or save.
//!
//! Every operation validates its arguments before touching the graph, so a
//! rejected call leaves the graph exactly as it was.
//!
//! # Example
//!
//! ```no_run
//! use cwlgen::{InputSpec, StepBindings, WorkflowGraph};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut wf = WorkflowGraph::new();
//! wf.load("cwl/tools")?;
//!
//! let message = wf.add_input(InputSpec::new("wfmessage", "string"))?;
//! let echoed = wf.instantiate("echo", StepBindings::new().bind("message", &message))?;
//! let wced = wf.instantiate(
//!     "wc",
//!     StepBindings::new().bind("file2count", echoed.single().unwrap()),
//! )?;
//! wf.add_output("wcout", wced.single().unwrap())?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use serde_yaml::{Mapping, Value};

use super::model::{Binding, StepBindings, StepInstance, StepOutputs, StepTemplate};
use super::reference::Reference;
use super::types::CwlType;
use super::validator;
use crate::error::{BuildError, SaveError};
use crate::library::{LoadReport, StepSource, StepsLibrary};
use crate::serialize::{self, LinkMode, SaveOptions, Serializer};

const ENUM_TYPE: &str = "enum";

/// Declaration of a workflow input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputSpec {
    pub name: String,
    pub cwl_type: CwlType,
    pub default: Option<Value>,
    pub label: Option<String>,
    pub symbols: Option<Vec<String>>,
}

impl InputSpec {
    pub fn new(name: impl Into<String>, cwl_type: impl Into<CwlType>) -> Self {
        Self {
            name: name.into(),
            cwl_type: cwl_type.into(),
            default: None,
            label: None,
            symbols: None,
        }
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn symbols<S: ToString>(mut self, symbols: impl IntoIterator<Item = S>) -> Self {
        self.symbols = Some(symbols.into_iter().map(|s| s.to_string()).collect());
        self
    }

    /// Reads a keyword-style declaration: exactly one `name: type` pair plus
    /// optional `default`, `label` and `symbols`.
    pub fn from_mapping(declaration: &Mapping) -> Result<Self, BuildError> {
        const RESERVED: [&str; 3] = ["default", "label", "symbols"];

        let mut candidates: Vec<(String, &Value)> = Vec::new();
        for (key, value) in declaration {
            let key = match key {
                Value::String(key) => key.clone(),
                other => serialize::scalar_text(other),
            };
            if !RESERVED.contains(&key.as_str()) {
                candidates.push((key, value));
            }
        }

        let (name, type_value) = match candidates.len() {
            0 => return Err(BuildError::MissingInputName),
            1 => candidates.remove(0),
            _ => {
                let mut names: Vec<_> = candidates.into_iter().map(|(n, _)| n).collect();
                names.sort();
                return Err(BuildError::AmbiguousInputName(names));
            }
        };

        let cwl_type = CwlType::from_value(type_value).ok_or_else(|| BuildError::InvalidInputDeclaration {
            name: name.clone(),
            reason: "the type must be a string or a type mapping".to_string(),
        })?;

        let mut spec = Self::new(name.clone(), cwl_type);
        spec.default = declaration.get("default").cloned();
        spec.label = match declaration.get("label") {
            None => None,
            Some(Value::String(label)) => Some(label.clone()),
            Some(other) => Some(serialize::scalar_text(other)),
        };
        spec.symbols = match declaration.get("symbols") {
            None | Some(Value::Null) => None,
            Some(Value::Sequence(symbols)) => Some(symbols.iter().map(serialize::scalar_text).collect()),
            Some(_) => {
                return Err(BuildError::InvalidInputDeclaration {
                    name,
                    reason: "'symbols' must be a list".to_string(),
                })
            }
        };
        Ok(spec)
    }

    pub fn is_enum(&self) -> bool {
        matches!(&self.cwl_type, CwlType::Named(name) if name == ENUM_TYPE)
    }

    /// The type the input carries: enums become `{type: enum, symbols: [...]}`.
    pub fn effective_type(&self) -> CwlType {
        if !self.is_enum() {
            return self.cwl_type.clone();
        }
        let symbols = self
            .symbols
            .iter()
            .flatten()
            .map(|s| Value::from(s.as_str()))
            .collect();
        let mut enum_type = Mapping::new();
        enum_type.insert("type".into(), ENUM_TYPE.into());
        enum_type.insert("symbols".into(), Value::Sequence(symbols));
        CwlType::Complex(Value::Mapping(enum_type))
    }

    fn validate(&self) -> Result<(), BuildError> {
        if !self.is_enum() {
            return Ok(());
        }
        match &self.symbols {
            None => Err(BuildError::MissingEnumSymbols(self.name.clone())),
            Some(symbols) if symbols.is_empty() => Err(BuildError::EmptyEnumSymbols(self.name.clone())),
            Some(_) => Ok(()),
        }
    }
}

/// A workflow output and the type it exposes.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowOutput {
    pub source: Reference,
    pub cwl_type: CwlType,
}

/// Capabilities the rendered workflow must declare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Requirements {
    pub subworkflow: bool,
    pub scatter: bool,
    pub multiple_inputs: bool,
}

impl Requirements {
    pub fn any(&self) -> bool {
        self.subworkflow || self.scatter || self.multiple_inputs
    }
}

/// A workflow under construction.
#[derive(Debug, Default)]
pub struct WorkflowGraph {
    library: StepsLibrary,
    steps: IndexMap<String, StepInstance>,
    inputs: IndexMap<String, InputSpec>,
    outputs: IndexMap<String, WorkflowOutput>,
    output_types: HashMap<Reference, CwlType>,
    requirements: Requirements,
    documentation: Option<String>,
    label: Option<String>,
    working_dir: Option<PathBuf>,
    closed: bool,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_library(library: StepsLibrary) -> Self {
        Self {
            library,
            ..Self::default()
        }
    }

    /// Sets the directory used by [`LinkMode::WorkingDirectory`].
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.working_dir = Some(dir.into());
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), BuildError> {
        if self.closed {
            Err(BuildError::Closed)
        } else {
            Ok(())
        }
    }

    /// Loads step templates into the graph's library.
    pub fn load(&mut self, source: impl Into<StepSource>) -> Result<LoadReport, BuildError> {
        self.ensure_open()?;
        Ok(self.library.load(source))
    }

    pub fn library(&self) -> &StepsLibrary {
        &self.library
    }

    /// Signatures of every loaded template.
    pub fn list_steps(&self) -> Result<String, BuildError> {
        self.ensure_open()?;
        Ok(self.library.list_steps())
    }

    /// Required inputs of a template with their types.
    pub fn inputs_of(&self, step: &str) -> Result<String, BuildError> {
        self.ensure_open()?;
        Ok(self.template(step)?.list_inputs())
    }

    fn template(&self, name: &str) -> Result<Arc<StepTemplate>, BuildError> {
        self.library
            .get(name)
            .ok_or_else(|| BuildError::UnknownStep(name.to_string()))
    }

    pub fn set_documentation(&mut self, doc: impl Into<String>) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.documentation = Some(doc.into());
        Ok(())
    }

    pub fn set_label(&mut self, label: impl Into<String>) -> Result<(), BuildError> {
        self.ensure_open()?;
        self.label = Some(label.into());
        Ok(())
    }

    /// Declares a workflow input and returns a reference to it.
    pub fn add_input(&mut self, spec: InputSpec) -> Result<Reference, BuildError> {
        self.ensure_open()?;
        spec.validate()?;
        if self.inputs.contains_key(&spec.name) {
            return Err(BuildError::DuplicateInput(spec.name));
        }

        debug!("Adding workflow input '{}' ({})", spec.name, spec.cwl_type);
        let reference = Reference::workflow_input(&spec.name);
        self.inputs.insert(spec.name.clone(), spec);
        Ok(reference)
    }

    /// Exposes a step output (or a workflow input) as a workflow output.
    pub fn add_output(&mut self, name: impl Into<String>, source: &Reference) -> Result<(), BuildError> {
        self.add_outputs([(name.into(), source.clone())])
    }

    /// Exposes several outputs at once; either all are added or none.
    pub fn add_outputs<I, S>(&mut self, pairs: I) -> Result<(), BuildError>
    where
        I: IntoIterator<Item = (S, Reference)>,
        S: Into<String>,
    {
        self.ensure_open()?;

        let mut pending: IndexMap<String, WorkflowOutput> = IndexMap::new();
        for (name, source) in pairs {
            let name = name.into();
            if self.outputs.contains_key(&name) || pending.contains_key(&name) {
                return Err(BuildError::DuplicateOutput(name));
            }
            let cwl_type = self.source_type(&source)?;
            pending.insert(name, WorkflowOutput { source, cwl_type });
        }

        self.outputs.extend(pending);
        Ok(())
    }

    /// The type carried by a reference that is already part of the graph.
    fn source_type(&self, reference: &Reference) -> Result<CwlType, BuildError> {
        let found = match reference {
            Reference::WorkflowInput { input_name } => self.inputs.get(input_name).map(InputSpec::effective_type),
            Reference::StepOutput { .. } => self.output_types.get(reference).cloned(),
        };
        found.ok_or_else(|| BuildError::UnknownReference(reference.to_string()))
    }

    /// Adds an occurrence of a library template.
    ///
    /// Returns a single reference when the template has one output, or one
    /// reference per output in declaration order.
    pub fn instantiate(&mut self, step: &str, bindings: StepBindings) -> Result<StepOutputs, BuildError> {
        self.ensure_open()?;
        let template = self.template(step)?;
        let step_name = template.name().to_string();

        let mut inputs: IndexMap<String, Binding> = IndexMap::new();
        for (key, binding) in bindings.inputs {
            let declared = template
                .resolve_input_name(&key)
                .ok_or_else(|| BuildError::UnknownInput {
                    step: step_name.clone(),
                    input: key.clone(),
                })?;
            if inputs.insert(declared.to_string(), binding).is_some() {
                return Err(BuildError::DuplicateBinding {
                    step: step_name,
                    input: declared.to_string(),
                });
            }
        }

        if let Some(missing) = template.required_inputs().find(|p| !inputs.contains_key(&p.name)) {
            return Err(BuildError::MissingInput {
                step: step_name,
                input: missing.name.clone(),
            });
        }

        let scatter = validator::resolve_scatter(&template, &bindings.scatter, bindings.scatter_method)?;
        let scattered = scatter.as_ref().map(|s| s.inputs.as_slice()).unwrap_or(&[]);

        for (input, binding) in &inputs {
            let port = template
                .input(input)
                .ok_or_else(|| BuildError::UnknownInput {
                    step: step_name.clone(),
                    input: input.clone(),
                })?;
            let is_scattered = scattered.iter().any(|s| s == input);
            validator::check_binding(&step_name, port, binding, is_scattered, |r| self.source_type(r))?;
        }

        // Everything is checked; from here on the graph changes.
        let occurrence = self.occurrence_name(&step_name);
        if template.is_composite() {
            self.requirements.subworkflow = true;
        }
        if scatter.is_some() {
            self.requirements.scatter = true;
        }
        if inputs.values().any(Binding::is_multiple) {
            self.requirements.multiple_inputs = true;
        }

        let instance = StepInstance::new(template, occurrence.clone(), inputs, scatter);
        for (output, cwl_type) in instance.output_types() {
            self.output_types
                .insert(Reference::step_output(&occurrence, output), cwl_type.clone());
        }
        let references = instance.output_references();

        info!("Added step '{}' as '{}'", step_name, occurrence);
        self.steps.insert(occurrence, instance);
        Ok(StepOutputs::from_references(references))
    }

    /// `base`, then `base-1`, `base-2`, ... skipping names already used in
    /// this graph or inside loaded sub-workflows.
    fn occurrence_name(&self, base: &str) -> String {
        let taken = |name: &str| self.steps.contains_key(name) || self.library.is_reserved(name);

        let mut name = base.to_string();
        let mut counter = 1;
        while taken(&name) {
            name = format!("{}-{}", base, counter);
            counter += 1;
        }
        name
    }

    pub fn steps(&self) -> &IndexMap<String, StepInstance> {
        &self.steps
    }

    pub fn inputs(&self) -> &IndexMap<String, InputSpec> {
        &self.inputs
    }

    pub fn outputs(&self) -> &IndexMap<String, WorkflowOutput> {
        &self.outputs
    }

    pub fn requirements(&self) -> Requirements {
        self.requirements
    }

    pub fn documentation(&self) -> Option<&str> {
        self.documentation.as_deref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Renders the graph with the given link mode.
    ///
    /// Relative links are computed against the current directory; use
    /// [`Serializer`] to choose another base.
    pub fn to_document(&self, mode: LinkMode) -> Result<Value, SaveError> {
        self.ensure_open()?;
        Serializer::new(self, mode).render()
    }

    /// Round-trips the absolute rendering through the document loader.
    pub fn validate(&self) -> Result<(), SaveError> {
        self.ensure_open()?;
        let document = Serializer::new(self, LinkMode::Absolute).render()?;
        validator::validate_document(&document, &self.steps, self.library.loader())
    }

    pub fn save(&self, path: impl AsRef<Path>, mode: LinkMode) -> Result<(), SaveError> {
        serialize::save(self, path.as_ref(), mode, SaveOptions::default())
    }

    /// Releases everything the graph holds; later calls fail with
    /// [`BuildError::Closed`].
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        debug!("Closing workflow graph ({} steps)", self.steps.len());
        self.steps.clear();
        self.inputs.clear();
        self.outputs.clear();
        self.output_types.clear();
        self.library = StepsLibrary::new();
        self.requirements = Requirements::default();
        self.documentation = None;
        self.label = None;
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Borrows the graph until the returned guard is dropped, then closes it.
    pub fn scope(&mut self) -> GraphScope<'_> {
        GraphScope { graph: self }
    }
}

/// Closes its graph when dropped.
#[derive(Debug)]
pub struct GraphScope<'a> {
    graph: &'a mut WorkflowGraph,
}

impl Deref for GraphScope<'_> {
    type Target = WorkflowGraph;

    fn deref(&self) -> &WorkflowGraph {
        self.graph
    }
}

impl DerefMut for GraphScope<'_> {
    fn deref_mut(&mut self) -> &mut WorkflowGraph {
        self.graph
    }
}

impl Drop for GraphScope<'_> {
    fn drop(&mut self) {
        self.graph.close();
    }
}
