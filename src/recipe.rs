//! Workflow Recipes
//!
//! A recipe is a YAML file that replays graph operations: load step
//! templates, declare inputs, instantiate steps and expose outputs. It is
//! what the `cwlgen` binary consumes.
//!
//! # Example
//!
//! ```yaml
//! load:
//!   - tools
//! doc: Echo a message and count its characters.
//! inputs:
//!   - wfmessage: string
//!   - {lines: boolean, default: false}
//! steps:
//!   - run: echo
//!     in:
//!       message: wfmessage
//!   - run: wc
//!     in:
//!       file2count: echo/echoed
//! outputs:
//!   wfcount: wc/wced
//! ```
//!
//! Step outputs are referenced as `<occurrence>/<output>`; a template used
//! twice is named `echo`, then `echo-1`.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

use crate::error::RecipeError;
use crate::library::loader::is_url;
use crate::library::{LoadReport, StepsLibrary};
use crate::workflow::graph::{InputSpec, WorkflowGraph};
use crate::workflow::model::{Binding, ScatterMethod, StepBindings, TemplateLocation};
use crate::workflow::reference::Reference;

/// A single name or a list of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(value) => vec![value.clone()],
            Self::Many(values) => values.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    /// Step sources: directories, files or URLs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub load: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// Keyword-style declarations, e.g. `{input1: string, default: test}`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<Mapping>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<RecipeStep>,

    /// Workflow output name to reference.
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub outputs: IndexMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecipeStep {
    /// Template name or alias.
    pub run: String,

    #[serde(rename = "in", default)]
    pub inputs: IndexMap<String, OneOrMany>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scatter: Option<OneOrMany>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scatter_method: Option<ScatterMethod>,
}

impl RecipeStep {
    fn bindings(&self) -> Result<StepBindings, RecipeError> {
        let mut bindings = StepBindings::new();
        for (input, sources) in &self.inputs {
            let binding = match sources {
                OneOrMany::One(source) => Binding::Single(source.parse::<Reference>()?),
                OneOrMany::Many(sources) => Binding::Multiple(
                    sources
                        .iter()
                        .map(|s| s.parse::<Reference>())
                        .collect::<Result<Vec<_>, _>>()?,
                ),
            };
            bindings = bindings.bind(input.clone(), binding);
        }

        for input in self.scatter.iter().flat_map(OneOrMany::to_vec) {
            bindings = bindings.scatter(input);
        }
        if let Some(method) = self.scatter_method {
            bindings = bindings.scatter_method(method);
        }
        Ok(bindings)
    }
}

impl Recipe {
    pub fn parse(text: &str) -> Result<Self, RecipeError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn to_yaml(&self) -> Result<String, RecipeError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Resolves relative `load` entries and `working_dir` against `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        for source in &mut self.load {
            if !is_url(source) && Path::new(source.as_str()).is_relative() {
                *source = base.join(source.as_str()).to_string_lossy().into_owned();
            }
        }
        if let Some(dir) = &mut self.working_dir {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}

/// Reads a recipe; relative paths inside it are taken from its directory.
pub fn load_recipe(path: &Path) -> Result<Recipe, RecipeError> {
    info!("Loading recipe from: {}", path.display());

    let text = fs::read_to_string(path).map_err(|source| RecipeError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Recipe loaded ({} bytes)", text.len());

    let mut recipe = Recipe::parse(&text)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    recipe.resolve_paths(base);

    info!(
        "Parsed {} inputs, {} steps, {} outputs",
        recipe.inputs.len(),
        recipe.steps.len(),
        recipe.outputs.len()
    );
    Ok(recipe)
}

/// Replays a recipe into a new graph.
///
/// `extra_sources` are loaded before the recipe's own `load` entries. Load
/// problems are returned in the report; they only fail the build when a
/// step then cannot be found.
pub fn build_graph(recipe: &Recipe, extra_sources: &[PathBuf]) -> Result<(WorkflowGraph, LoadReport), RecipeError> {
    build_graph_with(recipe, extra_sources, StepsLibrary::new())
}

pub fn build_graph_with(
    recipe: &Recipe,
    extra_sources: &[PathBuf],
    library: StepsLibrary,
) -> Result<(WorkflowGraph, LoadReport), RecipeError> {
    let mut graph = WorkflowGraph::with_library(library);
    let mut report = LoadReport::default();

    for source in extra_sources {
        report.extend(graph.load(source.as_path())?);
    }
    for source in &recipe.load {
        report.extend(graph.load(source.as_str())?);
    }

    if let Some(dir) = &recipe.working_dir {
        graph.set_working_dir(dir)?;
    }
    if let Some(doc) = &recipe.doc {
        graph.set_documentation(doc.as_str())?;
    }
    if let Some(label) = &recipe.label {
        graph.set_label(label.as_str())?;
    }

    for declaration in &recipe.inputs {
        graph.add_input(InputSpec::from_mapping(declaration)?)?;
    }

    for (index, step) in recipe.steps.iter().enumerate() {
        let bindings = step.bindings()?;
        graph
            .instantiate(&step.run, bindings)
            .map_err(|source| RecipeError::Step {
                index: index + 1,
                step: step.run.clone(),
                source,
            })?;
    }

    let mut outputs = Vec::with_capacity(recipe.outputs.len());
    for (name, source) in &recipe.outputs {
        outputs.push((name.clone(), source.parse::<Reference>()?));
    }
    graph.add_outputs(outputs)?;

    info!(
        "Built workflow with {} inputs, {} steps, {} outputs",
        graph.inputs().len(),
        graph.steps().len(),
        graph.outputs().len()
    );
    Ok((graph, report))
}

/// Exports a graph as a recipe that rebuilds it.
///
/// Template locations become absolute `load` entries, in first-use order.
pub fn from_graph(graph: &WorkflowGraph) -> Recipe {
    let mut load: Vec<String> = Vec::new();
    let mut steps = Vec::new();

    for instance in graph.steps().values() {
        let template = instance.template();
        let location = match template.location() {
            TemplateLocation::Local(path) => path.to_string_lossy().into_owned(),
            TemplateLocation::Remote(url) => url.to_string(),
        };
        if !load.contains(&location) {
            load.push(location);
        }

        let inputs = instance
            .inputs()
            .iter()
            .map(|(name, binding)| {
                let sources = match binding {
                    Binding::Single(reference) => OneOrMany::One(reference.to_string()),
                    Binding::Multiple(references) => {
                        OneOrMany::Many(references.iter().map(ToString::to_string).collect())
                    }
                };
                (name.clone(), sources)
            })
            .collect();

        let scatter = match instance.scattered_input_names() {
            [] => None,
            [one] => Some(OneOrMany::One(one.clone())),
            many => Some(OneOrMany::Many(many.to_vec())),
        };

        steps.push(RecipeStep {
            run: template.name().to_string(),
            inputs,
            scatter,
            scatter_method: instance.scatter_method(),
        });
    }

    let inputs = graph
        .inputs()
        .values()
        .map(|spec| {
            let mut declaration = Mapping::new();
            declaration.insert(spec.name.as_str().into(), spec.cwl_type.to_value());
            if let Some(default) = &spec.default {
                declaration.insert("default".into(), default.clone());
            }
            if let Some(label) = &spec.label {
                declaration.insert("label".into(), label.as_str().into());
            }
            if let Some(symbols) = spec.symbols.as_ref().filter(|_| spec.is_enum()) {
                let symbols = symbols.iter().map(|s| Value::from(s.as_str())).collect();
                declaration.insert("symbols".into(), Value::Sequence(symbols));
            }
            declaration
        })
        .collect();

    let outputs = graph
        .outputs()
        .iter()
        .map(|(name, output)| (name.clone(), output.source.to_string()))
        .collect();

    Recipe {
        load,
        working_dir: graph.working_dir().map(Path::to_path_buf),
        doc: graph.documentation().map(str::to_string),
        label: graph.label().map(str::to_string),
        inputs,
        steps,
        outputs,
    }
}
