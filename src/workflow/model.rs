//! Step Data Model
//!
//! Core data structures describing reusable steps and their occurrences in a
//! workflow.
//!
//! - [`StepTemplate`]: immutable interface of a loaded step document
//! - [`StepInstance`]: one occurrence of a template, with its own name and wiring
//!
//! # Example step document
//!
//! ```yaml
//! cwlVersion: v1.0
//! class: CommandLineTool
//! baseCommand: echo
//! inputs:
//!   message:
//!     type: string
//!     inputBinding:
//!       position: 1
//! outputs:
//!   echoed:
//!     type: File
//!     outputBinding:
//!       glob: echoed.txt
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use url::Url;

use super::reference::Reference;
use super::types::CwlType;
use crate::error::{BuildError, LoadError};
use crate::library::loader::LoadedDocument;

/// Where a step document came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateLocation {
    Local(PathBuf),
    Remote(Url),
}

impl TemplateLocation {
    /// File name without extension; this becomes the template name.
    pub fn stem(&self) -> Option<String> {
        match self {
            Self::Local(path) => path.file_stem().and_then(|s| s.to_str()).map(str::to_string),
            Self::Remote(url) => url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(|segment| {
                    Path::new(segment)
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .unwrap_or(segment)
                        .to_string()
                }),
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }
}

impl fmt::Display for TemplateLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

/// The document classes usable as workflow steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepClass {
    CommandLineTool,
    ExpressionTool,
    Workflow,
}

impl StepClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CommandLineTool => "CommandLineTool",
            Self::ExpressionTool => "ExpressionTool",
            Self::Workflow => "Workflow",
        }
    }
}

impl FromStr for StepClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CommandLineTool" => Ok(Self::CommandLineTool),
            "ExpressionTool" => Ok(Self::ExpressionTool),
            "Workflow" => Ok(Self::Workflow),
            other => Err(format!("class '{}' cannot be used as a step", other)),
        }
    }
}

/// A declared step input.
#[derive(Debug, Clone, PartialEq)]
pub struct InputPort {
    pub name: String,
    pub cwl_type: CwlType,
    /// Has a default, or its type accepts null
    pub optional: bool,
}

/// A declared step output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPort {
    pub name: String,
    pub cwl_type: CwlType,
}

/// Immutable interface of a step document.
///
/// Built once from a [`LoadedDocument`]; the graph clones the `Arc`, never
/// the template.
#[derive(Debug, Clone)]
pub struct StepTemplate {
    name: String,
    alias: String,
    location: TemplateLocation,
    class: StepClass,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    nested_step_ids: Vec<String>,
    body: Value,
}

impl StepTemplate {
    /// Extracts the step interface from a loaded document.
    pub fn from_loaded(loaded: LoadedDocument) -> Result<Self, LoadError> {
        let LoadedDocument {
            location,
            document,
            class,
        } = loaded;
        let where_ = location.to_string();

        let name = location
            .stem()
            .ok_or_else(|| LoadError::validation(&where_, "cannot derive a step name"))?;

        let mut inputs = Vec::new();
        for (id, port) in ports(&document, "inputs", &where_)? {
            let (cwl_type, has_default) = port_type(&id, &port, &where_)?;
            let optional = has_default || is_optional_type(&id, &cwl_type, &where_)?;
            inputs.push(InputPort {
                name: id,
                cwl_type,
                optional,
            });
        }

        let mut outputs = Vec::new();
        for (id, port) in ports(&document, "outputs", &where_)? {
            let (cwl_type, _) = port_type(&id, &port, &where_)?;
            outputs.push(OutputPort { name: id, cwl_type });
        }

        let nested_step_ids = if class == StepClass::Workflow {
            ports(&document, "steps", &where_)?
                .into_iter()
                .map(|(id, _)| id)
                .collect()
        } else {
            Vec::new()
        };

        Ok(Self {
            alias: host_alias(&name),
            name,
            location,
            class,
            inputs,
            outputs,
            nested_step_ids,
            body: document,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier-safe name (`-` replaced by `_`).
    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn location(&self) -> &TemplateLocation {
        &self.location
    }

    pub fn class(&self) -> StepClass {
        self.class
    }

    pub fn is_composite(&self) -> bool {
        self.class == StepClass::Workflow
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn nested_step_ids(&self) -> &[String] {
        &self.nested_step_ids
    }

    /// The full document, with nested `run` links already inlined.
    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn input(&self, name: &str) -> Option<&InputPort> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputPort> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn required_inputs(&self) -> impl Iterator<Item = &InputPort> {
        self.inputs.iter().filter(|p| !p.optional)
    }

    pub fn optional_inputs(&self) -> impl Iterator<Item = &InputPort> {
        self.inputs.iter().filter(|p| p.optional)
    }

    /// Maps a binding key (declared name or its alias) to the declared name.
    pub fn resolve_input_name(&self, key: &str) -> Option<&str> {
        self.inputs
            .iter()
            .find(|p| p.name == key)
            .or_else(|| self.inputs.iter().find(|p| host_alias(&p.name) == key))
            .map(|p| p.name.as_str())
    }

    /// One-line call signature: `name(required[, optional]) -> outputs`.
    pub fn signature(&self) -> String {
        let required: Vec<_> = self.required_inputs().map(|p| p.name.as_str()).collect();
        let optional: Vec<_> = self.optional_inputs().map(|p| p.name.as_str()).collect();
        let outputs: Vec<_> = self.outputs.iter().map(|p| p.name.as_str()).collect();

        let params = match (required.is_empty(), optional.is_empty()) {
            (_, true) => required.join(", "),
            (true, false) => format!("[{}]", optional.join(", ")),
            (false, false) => format!("{}[, {}]", required.join(", "), optional.join(", ")),
        };
        format!("{}({}) -> {}", self.name, params, outputs.join(", "))
    }

    /// Required inputs and their types, one `name: type` per line.
    ///
    /// Plain types are quoted so they can be pasted into a recipe.
    pub fn list_inputs(&self) -> String {
        self.required_inputs()
            .map(|p| match &p.cwl_type {
                CwlType::Named(name) => format!("{}: '{}'", p.name, name),
                other => format!("{}: {}", p.name, other),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Identifier-safe alias of a step or input name.
pub fn host_alias(name: &str) -> String {
    name.replace('-', "_")
}

/// Reduces `file.cwl#message` or `#message` to `message`.
pub fn id_fragment(id: &str) -> &str {
    match id.rsplit_once('#') {
        Some((_, fragment)) => fragment,
        None => id,
    }
}

/// Normalises list-form (`[{id: x, ...}]`) and map-form (`{x: ...}`) port
/// sections into `(id, definition)` pairs.
fn ports(document: &Value, section: &str, location: &str) -> Result<Vec<(String, Value)>, LoadError> {
    match document.get(section) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Sequence(entries)) => entries
            .iter()
            .map(|entry| {
                let id = entry
                    .get("id")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        LoadError::validation(location, format!("an entry in '{}' has no id", section))
                    })?;
                Ok((id_fragment(id).to_string(), entry.clone()))
            })
            .collect(),
        Some(Value::Mapping(map)) => map
            .iter()
            .map(|(key, value)| {
                let id = key.as_str().ok_or_else(|| {
                    LoadError::validation(location, format!("non-string key in '{}'", section))
                })?;
                Ok((id_fragment(id).to_string(), value.clone()))
            })
            .collect(),
        Some(_) => Err(LoadError::validation(
            location,
            format!("'{}' must be a list or a mapping", section),
        )),
    }
}

/// Reads the declared type of a port and whether it carries a default.
fn port_type(id: &str, port: &Value, location: &str) -> Result<(CwlType, bool), LoadError> {
    let invalid = || LoadError::validation(location, format!("invalid type for '{}'", id));

    match port {
        Value::Mapping(map) => {
            let has_default = map.contains_key("default");
            let is_array_type = map.get("type").and_then(Value::as_str) == Some("array")
                && map.contains_key("items");
            let type_value = if is_array_type {
                port
            } else {
                map.get("type").ok_or_else(invalid)?
            };
            let cwl_type = CwlType::from_value(type_value).ok_or_else(invalid)?;
            Ok((cwl_type, has_default))
        }
        other => CwlType::from_value(other).map(|t| (t, false)).ok_or_else(invalid),
    }
}

/// Optional when the type is `T?` or a union with `null`. Other unions and
/// mappings are required; any other shape is rejected.
fn is_optional_type(id: &str, cwl_type: &CwlType, location: &str) -> Result<bool, LoadError> {
    match cwl_type {
        CwlType::Named(_) | CwlType::Array(_) => Ok(cwl_type.is_nullable()),
        CwlType::Complex(Value::Sequence(_)) => Ok(cwl_type.is_nullable()),
        CwlType::Complex(Value::Mapping(_)) => Ok(false),
        CwlType::Complex(_) => Err(LoadError::validation(
            location,
            format!("invalid input '{}'", id),
        )),
    }
}

/// Rule for pairing elements when more than one input is scattered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterMethod {
    #[serde(rename = "dotproduct")]
    DotProduct,
    NestedCrossproduct,
    FlatCrossproduct,
}

impl ScatterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DotProduct => "dotproduct",
            Self::NestedCrossproduct => "nested_crossproduct",
            Self::FlatCrossproduct => "flat_crossproduct",
        }
    }
}

impl FromStr for ScatterMethod {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dotproduct" => Ok(Self::DotProduct),
            "nested_crossproduct" => Ok(Self::NestedCrossproduct),
            "flat_crossproduct" => Ok(Self::FlatCrossproduct),
            other => Err(BuildError::InvalidScatterMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ScatterMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What feeds one step input: a single source, or several merged sources.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Single(Reference),
    Multiple(Vec<Reference>),
}

impl Binding {
    pub fn is_multiple(&self) -> bool {
        matches!(self, Self::Multiple(_))
    }

    pub fn references(&self) -> &[Reference] {
        match self {
            Self::Single(reference) => std::slice::from_ref(reference),
            Self::Multiple(references) => references,
        }
    }
}

impl From<Reference> for Binding {
    fn from(reference: Reference) -> Self {
        Self::Single(reference)
    }
}

impl From<&Reference> for Binding {
    fn from(reference: &Reference) -> Self {
        Self::Single(reference.clone())
    }
}

impl From<Vec<Reference>> for Binding {
    fn from(references: Vec<Reference>) -> Self {
        Self::Multiple(references)
    }
}

impl Serialize for Binding {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Single(reference) => reference.serialize(serializer),
            Self::Multiple(references) => references.serialize(serializer),
        }
    }
}

/// Scatter annotation of a step occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scatter {
    pub inputs: Vec<String>,
    pub method: Option<ScatterMethod>,
}

/// Keyword-style arguments for instantiating a step.
///
/// ```
/// use cwlgen::{Reference, ScatterMethod, StepBindings};
///
/// let messages = Reference::workflow_input("messages");
/// let bindings = StepBindings::new()
///     .bind("message", &messages)
///     .scatter("message")
///     .scatter_method(ScatterMethod::DotProduct);
/// assert_eq!(bindings.len(), 1);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StepBindings {
    pub(crate) inputs: IndexMap<String, Binding>,
    pub(crate) scatter: Vec<String>,
    pub(crate) scatter_method: Option<ScatterMethod>,
}

impl StepBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wires an input (by declared name or alias).
    pub fn bind(mut self, input: impl Into<String>, binding: impl Into<Binding>) -> Self {
        self.inputs.insert(input.into(), binding.into());
        self
    }

    /// Adds an input to scatter over.
    pub fn scatter(mut self, input: impl Into<String>) -> Self {
        self.scatter.push(input.into());
        self
    }

    pub fn scatter_method(mut self, method: ScatterMethod) -> Self {
        self.scatter_method = Some(method);
        self
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }
}

/// One occurrence of a template inside a workflow graph.
#[derive(Debug, Clone)]
pub struct StepInstance {
    template: Arc<StepTemplate>,
    occurrence_name: String,
    inputs: IndexMap<String, Binding>,
    scatter: Option<Scatter>,
    output_types: IndexMap<String, CwlType>,
}

impl StepInstance {
    pub(crate) fn new(
        template: Arc<StepTemplate>,
        occurrence_name: String,
        inputs: IndexMap<String, Binding>,
        scatter: Option<Scatter>,
    ) -> Self {
        let scattered = scatter.is_some();
        let output_types = template
            .outputs()
            .iter()
            .map(|p| {
                let typ = if scattered {
                    p.cwl_type.clone().array_of()
                } else {
                    p.cwl_type.clone()
                };
                (p.name.clone(), typ)
            })
            .collect();

        Self {
            template,
            occurrence_name,
            inputs,
            scatter,
            output_types,
        }
    }

    pub fn template(&self) -> &StepTemplate {
        &self.template
    }

    pub fn occurrence_name(&self) -> &str {
        &self.occurrence_name
    }

    pub fn inputs(&self) -> &IndexMap<String, Binding> {
        &self.inputs
    }

    pub fn is_scattered(&self) -> bool {
        self.scatter.is_some()
    }

    pub fn scatter(&self) -> Option<&Scatter> {
        self.scatter.as_ref()
    }

    pub fn scattered_input_names(&self) -> &[String] {
        self.scatter.as_ref().map(|s| s.inputs.as_slice()).unwrap_or(&[])
    }

    pub fn scatter_method(&self) -> Option<ScatterMethod> {
        self.scatter.as_ref().and_then(|s| s.method)
    }

    /// Output types after the scatter transformation.
    pub fn output_types(&self) -> &IndexMap<String, CwlType> {
        &self.output_types
    }

    pub fn output_reference(&self, output: &str) -> Option<Reference> {
        self.template
            .output(output)
            .map(|p| Reference::step_output(&self.occurrence_name, &p.name))
    }

    pub fn output_references(&self) -> Vec<Reference> {
        self.template
            .outputs()
            .iter()
            .map(|p| Reference::step_output(&self.occurrence_name, &p.name))
            .collect()
    }
}

/// References returned from instantiating a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutputs {
    Single(Reference),
    Multiple(Vec<Reference>),
}

impl StepOutputs {
    pub(crate) fn from_references(mut references: Vec<Reference>) -> Self {
        if references.len() == 1 {
            Self::Single(references.remove(0))
        } else {
            Self::Multiple(references)
        }
    }

    /// The reference, if the step has exactly one output.
    pub fn single(&self) -> Option<&Reference> {
        match self {
            Self::Single(reference) => Some(reference),
            Self::Multiple(_) => None,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Reference> {
        match self {
            Self::Single(reference) if index == 0 => Some(reference),
            Self::Single(_) => None,
            Self::Multiple(references) => references.get(index),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Multiple(references) => references.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_vec(self) -> Vec<Reference> {
        match self {
            Self::Single(reference) => vec![reference],
            Self::Multiple(references) => references,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::loader::LoadedDocument;

    fn template(name: &str, text: &str) -> StepTemplate {
        let document: Value = serde_yaml::from_str(text).unwrap();
        let class = document["class"].as_str().unwrap().parse().unwrap();
        StepTemplate::from_loaded(LoadedDocument {
            location: TemplateLocation::Local(PathBuf::from(format!("/steps/{}.cwl", name))),
            document,
            class,
        })
        .unwrap()
    }

    const MIXED: &str = r##"
class: CommandLineTool
inputs:
  - id: "#in-files"
    type: File[]
  - id: out_dir
    type: string?
  - id: counselors
    type: ['null', 'string[]']
  - id: threads
    type: int
    default: 1
outputs:
  - id: out-files
    type: {type: array, items: File}
"##;

    #[test]
    fn test_template_name_and_alias() {
        let t = template("multiple-out-args", MIXED);
        assert_eq!(t.name(), "multiple-out-args");
        assert_eq!(t.alias(), "multiple_out_args");
        assert!(!t.is_composite());
    }

    #[test]
    fn test_optionality_rules() {
        let t = template("mixed", MIXED);
        let optional: Vec<_> = t.optional_inputs().map(|p| p.name.as_str()).collect();
        let required: Vec<_> = t.required_inputs().map(|p| p.name.as_str()).collect();
        assert_eq!(required, vec!["in-files"]);
        assert_eq!(optional, vec!["out_dir", "counselors", "threads"]);
    }

    #[test]
    fn test_output_array_type() {
        let t = template("mixed", MIXED);
        assert_eq!(t.outputs()[0].cwl_type, CwlType::named("File").array_of());
    }

    #[test]
    fn test_map_form_ports() {
        let t = template(
            "echo",
            "class: CommandLineTool\ninputs:\n  message: string\noutputs:\n  echoed:\n    type: File\n",
        );
        assert_eq!(t.inputs()[0].name, "message");
        assert_eq!(t.inputs()[0].cwl_type, CwlType::named("string"));
        assert_eq!(t.outputs()[0].name, "echoed");
    }

    #[test]
    fn test_invalid_input_type_is_a_load_error() {
        let document: Value =
            serde_yaml::from_str("class: CommandLineTool\ninputs:\n  x: 3\noutputs: []\n").unwrap();
        let result = StepTemplate::from_loaded(LoadedDocument {
            location: TemplateLocation::Local(PathBuf::from("/steps/bad.cwl")),
            document,
            class: StepClass::CommandLineTool,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_input_name_accepts_alias() {
        let t = template("mixed", MIXED);
        assert_eq!(t.resolve_input_name("in_files"), Some("in-files"));
        assert_eq!(t.resolve_input_name("in-files"), Some("in-files"));
        assert_eq!(t.resolve_input_name("nope"), None);
    }

    #[test]
    fn test_signature_and_list_inputs() {
        let t = template("mixed", MIXED);
        assert_eq!(
            t.signature(),
            "mixed(in-files[, out_dir, counselors, threads]) -> out-files"
        );
        assert_eq!(t.list_inputs(), "in-files: 'File[]'");
    }

    #[test]
    fn test_workflow_template_nested_ids() {
        let t = template(
            "echo-wc",
            r#"
class: Workflow
inputs: {wfmessage: string}
outputs: {wfcount: {type: File, outputSource: wc/wced}}
steps:
  echo: {run: {class: CommandLineTool, inputs: [], outputs: []}, in: {}, out: []}
  wc: {run: {class: CommandLineTool, inputs: [], outputs: []}, in: {}, out: []}
"#,
        );
        assert!(t.is_composite());
        assert_eq!(t.nested_step_ids(), &["echo".to_string(), "wc".to_string()]);
    }

    #[test]
    fn test_scatter_method_parse() {
        assert_eq!(
            "nested_crossproduct".parse::<ScatterMethod>().unwrap(),
            ScatterMethod::NestedCrossproduct
        );
        assert!(matches!(
            "blah".parse::<ScatterMethod>(),
            Err(BuildError::InvalidScatterMethod(_))
        ));
        assert_eq!(ScatterMethod::DotProduct.to_string(), "dotproduct");
    }

    #[test]
    fn test_remote_location_stem() {
        let url = Url::parse("https://example.org/cwl/anonymize.cwl").unwrap();
        assert_eq!(
            TemplateLocation::Remote(url).stem(),
            Some("anonymize".to_string())
        );
    }

    #[test]
    fn test_step_outputs_shapes() {
        let one = StepOutputs::from_references(vec![Reference::step_output("echo", "echoed")]);
        assert!(one.single().is_some());
        assert_eq!(one.len(), 1);

        let two = StepOutputs::from_references(vec![
            Reference::step_output("m", "a"),
            Reference::step_output("m", "b"),
        ]);
        assert!(two.single().is_none());
        assert_eq!(two.get(1), Some(&Reference::step_output("m", "b")));
        assert_eq!(two.into_vec().len(), 2);
    }

    #[test]
    fn test_instance_scatter_turns_outputs_into_arrays() {
        let t = Arc::new(template(
            "echo",
            "class: CommandLineTool\ninputs:\n  message: string\noutputs:\n  echoed: File\n",
        ));
        let instance = StepInstance::new(
            t,
            "echo".to_string(),
            IndexMap::new(),
            Some(Scatter {
                inputs: vec!["message".to_string()],
                method: None,
            }),
        );
        assert!(instance.is_scattered());
        assert_eq!(
            instance.output_types()["echoed"],
            CwlType::named("File").array_of()
        );
        assert_eq!(
            instance.output_reference("echoed"),
            Some(Reference::step_output("echo", "echoed"))
        );
    }
}
