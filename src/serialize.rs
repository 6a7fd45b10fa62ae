//! Workflow Serialization
//!
//! Renders a [`WorkflowGraph`] as a CWL workflow document and writes it to
//! disk. How each step points at its template is chosen by [`LinkMode`]:
//!
//! | Mode               | `run:` value                                  |
//! |--------------------|-----------------------------------------------|
//! | `absolute`         | absolute path (or URL)                        |
//! | `relative`         | path relative to the saved document           |
//! | `working-directory`| bare file name; templates copied alongside    |
//! | `packed`           | the template body itself                      |
//!
//! Saved files start with a `#!/usr/bin/env cwl-runner` line.

use std::fmt;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use log::{debug, info};
use serde_yaml::{Mapping, Value};

use crate::error::{BuildError, SaveError};
use crate::workflow::graph::{InputSpec, WorkflowGraph};
use crate::workflow::model::{id_fragment, StepInstance, TemplateLocation};

pub const HEADER: &str = "#!/usr/bin/env cwl-runner\n";
pub const CWL_VERSION: &str = "v1.0";

/// How step templates are referenced from the rendered document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LinkMode {
    #[default]
    Absolute,
    Relative,
    WorkingDirectory,
    Packed,
}

impl FromStr for LinkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abs" | "absolute" => Ok(Self::Absolute),
            "rel" | "relative" => Ok(Self::Relative),
            "wd" | "working-directory" => Ok(Self::WorkingDirectory),
            "pack" | "packed" => Ok(Self::Packed),
            "inline" => {
                log::warn!("Mode 'inline' is deprecated; saving with mode 'pack'");
                Ok(Self::Packed)
            }
            other => Err(format!(
                "Illegal mode '{}'. Choose one of (rel, abs, wd, pack)",
                other
            )),
        }
    }
}

impl fmt::Display for LinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Absolute => "absolute",
            Self::Relative => "relative",
            Self::WorkingDirectory => "working-directory",
            Self::Packed => "packed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    /// Round-trip the document through the loader before writing.
    pub validate: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self { validate: true }
    }
}

/// Renders one graph in one link mode.
pub struct Serializer<'a> {
    graph: &'a WorkflowGraph,
    mode: LinkMode,
    base_dir: Option<PathBuf>,
}

impl<'a> Serializer<'a> {
    pub fn new(graph: &'a WorkflowGraph, mode: LinkMode) -> Self {
        Self {
            graph,
            mode,
            base_dir: None,
        }
    }

    /// Directory relative links are computed against.
    pub fn relative_to(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn render(&self) -> Result<Value, SaveError> {
        if self.graph.is_closed() {
            return Err(BuildError::Closed.into());
        }
        if self.mode == LinkMode::WorkingDirectory && self.graph.working_dir().is_none() {
            return Err(SaveError::MissingWorkingDir);
        }

        let mut doc = Mapping::new();
        doc.insert("cwlVersion".into(), CWL_VERSION.into());
        doc.insert("class".into(), "Workflow".into());
        if let Some(documentation) = self.graph.documentation() {
            doc.insert("doc".into(), documentation.into());
        }
        if let Some(label) = self.graph.label() {
            doc.insert("label".into(), label.into());
        }

        let requirements = self.graph.requirements();
        if requirements.any() {
            let classes = [
                (requirements.subworkflow, "SubworkflowFeatureRequirement"),
                (requirements.scatter, "ScatterFeatureRequirement"),
                (requirements.multiple_inputs, "MultipleInputFeatureRequirement"),
            ];
            let entries = classes
                .into_iter()
                .filter(|(needed, _)| *needed)
                .map(|(_, class)| {
                    let mut entry = Mapping::new();
                    entry.insert("class".into(), class.into());
                    Value::Mapping(entry)
                })
                .collect();
            doc.insert("requirements".into(), Value::Sequence(entries));
        }

        let mut inputs = Mapping::new();
        for (name, spec) in self.graph.inputs() {
            inputs.insert(name.as_str().into(), input_entry(spec));
        }
        doc.insert("inputs".into(), Value::Mapping(inputs));

        let mut outputs = Mapping::new();
        for (name, output) in self.graph.outputs() {
            let mut entry = Mapping::new();
            entry.insert("type".into(), output.cwl_type.to_value());
            entry.insert("outputSource".into(), output.source.to_string().into());
            outputs.insert(name.as_str().into(), Value::Mapping(entry));
        }
        doc.insert("outputs".into(), Value::Mapping(outputs));

        let mut steps = Mapping::new();
        for (name, instance) in self.graph.steps() {
            steps.insert(name.as_str().into(), self.step_entry(instance)?);
        }
        doc.insert("steps".into(), Value::Mapping(steps));

        Ok(Value::Mapping(doc))
    }

    fn step_entry(&self, instance: &StepInstance) -> Result<Value, SaveError> {
        let mut entry = Mapping::new();
        entry.insert("run".into(), self.run_value(instance)?);

        let mut inputs = Mapping::new();
        for (name, binding) in instance.inputs() {
            inputs.insert(name.as_str().into(), serde_yaml::to_value(binding)?);
        }
        entry.insert("in".into(), Value::Mapping(inputs));

        let outputs = instance
            .template()
            .outputs()
            .iter()
            .map(|p| Value::from(p.name.as_str()))
            .collect();
        entry.insert("out".into(), Value::Sequence(outputs));

        if let Some(scatter) = instance.scatter() {
            let names = scatter.inputs.iter().map(|n| Value::from(n.as_str())).collect();
            entry.insert("scatter".into(), Value::Sequence(names));
            if let Some(method) = scatter.method {
                entry.insert("scatterMethod".into(), method.as_str().into());
            }
        }

        Ok(Value::Mapping(entry))
    }

    fn run_value(&self, instance: &StepInstance) -> Result<Value, SaveError> {
        let template = instance.template();
        let run = match (self.mode, template.location()) {
            (LinkMode::Packed, _) => pack_body(template.body(), instance.occurrence_name()),
            (_, TemplateLocation::Remote(url)) => url.as_str().into(),
            (LinkMode::Absolute, TemplateLocation::Local(path)) => path_value(path),
            (LinkMode::Relative, TemplateLocation::Local(path)) => {
                let base = match &self.base_dir {
                    Some(dir) => dir.clone(),
                    None => std::env::current_dir().map_err(|e| SaveError::io(".", e))?,
                };
                path_value(&relative_path(path, &base))
            }
            (LinkMode::WorkingDirectory, TemplateLocation::Local(path)) => {
                let name = path.file_name().map(Path::new).unwrap_or(path);
                path_value(name)
            }
        };
        Ok(run)
    }
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

fn input_entry(spec: &InputSpec) -> Value {
    let type_value = spec.effective_type().to_value();

    if !spec.is_enum() && spec.default.is_none() && spec.label.is_none() {
        return type_value;
    }

    let mut entry = Mapping::new();
    entry.insert("type".into(), type_value);
    if let Some(default) = &spec.default {
        entry.insert("default".into(), default.clone());
    }
    if let Some(label) = &spec.label {
        entry.insert("label".into(), label.as_str().into());
    }
    Value::Mapping(entry)
}

/// Embeds a template body as a packed step.
///
/// The body gets the id `#<occurrence>` and its list-form ports become
/// `#<occurrence>/<port>`. Nested documents lose their `cwlVersion` and
/// document-qualified ids and sources are reduced to their local part.
fn pack_body(body: &Value, occurrence: &str) -> Value {
    let mut packed = body.clone();
    localize(&mut packed);

    if let Value::Mapping(map) = &mut packed {
        map.shift_remove("cwlVersion");
        map.insert("id".into(), format!("#{}", occurrence).into());

        for section in ["inputs", "outputs"] {
            if let Some(Value::Sequence(ports)) = map.get_mut(section) {
                for port in ports.iter_mut() {
                    if let Some(Value::String(id)) = port.get_mut("id") {
                        *id = format!("#{}/{}", occurrence, id_fragment(id));
                    }
                }
            }
        }
    }
    packed
}

/// Strips document qualifiers (`file.cwl#`) from ids and sources, and
/// `cwlVersion` and file ids from embedded documents.
pub(crate) fn localize(value: &mut Value) {
    match value {
        Value::Mapping(map) => {
            let file_id = matches!(
                map.get("id"),
                Some(Value::String(id)) if id.contains("://") && !id.contains('#')
            );
            if file_id {
                map.shift_remove("id");
            }
            for key in ["id", "source", "outputSource"] {
                match map.get_mut(key) {
                    Some(Value::String(link)) => strip_qualifier(link),
                    Some(Value::Sequence(links)) => {
                        for link in links.iter_mut() {
                            if let Value::String(link) = link {
                                strip_qualifier(link);
                            }
                        }
                    }
                    _ => {}
                }
            }
            if let Some(Value::Sequence(outs)) = map.get_mut("out") {
                for out in outs.iter_mut() {
                    if let Value::String(name) = out {
                        strip_qualifier(name);
                    } else {
                        localize(out);
                    }
                }
            }
            if let Some(Value::Mapping(run)) = map.get_mut("run") {
                run.shift_remove("cwlVersion");
            }
            if let Some(run) = map.get_mut("run") {
                localize(run);
            }
            for section in ["inputs", "outputs", "steps", "in"] {
                if let Some(entries) = map.get_mut(section) {
                    localize_entries(entries);
                }
            }
        }
        Value::Sequence(items) => items.iter_mut().for_each(localize),
        _ => {}
    }
}

fn localize_entries(entries: &mut Value) {
    match entries {
        Value::Sequence(items) => items.iter_mut().for_each(localize),
        Value::Mapping(map) => map.values_mut().for_each(localize),
        _ => {}
    }
}

fn strip_qualifier(link: &mut String) {
    if link.contains('#') {
        *link = id_fragment(link).to_string();
    }
}

/// Text form of a scalar (numbers and booleans included).
pub(crate) fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

/// `target` relative to the directory `base`; both should be absolute.
pub fn relative_path(target: &Path, base: &Path) -> PathBuf {
    let target_parts: Vec<Component> = target.components().collect();
    let base_parts: Vec<Component> = base.components().collect();

    if target_parts.first() != base_parts.first() {
        return target.to_path_buf();
    }

    let common = target_parts
        .iter()
        .zip(&base_parts)
        .take_while(|(a, b)| a == b)
        .count();

    let mut relative = PathBuf::new();
    for _ in common..base_parts.len() {
        relative.push("..");
    }
    for part in &target_parts[common..] {
        relative.push(part.as_os_str());
    }
    if relative.as_os_str().is_empty() {
        relative.push(".");
    }
    relative
}

/// The document as written to disk, header included.
pub fn to_yaml_string(document: &Value) -> Result<String, SaveError> {
    Ok(format!("{}{}", HEADER, serde_yaml::to_string(document)?))
}

fn write_document(path: &Path, document: &Value) -> Result<(), SaveError> {
    let text = to_yaml_string(document)?;
    fs::write(path, text).map_err(|e| SaveError::io(path, e))?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn absolute(path: &Path) -> Result<PathBuf, SaveError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = std::env::current_dir().map_err(|e| SaveError::io(path, e))?;
        Ok(cwd.join(path))
    }
}

/// Validates (unless disabled), renders and writes the graph to `path`.
pub fn save(graph: &WorkflowGraph, path: &Path, mode: LinkMode, options: SaveOptions) -> Result<(), SaveError> {
    if graph.is_closed() {
        return Err(BuildError::Closed.into());
    }
    if options.validate {
        graph.validate()?;
    }

    let path = absolute(path)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("/"));
    fs::create_dir_all(&dir).map_err(|e| SaveError::io(&dir, e))?;

    match mode {
        LinkMode::Absolute | LinkMode::Packed => {
            let document = Serializer::new(graph, mode).render()?;
            write_document(&path, &document)?;
        }
        LinkMode::Relative => {
            let document = Serializer::new(graph, mode).relative_to(&dir).render()?;
            write_document(&path, &document)?;
        }
        LinkMode::WorkingDirectory => {
            let working_dir = graph.working_dir().ok_or(SaveError::MissingWorkingDir)?;
            save_in_working_dir(graph, &path, working_dir)?;
        }
    }

    info!("Saved workflow to {} ({} mode)", path.display(), mode);
    Ok(())
}

/// Copies every local template into the working directory, writes the
/// workflow there and copies it to `path`.
fn save_in_working_dir(graph: &WorkflowGraph, path: &Path, working_dir: &Path) -> Result<(), SaveError> {
    fs::create_dir_all(working_dir).map_err(|e| SaveError::io(working_dir, e))?;

    for instance in graph.steps().values() {
        let template = instance.template();
        let TemplateLocation::Local(source) = template.location() else {
            continue;
        };
        let Some(file_name) = source.file_name() else {
            continue;
        };
        let target = working_dir.join(file_name);

        if template.is_composite() {
            // Nested links are already inlined, so the copy is self-contained.
            write_document(&target, template.body())?;
        } else if source != &target {
            fs::copy(source, &target).map_err(|e| SaveError::io(source, e))?;
        }
    }

    let file_name = path
        .file_name()
        .ok_or_else(|| SaveError::io(path, std::io::Error::from(std::io::ErrorKind::InvalidInput)))?;
    let wd_file = working_dir.join(file_name);
    let document = Serializer::new(graph, LinkMode::WorkingDirectory).render()?;
    write_document(&wd_file, &document)?;

    if wd_file != path {
        fs::copy(&wd_file, path).map_err(|e| SaveError::io(&wd_file, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::loader::classify;
    use crate::testing::write_fixtures;
    use crate::workflow::graph::InputSpec;
    use crate::workflow::model::{ScatterMethod, StepBindings, StepClass};
    use tempfile::TempDir;

    fn echo_wc_graph() -> (TempDir, WorkflowGraph) {
        let dir = write_fixtures();
        let mut wf = WorkflowGraph::new();
        wf.load(dir.path().join("tools")).unwrap();

        let msg = wf.add_input(InputSpec::new("wfmessage", "string")).unwrap();
        let echoed = wf
            .instantiate("echo", StepBindings::new().bind("message", &msg))
            .unwrap();
        let wced = wf
            .instantiate("wc", StepBindings::new().bind("file2count", echoed.single().unwrap()))
            .unwrap();
        wf.add_output("wfcount", wced.single().unwrap()).unwrap();
        (dir, wf)
    }

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    fn read_back(path: &Path) -> (String, Value) {
        let text = fs::read_to_string(path).unwrap();
        let value = serde_yaml::from_str(&text).unwrap();
        (text, value)
    }

    #[test]
    fn test_link_mode_parse() {
        assert_eq!("abs".parse::<LinkMode>(), Ok(LinkMode::Absolute));
        assert_eq!("rel".parse::<LinkMode>(), Ok(LinkMode::Relative));
        assert_eq!("working-directory".parse::<LinkMode>(), Ok(LinkMode::WorkingDirectory));
        assert_eq!("inline".parse::<LinkMode>(), Ok(LinkMode::Packed));
        assert!("zip".parse::<LinkMode>().is_err());
    }

    #[test]
    fn test_relative_path() {
        assert_eq!(
            relative_path(Path::new("/data/tools/echo.cwl"), Path::new("/data/out")),
            PathBuf::from("../tools/echo.cwl")
        );
        assert_eq!(
            relative_path(Path::new("/data/out/echo.cwl"), Path::new("/data/out")),
            PathBuf::from("echo.cwl")
        );
        assert_eq!(
            relative_path(Path::new("/a/b"), Path::new("/c/d/e")),
            PathBuf::from("../../../a/b")
        );
    }

    #[test]
    fn test_document_header_fields() {
        let (_dir, wf) = echo_wc_graph();
        let doc = wf.to_document(LinkMode::Absolute).unwrap();

        let keys: Vec<_> = doc.as_mapping().unwrap().keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, vec!["cwlVersion", "class", "inputs", "outputs", "steps"]);
        assert_eq!(doc["cwlVersion"], yaml("v1.0"));
        assert_eq!(doc["inputs"], yaml("{wfmessage: string}"));
        assert_eq!(doc["steps"]["wc"]["in"], yaml("{file2count: echo/echoed}"));
        assert_eq!(doc["steps"]["wc"]["out"], yaml("[wced]"));
    }

    #[test]
    fn test_absolute_run_links() {
        let (dir, wf) = echo_wc_graph();
        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        let expected = dir.path().join("tools").join("echo.cwl");
        assert_eq!(
            doc["steps"]["echo"]["run"].as_str(),
            Some(expected.to_str().unwrap())
        );
    }

    #[test]
    fn test_absolute_round_trip_classifies_every_step() {
        let (_dir, wf) = echo_wc_graph();
        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        let reparsed: Value = serde_yaml::from_str(&to_yaml_string(&doc).unwrap()).unwrap();

        assert_eq!(classify(&reparsed), Ok(StepClass::Workflow));
        assert!(crate::workflow::validator::validate_document(
            &reparsed,
            wf.steps(),
            wf.library().loader()
        )
        .is_ok());
    }

    #[test]
    fn test_requirements_in_order() {
        let dir = write_fixtures();
        let mut wf = WorkflowGraph::new();
        wf.load(dir.path().join("tools")).unwrap();
        wf.load(dir.path().join("workflows")).unwrap();

        let msgs = wf.add_input(InputSpec::new("msgs", "string[]")).unwrap();
        let a = wf.add_input(InputSpec::new("a", "File")).unwrap();
        let msg = wf.add_input(InputSpec::new("msg", "string")).unwrap();
        wf.instantiate(
            "echo",
            StepBindings::new().bind("message", &msgs).scatter("message"),
        )
        .unwrap();
        wf.instantiate(
            "multiple-out-args",
            StepBindings::new().bind("in-files", vec![a.clone(), a]),
        )
        .unwrap();
        wf.instantiate("echo-wc", StepBindings::new().bind("wfmessage", &msg))
            .unwrap();

        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        assert_eq!(
            doc["requirements"],
            yaml(
                "[{class: SubworkflowFeatureRequirement}, {class: ScatterFeatureRequirement}, {class: MultipleInputFeatureRequirement}]"
            )
        );
        assert_eq!(doc["steps"]["multiple-out-args"]["in"]["in-files"], yaml("[a, a]"));
    }

    #[test]
    fn test_no_requirements_key_when_unneeded() {
        let (_dir, wf) = echo_wc_graph();
        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        assert!(doc.get("requirements").is_none());
    }

    #[test]
    fn test_scatter_annotation() {
        let dir = write_fixtures();
        let mut wf = WorkflowGraph::new();
        wf.load(dir.path().join("tools")).unwrap();
        let msgs = wf.add_input(InputSpec::new("msgs", "string[]")).unwrap();
        wf.instantiate(
            "echo",
            StepBindings::new()
                .bind("message", &msgs)
                .scatter("message")
                .scatter_method(ScatterMethod::NestedCrossproduct),
        )
        .unwrap();

        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        assert_eq!(doc["steps"]["echo"]["scatter"], yaml("[message]"));
        assert_eq!(doc["steps"]["echo"]["scatterMethod"], yaml("nested_crossproduct"));
    }

    #[test]
    fn test_input_shapes() {
        let mut wf = WorkflowGraph::new();
        wf.add_input(InputSpec::new("plain", "string")).unwrap();
        wf.add_input(InputSpec::new("input1", "string").default("test")).unwrap();
        wf.add_input(InputSpec::new("named", "File").label("A file")).unwrap();
        wf.add_input(InputSpec::new("mode", "enum").symbols(["fast", "slow"]))
            .unwrap();

        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        assert_eq!(doc["inputs"]["plain"], yaml("string"));
        assert_eq!(doc["inputs"]["input1"], yaml("{type: string, default: test}"));
        assert_eq!(doc["inputs"]["named"], yaml("{type: File, label: A file}"));
        assert_eq!(
            doc["inputs"]["mode"],
            yaml("{type: {type: enum, symbols: [fast, slow]}}")
        );
    }

    #[test]
    fn test_doc_and_label() {
        let mut wf = WorkflowGraph::new();
        wf.set_documentation("Counts words.\nSecond line.").unwrap();
        wf.set_label("wordcount").unwrap();

        let doc = wf.to_document(LinkMode::Absolute).unwrap();
        let reparsed: Value = serde_yaml::from_str(&to_yaml_string(&doc).unwrap()).unwrap();
        assert_eq!(reparsed["doc"].as_str(), Some("Counts words.\nSecond line."));
        assert_eq!(reparsed["label"].as_str(), Some("wordcount"));
    }

    #[test]
    fn test_save_writes_header() {
        let (dir, wf) = echo_wc_graph();
        let path = dir.path().join("out").join("echo-wc.cwl");
        save(&wf, &path, LinkMode::Absolute, SaveOptions::default()).unwrap();

        let (text, _) = read_back(&path);
        assert!(text.starts_with(HEADER));
    }

    #[test]
    fn test_save_relative() {
        let (dir, wf) = echo_wc_graph();
        let path = dir.path().join("out").join("echo-wc.cwl");
        save(&wf, &path, LinkMode::Relative, SaveOptions::default()).unwrap();

        let (_, doc) = read_back(&path);
        assert_eq!(doc["steps"]["echo"]["run"].as_str(), Some("../tools/echo.cwl"));
    }

    #[test]
    fn test_working_directory_mode_needs_dir() {
        let (dir, wf) = echo_wc_graph();
        let path = dir.path().join("wf.cwl");
        assert!(matches!(
            save(&wf, &path, LinkMode::WorkingDirectory, SaveOptions::default()),
            Err(SaveError::MissingWorkingDir)
        ));
        assert!(matches!(
            wf.to_document(LinkMode::WorkingDirectory),
            Err(SaveError::MissingWorkingDir)
        ));
    }

    #[test]
    fn test_save_working_directory() {
        let (dir, wf) = echo_wc_graph();
        let wd = dir.path().join("wd");
        let wf = {
            let mut wf = wf;
            wf.set_working_dir(&wd).unwrap();
            wf
        };
        let path = dir.path().join("out").join("echo-wc.cwl");
        save(&wf, &path, LinkMode::WorkingDirectory, SaveOptions::default()).unwrap();

        assert!(wd.join("echo.cwl").exists());
        assert!(wd.join("wc.cwl").exists());
        assert!(wd.join("echo-wc.cwl").exists());

        let (_, doc) = read_back(&path);
        assert_eq!(doc["steps"]["echo"]["run"].as_str(), Some("echo.cwl"));
    }

    fn assert_no_external_runs(value: &Value) {
        match value {
            Value::Mapping(map) => {
                if let Some(run) = map.get("run") {
                    assert!(run.is_mapping(), "external run link {:?}", run);
                }
                map.values().for_each(assert_no_external_runs);
            }
            Value::Sequence(items) => items.iter().for_each(assert_no_external_runs),
            Value::String(s) => assert!(!s.ends_with(".cwl"), "external reference {}", s),
            _ => {}
        }
    }

    #[test]
    fn test_packed_is_self_contained() {
        let dir = write_fixtures();
        let mut wf = WorkflowGraph::new();
        wf.load(dir.path().join("tools")).unwrap();
        wf.load(dir.path().join("workflows")).unwrap();

        let msg = wf.add_input(InputSpec::new("msg", "string")).unwrap();
        wf.instantiate("echo-wc", StepBindings::new().bind("wfmessage", &msg))
            .unwrap();
        let path = dir.path().join("packed.cwl");
        save(&wf, &path, LinkMode::Packed, SaveOptions::default()).unwrap();

        let (_, doc) = read_back(&path);
        assert_no_external_runs(&doc);
        assert_eq!(classify(&doc), Ok(StepClass::Workflow));

        let embedded = &doc["steps"]["echo-wc"]["run"];
        assert_eq!(embedded["id"].as_str(), Some("#echo-wc"));
        assert!(embedded.get("cwlVersion").is_none());
        assert_eq!(embedded["steps"]["echo"]["run"]["class"].as_str(), Some("CommandLineTool"));
        assert!(crate::workflow::validator::validate_document(&doc, wf.steps(), wf.library().loader()).is_ok());
    }

    #[test]
    fn test_pack_body_rewrites_list_port_ids() {
        let body = yaml(
            "cwlVersion: v1.0\nclass: CommandLineTool\ninputs: [{id: '#in-files', type: 'File[]'}]\noutputs: [{id: out-files, type: 'File[]'}]",
        );
        let packed = pack_body(&body, "multiple-out-args-1");
        assert_eq!(packed["inputs"][0]["id"].as_str(), Some("#multiple-out-args-1/in-files"));
        assert_eq!(packed["outputs"][0]["id"].as_str(), Some("#multiple-out-args-1/out-files"));
    }

    #[test]
    fn test_localize_nested_sources() {
        let mut body = yaml(
            r#"
class: Workflow
id: file:///data/echo-wc.cwl
inputs: [{id: "file:///data/echo-wc.cwl#wfmessage", type: string}]
outputs:
  - id: "file:///data/echo-wc.cwl#wfcount"
    type: File
    outputSource: "file:///data/echo-wc.cwl#wc/wced"
steps:
  - id: "file:///data/echo-wc.cwl#wc"
    run: {class: CommandLineTool, cwlVersion: v1.0, inputs: [], outputs: []}
    in:
      - id: "file:///data/echo-wc.cwl#wc/file2count"
        source: "file:///data/echo-wc.cwl#echo/echoed"
    out: ["file:///data/echo-wc.cwl#wc/wced"]
"#,
        );
        localize(&mut body);

        assert!(body.get("id").is_none());
        assert_eq!(body["outputs"][0]["outputSource"].as_str(), Some("wc/wced"));
        assert_eq!(body["steps"][0]["id"].as_str(), Some("wc"));
        assert_eq!(body["steps"][0]["in"][0]["source"].as_str(), Some("echo/echoed"));
        assert_eq!(body["steps"][0]["out"][0].as_str(), Some("wc/wced"));
        assert!(body["steps"][0]["run"].get("cwlVersion").is_none());
    }

    #[test]
    fn test_save_without_validation() {
        let (dir, wf) = echo_wc_graph();
        fs::remove_file(dir.path().join("tools/wc.cwl")).unwrap();

        let path = dir.path().join("wf.cwl");
        assert!(matches!(
            save(&wf, &path, LinkMode::Absolute, SaveOptions::default()),
            Err(SaveError::Validation(_))
        ));
        assert!(save(&wf, &path, LinkMode::Absolute, SaveOptions { validate: false }).is_ok());
    }
}
