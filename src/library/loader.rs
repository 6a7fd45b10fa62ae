//! Step Document Loading
//!
//! Reads step documents from disk (or, with the `remote` feature, from
//! http(s) URLs), checks their structure and classifies them.
//!
//! Composite workflows have their nested `run:` links resolved relative to
//! the including document and inlined, so every loaded body is
//! self-contained.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;
use serde_yaml::Value;
use url::Url;

use crate::error::LoadError;
use crate::workflow::model::{StepClass, TemplateLocation};

/// Nesting limit for inlined sub-workflows.
pub const MAX_NESTING_DEPTH: usize = 16;

/// A parsed, structurally valid step document.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub location: TemplateLocation,
    pub document: Value,
    pub class: StepClass,
}

/// Fetches, parses and classifies step documents.
pub trait DocumentLoader {
    fn load(&self, location: &str) -> Result<LoadedDocument, LoadError>;
}

/// Default loader for local files and URLs.
#[derive(Debug, Clone, Default)]
pub struct FileLoader;

impl FileLoader {
    pub fn new() -> Self {
        Self
    }

    fn load_location(&self, location: TemplateLocation, depth: usize) -> Result<LoadedDocument, LoadError> {
        let where_ = location.to_string();
        if depth > MAX_NESTING_DEPTH {
            return Err(LoadError::validation(
                &where_,
                "sub-workflows are nested too deeply (recursive run links?)",
            ));
        }

        let text = read_location(&location)?;
        debug!("Read {} ({} bytes)", where_, text.len());

        let mut document = parse_document(&text, &location)?;
        let class = classify(&document).map_err(|e| e.into_load_error(&where_))?;

        if class == StepClass::Workflow {
            self.inline_runs(&mut document, &location, depth)?;
        }

        Ok(LoadedDocument {
            location,
            document,
            class,
        })
    }

    /// Replaces every nested `run: <link>` with the linked document.
    fn inline_runs(&self, document: &mut Value, base: &TemplateLocation, depth: usize) -> Result<(), LoadError> {
        let where_ = base.to_string();
        let steps = match document.get_mut("steps") {
            Some(Value::Sequence(steps)) => steps.iter_mut().collect::<Vec<_>>(),
            Some(Value::Mapping(steps)) => steps.values_mut().collect::<Vec<_>>(),
            _ => return Ok(()),
        };

        for step in steps {
            let Some(run) = step.get_mut("run") else {
                return Err(LoadError::validation(&where_, "a nested step has no 'run'"));
            };

            if let Some(link) = run.as_str() {
                let target = resolve_link(base, link)
                    .map_err(|message| LoadError::validation(&where_, message))?;
                debug!("Inlining {} into {}", target, where_);
                let nested = self.load_location(target, depth + 1)?;
                *run = nested.document;
            } else if run.is_mapping() {
                let class = classify(run).map_err(|e| e.into_load_error(&where_))?;
                if class == StepClass::Workflow {
                    self.inline_runs(run, base, depth + 1)?;
                }
            } else {
                return Err(LoadError::validation(
                    &where_,
                    "'run' must be a link or an embedded document",
                ));
            }
        }

        Ok(())
    }
}

impl DocumentLoader for FileLoader {
    fn load(&self, location: &str) -> Result<LoadedDocument, LoadError> {
        let location = parse_location(location)?;
        self.load_location(location, 0)
    }
}

/// True for `http://` and `https://` locations.
pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Turns a user-supplied path or URL into an absolute location.
pub fn parse_location(location: &str) -> Result<TemplateLocation, LoadError> {
    if is_url(location) {
        let url = Url::parse(location).map_err(|e| LoadError::validation(location, e.to_string()))?;
        return Ok(TemplateLocation::Remote(url));
    }

    let path = PathBuf::from(location.strip_prefix("file://").unwrap_or(location));
    let absolute = if path.is_absolute() {
        path
    } else {
        let cwd = std::env::current_dir().map_err(|source| LoadError::Io {
            location: location.to_string(),
            source,
        })?;
        cwd.join(path)
    };
    Ok(TemplateLocation::Local(normalize(&absolute)))
}

fn resolve_link(base: &TemplateLocation, link: &str) -> Result<TemplateLocation, String> {
    if is_url(link) {
        return Url::parse(link).map(TemplateLocation::Remote).map_err(|e| e.to_string());
    }

    let link = link.strip_prefix("file://").unwrap_or(link);
    match base {
        TemplateLocation::Local(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("/"));
            Ok(TemplateLocation::Local(normalize(&dir.join(link))))
        }
        TemplateLocation::Remote(url) => url
            .join(link)
            .map(TemplateLocation::Remote)
            .map_err(|e| e.to_string()),
    }
}

/// Folds `.` and `..` components without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn read_location(location: &TemplateLocation) -> Result<String, LoadError> {
    match location {
        TemplateLocation::Local(path) => fs::read_to_string(path).map_err(|source| LoadError::Io {
            location: path.display().to_string(),
            source,
        }),
        TemplateLocation::Remote(url) => fetch(url),
    }
}

#[cfg(feature = "remote")]
fn fetch(url: &Url) -> Result<String, LoadError> {
    let fail = |e: reqwest::Error| LoadError::Fetch {
        location: url.to_string(),
        message: e.to_string(),
    };
    reqwest::blocking::get(url.as_str())
        .and_then(|response| response.error_for_status())
        .and_then(|response| response.text())
        .map_err(fail)
}

#[cfg(not(feature = "remote"))]
fn fetch(url: &Url) -> Result<String, LoadError> {
    Err(LoadError::Fetch {
        location: url.to_string(),
        message: "remote step documents need the 'remote' feature".to_string(),
    })
}

fn parse_document(text: &str, location: &TemplateLocation) -> Result<Value, LoadError> {
    let where_ = location.to_string();
    let is_json = match location {
        TemplateLocation::Local(path) => path.extension().and_then(|e| e.to_str()) == Some("json"),
        TemplateLocation::Remote(url) => url.path().ends_with(".json"),
    };

    if is_json {
        let json: serde_json::Value =
            serde_json::from_str(text).map_err(|e| LoadError::validation(&where_, e.to_string()))?;
        serde_yaml::to_value(json).map_err(|e| LoadError::validation(&where_, e.to_string()))
    } else {
        serde_yaml::from_str(text).map_err(|e| LoadError::validation(&where_, e.to_string()))
    }
}

/// Why a document cannot be used as a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    Packed,
    Unsupported(String),
    Invalid(String),
}

impl ClassifyError {
    fn into_load_error(self, location: &str) -> LoadError {
        match self {
            Self::Packed => LoadError::Packed {
                location: location.to_string(),
            },
            Self::Unsupported(reason) => LoadError::Unsupported {
                location: location.to_string(),
                reason,
            },
            Self::Invalid(message) => LoadError::validation(location, message),
        }
    }
}

/// Checks the structure of a step document and returns its class.
pub fn classify(document: &Value) -> Result<StepClass, ClassifyError> {
    let map = match document {
        Value::Sequence(_) => return Err(ClassifyError::Packed),
        Value::Mapping(map) => map,
        _ => return Err(ClassifyError::Invalid("document is not a mapping".to_string())),
    };

    if map.contains_key("$graph") {
        return Err(ClassifyError::Packed);
    }

    let class = match map.get("class") {
        Some(Value::String(class)) => class
            .parse::<StepClass>()
            .map_err(ClassifyError::Unsupported)?,
        Some(_) => return Err(ClassifyError::Invalid("'class' must be a string".to_string())),
        None => return Err(ClassifyError::Invalid("missing 'class'".to_string())),
    };

    for section in ["inputs", "outputs"] {
        check_port_section(map.get(section), section)?;
    }

    if class == StepClass::Workflow {
        match map.get("steps") {
            Some(Value::Sequence(_)) | Some(Value::Mapping(_)) => {}
            _ => return Err(ClassifyError::Invalid("a workflow needs 'steps'".to_string())),
        }
    }

    Ok(class)
}

fn check_port_section(section: Option<&Value>, name: &str) -> Result<(), ClassifyError> {
    match section {
        Some(Value::Mapping(_)) => Ok(()),
        Some(Value::Sequence(entries)) => {
            if entries.iter().all(|e| e.get("id").map(Value::is_string).unwrap_or(false)) {
                Ok(())
            } else {
                Err(ClassifyError::Invalid(format!("every entry in '{}' needs an id", name)))
            }
        }
        Some(_) => Err(ClassifyError::Invalid(format!(
            "'{}' must be a list or a mapping",
            name
        ))),
        None => Err(ClassifyError::Invalid(format!("missing '{}'", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadFailureKind;
    use crate::testing::{write_fixtures, ECHO};

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    #[test]
    fn test_classify_tool() {
        assert_eq!(classify(&yaml(ECHO)), Ok(StepClass::CommandLineTool));
    }

    #[test]
    fn test_classify_packed() {
        assert_eq!(
            classify(&yaml("$graph: []\ncwlVersion: v1.0")),
            Err(ClassifyError::Packed)
        );
        assert_eq!(classify(&yaml("- class: Workflow")), Err(ClassifyError::Packed));
    }

    #[test]
    fn test_classify_unsupported_class() {
        let result = classify(&yaml("class: Operation\ninputs: []\noutputs: []"));
        assert!(matches!(result, Err(ClassifyError::Unsupported(_))));
    }

    #[test]
    fn test_classify_missing_sections() {
        assert!(matches!(
            classify(&yaml("class: CommandLineTool\ninputs: []")),
            Err(ClassifyError::Invalid(_))
        ));
        assert!(matches!(
            classify(&yaml("class: Workflow\ninputs: []\noutputs: []")),
            Err(ClassifyError::Invalid(_))
        ));
        assert!(matches!(
            classify(&yaml("class: CommandLineTool\ninputs: [{type: string}]\noutputs: []")),
            Err(ClassifyError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_validation_error() {
        let err = FileLoader::new().load("/nonexistent/idontexist.cwl").unwrap_err();
        assert_eq!(err.kind(), LoadFailureKind::Validation);
    }

    #[test]
    fn test_load_inlines_nested_runs() {
        let dir = write_fixtures();
        let path = dir.path().join("workflows").join("echo-wc.cwl");
        let loaded = FileLoader::new().load(path.to_str().unwrap()).unwrap();

        assert_eq!(loaded.class, StepClass::Workflow);
        let echo_run = &loaded.document["steps"]["echo"]["run"];
        assert_eq!(echo_run["class"].as_str(), Some("CommandLineTool"));
    }

    #[test]
    fn test_load_json_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("noop.json");
        fs::write(
            &path,
            r#"{"class": "ExpressionTool", "inputs": [], "outputs": [], "expression": "${return {};}"}"#,
        )
        .unwrap();

        let loaded = FileLoader::new().load(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.class, StepClass::ExpressionTool);
    }

    #[test]
    fn test_recursive_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loop.cwl");
        fs::write(
            &path,
            "class: Workflow\ninputs: []\noutputs: []\nsteps:\n  again:\n    run: loop.cwl\n    in: {}\n    out: []\n",
        )
        .unwrap();

        let err = FileLoader::new().load(path.to_str().unwrap()).unwrap_err();
        assert_eq!(err.kind(), LoadFailureKind::Validation);
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://www.esciencecenter.nl/"));
        assert!(is_url("http://www.esciencecenter.nl/"));
        assert!(!is_url("file:///home/xxx/cwl-working-dir/test/cwl"));
    }

    #[test]
    fn test_resolve_link_relative_to_document() {
        let base = TemplateLocation::Local(PathBuf::from("/data/workflows/echo-wc.cwl"));
        assert_eq!(
            resolve_link(&base, "../tools/echo.cwl").unwrap(),
            TemplateLocation::Local(PathBuf::from("/data/tools/echo.cwl"))
        );

        let remote = TemplateLocation::Remote(Url::parse("https://example.org/cwl/wf.cwl").unwrap());
        assert_eq!(
            resolve_link(&remote, "tool.cwl").unwrap(),
            TemplateLocation::Remote(Url::parse("https://example.org/cwl/tool.cwl").unwrap())
        );
    }
}
