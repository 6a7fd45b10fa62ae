//! Steps Library
//!
//! The registry of step templates a workflow graph can instantiate.
//!
//! Loading is batch-tolerant: every file is attempted, and each outcome
//! (loaded, skipped, rejected or failed) is returned in a [`LoadReport`]
//! instead of aborting on the first bad document.
//!
//! # Example
//!
//! ```no_run
//! use cwlgen::StepsLibrary;
//!
//! let mut library = StepsLibrary::new();
//! let report = library.load("cwl/tools");
//! for warning in report.warnings() {
//!     eprintln!("{}", warning);
//! }
//! println!("{}", library.list_steps());
//! ```

pub mod loader;

use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use log::{debug, info};
use once_cell::sync::Lazy;

use crate::error::LoadError;
use crate::workflow::model::StepTemplate;
use loader::{is_url, DocumentLoader, FileLoader};

/// Extra library sources from `CWLGEN_STEPS_PATH`.
pub static STEPS_PATH: Lazy<Vec<PathBuf>> = Lazy::new(|| {
    env::var_os("CWLGEN_STEPS_PATH")
        .map(|value| env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
        .unwrap_or_default()
});

/// What to load: every `*.cwl` in a directory, one document, or a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepSource {
    Directory(PathBuf),
    File(String),
    List(Vec<String>),
}

impl StepSource {
    /// Document locations to load, plus directory entries that could not be read.
    fn locations(&self) -> Result<(Vec<String>, Vec<LoadError>), LoadError> {
        match self {
            Self::Directory(dir) => {
                let pattern = format!(
                    "{}/*.cwl",
                    glob::Pattern::escape(&dir.to_string_lossy())
                );
                let paths = glob::glob(&pattern).map_err(|e| {
                    LoadError::validation(dir.display().to_string(), e.to_string())
                })?;

                Ok(split_entries(paths.map(|entry| entry.map_err(unreadable_entry))))
            }
            Self::File(location) => Ok((vec![location.clone()], Vec::new())),
            Self::List(locations) => Ok((locations.clone(), Vec::new())),
        }
    }
}

fn unreadable_entry(err: glob::GlobError) -> LoadError {
    LoadError::Io {
        location: err.path().display().to_string(),
        source: err.into(),
    }
}

/// Sorted readable paths; unreadable entries are kept as failures.
fn split_entries<I>(entries: I) -> (Vec<String>, Vec<LoadError>)
where
    I: IntoIterator<Item = Result<PathBuf, LoadError>>,
{
    let mut found = Vec::new();
    let mut failed = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) => found.push(path.to_string_lossy().into_owned()),
            Err(err) => failed.push(err),
        }
    }
    found.sort();
    (found, failed)
}

impl From<&Path> for StepSource {
    fn from(path: &Path) -> Self {
        if path.is_dir() {
            Self::Directory(path.to_path_buf())
        } else {
            Self::File(path.to_string_lossy().into_owned())
        }
    }
}

impl From<PathBuf> for StepSource {
    fn from(path: PathBuf) -> Self {
        Self::from(path.as_path())
    }
}

impl From<&str> for StepSource {
    fn from(location: &str) -> Self {
        if is_url(location) {
            Self::File(location.to_string())
        } else {
            Self::from(Path::new(location))
        }
    }
}

impl From<Vec<String>> for StepSource {
    fn from(locations: Vec<String>) -> Self {
        Self::List(locations)
    }
}

impl From<&[&str]> for StepSource {
    fn from(locations: &[&str]) -> Self {
        Self::List(locations.iter().map(|s| s.to_string()).collect())
    }
}

/// Result of offering a template to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    /// A template with the same name is already registered; it is kept.
    DuplicateName,
    /// The alias is already used by `existing`; the new template is rejected.
    AliasCollision { existing: String },
}

/// What happened to one document during [`StepsLibrary::load`].
#[derive(Debug)]
pub enum LoadEvent {
    Loaded {
        name: String,
        location: String,
    },
    DuplicateName {
        name: String,
        location: String,
    },
    AliasCollision {
        name: String,
        alias: String,
        existing: String,
        location: String,
    },
    Failed(LoadError),
}

impl LoadEvent {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded { .. })
    }
}

impl fmt::Display for LoadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded { name, location } => write!(f, "Loaded '{}' from {}", name, location),
            Self::DuplicateName { name, location } => write!(
                f,
                "Step '{}' from {} is already loaded; keeping the first one",
                name, location
            ),
            Self::AliasCollision {
                name,
                alias,
                existing,
                location,
            } => write!(
                f,
                "Step '{}' from {} is not loaded: its alias '{}' is already used by '{}'",
                name, location, alias, existing
            ),
            Self::Failed(err) => write!(f, "{} ({})", err, err.kind()),
        }
    }
}

/// Outcome of a batch load, in the order the documents were attempted.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub events: Vec<LoadEvent>,
}

impl LoadReport {
    /// Names of the templates that were registered.
    pub fn loaded(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                LoadEvent::Loaded { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Registry-level events: duplicate names and alias collisions.
    pub fn warnings(&self) -> impl Iterator<Item = &LoadEvent> {
        self.events.iter().filter(|e| {
            matches!(
                e,
                LoadEvent::DuplicateName { .. } | LoadEvent::AliasCollision { .. }
            )
        })
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadError> {
        self.events.iter().filter_map(|e| match e {
            LoadEvent::Failed(err) => Some(err),
            _ => None,
        })
    }

    pub fn is_clean(&self) -> bool {
        self.events.iter().all(LoadEvent::is_loaded)
    }

    pub fn extend(&mut self, other: LoadReport) {
        self.events.extend(other.events);
    }
}

/// Registry of step templates, keyed by name.
pub struct StepsLibrary {
    templates: IndexMap<String, Arc<StepTemplate>>,
    aliases: HashMap<String, String>,
    reserved: HashSet<String>,
    loader: Box<dyn DocumentLoader>,
}

impl fmt::Debug for StepsLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepsLibrary")
            .field("templates", &self.templates.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for StepsLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl StepsLibrary {
    pub fn new() -> Self {
        Self::with_loader(FileLoader::new())
    }

    pub fn with_loader(loader: impl DocumentLoader + 'static) -> Self {
        Self {
            templates: IndexMap::new(),
            aliases: HashMap::new(),
            reserved: HashSet::new(),
            loader: Box::new(loader),
        }
    }

    pub fn loader(&self) -> &dyn DocumentLoader {
        self.loader.as_ref()
    }

    /// Loads every document of `source`, continuing past failures.
    pub fn load(&mut self, source: impl Into<StepSource>) -> LoadReport {
        let source = source.into();
        let mut report = LoadReport::default();

        let (locations, unreadable) = match source.locations() {
            Ok(located) => located,
            Err(err) => {
                report.events.push(LoadEvent::Failed(err));
                return report;
            }
        };
        for err in unreadable {
            let event = LoadEvent::Failed(err);
            debug!("{}", event);
            report.events.push(event);
        }

        for location in locations {
            let event = self.load_one(&location);
            debug!("{}", event);
            report.events.push(event);
        }

        info!(
            "Loaded {} of {} step document(s)",
            report.loaded().len(),
            report.events.len()
        );
        report
    }

    fn load_one(&mut self, location: &str) -> LoadEvent {
        let template = match self
            .loader
            .load(location)
            .and_then(StepTemplate::from_loaded)
        {
            Ok(template) => template,
            Err(err) => return LoadEvent::Failed(err),
        };

        let name = template.name().to_string();
        let alias = template.alias().to_string();
        let location = template.location().to_string();

        match self.register(template) {
            RegisterOutcome::Registered => LoadEvent::Loaded { name, location },
            RegisterOutcome::DuplicateName => LoadEvent::DuplicateName { name, location },
            RegisterOutcome::AliasCollision { existing } => LoadEvent::AliasCollision {
                name,
                alias,
                existing,
                location,
            },
        }
    }

    /// Adds a template. The first registration of a name wins; a template
    /// whose alias belongs to a different template is rejected.
    pub fn register(&mut self, template: StepTemplate) -> RegisterOutcome {
        if self.templates.contains_key(template.name()) {
            return RegisterOutcome::DuplicateName;
        }
        if let Some(existing) = self.aliases.get(template.alias()) {
            return RegisterOutcome::AliasCollision {
                existing: existing.clone(),
            };
        }

        self.reserved
            .extend(template.nested_step_ids().iter().cloned());
        self.aliases
            .insert(template.alias().to_string(), template.name().to_string());
        self.templates
            .insert(template.name().to_string(), Arc::new(template));
        RegisterOutcome::Registered
    }

    /// Looks a template up by name, then by alias.
    pub fn get(&self, name: &str) -> Option<Arc<StepTemplate>> {
        self.templates
            .get(name)
            .or_else(|| {
                self.aliases
                    .get(name)
                    .and_then(|real| self.templates.get(real))
            })
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn templates(&self) -> impl Iterator<Item = &Arc<StepTemplate>> {
        self.templates.values()
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Step ids used inside loaded sub-workflows.
    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// One signature line per template, sorted by name.
    pub fn list_steps(&self) -> String {
        let mut names: Vec<_> = self.templates.keys().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| self.templates[name].signature())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoadFailureKind;
    use crate::testing::write_fixtures;
    use std::fs;

    fn sorted_names(library: &StepsLibrary) -> Vec<&str> {
        let mut names: Vec<_> = library.names().collect();
        names.sort();
        names
    }

    #[test]
    fn test_load_directory() {
        let dir = write_fixtures();
        let mut library = StepsLibrary::new();
        let report = library.load(dir.path().join("tools"));

        assert!(report.is_clean());
        assert_eq!(sorted_names(&library), vec!["echo", "multiple-out-args", "wc"]);
    }

    #[test]
    fn test_load_list() {
        let dir = write_fixtures();
        let locations = vec![
            dir.path().join("workflows/echo-wc.cwl"),
            dir.path().join("tools/echo.cwl"),
            dir.path().join("tools/wc.cwl"),
            dir.path().join("tools/multiple-out-args.cwl"),
        ]
        .into_iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect::<Vec<_>>();

        let mut library = StepsLibrary::new();
        let report = library.load(locations);

        assert_eq!(report.loaded().len(), 4);
        assert_eq!(
            sorted_names(&library),
            vec!["echo", "echo-wc", "multiple-out-args", "wc"]
        );
        assert!(library.is_reserved("echo"));
        assert!(library.get("echo_wc").unwrap().is_composite());
    }

    #[test]
    fn test_unreadable_entry_does_not_block_the_directory() {
        let entries = vec![
            Ok(PathBuf::from("/steps/wc.cwl")),
            Err(LoadError::Io {
                location: "/steps/locked.cwl".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            }),
            Ok(PathBuf::from("/steps/echo.cwl")),
        ];

        let (found, failed) = split_entries(entries);
        assert_eq!(found, vec!["/steps/echo.cwl", "/steps/wc.cwl"]);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].location(), "/steps/locked.cwl");
    }

    #[test]
    fn test_bad_file_does_not_block_the_batch() {
        let dir = write_fixtures();
        let tools = dir.path().join("tools");
        fs::write(tools.join("broken.cwl"), "class: CommandLineTool\ninputs: []\n").unwrap();
        fs::write(tools.join("packed.cwl"), "cwlVersion: v1.0\n$graph: []\n").unwrap();

        let mut library = StepsLibrary::new();
        let report = library.load(tools);

        assert_eq!(library.len(), 3);
        let kinds: Vec<_> = report.failures().map(LoadError::kind).collect();
        assert_eq!(
            kinds,
            vec![LoadFailureKind::Validation, LoadFailureKind::Unsupported]
        );
        assert!(!report.is_clean());
    }

    #[test]
    fn test_duplicate_name_keeps_first() {
        let dir = write_fixtures();
        let echo = dir.path().join("tools/echo.cwl");
        let other = dir.path().join("workflows/echo.cwl");
        fs::write(&other, crate::testing::WC.replace("wced", "other")).unwrap();

        let mut library = StepsLibrary::new();
        library.load(echo.as_path());
        let report = library.load(other.as_path());

        assert_eq!(report.warnings().count(), 1);
        let template = library.get("echo").unwrap();
        assert!(template.input("message").is_some());
    }

    #[test]
    fn test_alias_collision_rejects_second() {
        let dir = write_fixtures();
        let dashed = dir.path().join("tools/count-words.cwl");
        let underscored = dir.path().join("workflows/count_words.cwl");
        fs::write(&dashed, crate::testing::WC).unwrap();
        fs::write(&underscored, crate::testing::WC).unwrap();

        let mut library = StepsLibrary::new();
        library.load(dashed.as_path());
        let report = library.load(underscored.as_path());

        assert!(matches!(
            report.warnings().next(),
            Some(LoadEvent::AliasCollision { existing, .. }) if existing == "count-words"
        ));
        assert!(!library.names().any(|n| n == "count_words"));
        assert_eq!(library.get("count_words").unwrap().name(), "count-words");
    }

    #[test]
    fn test_list_steps() {
        let dir = write_fixtures();
        let mut library = StepsLibrary::new();
        library.load(dir.path().join("tools"));

        let listing = library.list_steps();
        let lines: Vec<_> = listing.lines().collect();
        assert_eq!(lines[0], "echo(message) -> echoed");
        assert_eq!(
            lines[1],
            "multiple-out-args(in-files[, out_dir, counselors]) -> out-files, meta-out"
        );
        assert_eq!(lines[2], "wc(file2count) -> wced");
    }

    #[test]
    fn test_missing_directory_reports_nothing_loaded() {
        let mut library = StepsLibrary::new();
        let report = library.load(StepSource::Directory(PathBuf::from("/nonexistent/steps")));
        assert!(report.loaded().is_empty());
        assert!(library.is_empty());
    }
}
