//! cwlgen - Programmatic CWL Workflow Builder
//!
//! Builds Common Workflow Language workflows from a library of existing step
//! documents (tools, expression tools and sub-workflows). Steps are wired
//! through symbolic references, and every wiring decision is type-checked
//! before the graph changes.
//!
//! # Architecture
//!
//! - [`library`]: step document loading and the template registry
//! - [`workflow`]: references, types, templates and the workflow graph
//! - [`serialize`]: rendering and saving in several link modes
//! - [`recipe`]: YAML recipes that replay graph operations
//! - [`error`]: error types for each failure domain
//!
//! # Example
//!
//! ```rust,no_run
//! use cwlgen::{InputSpec, LinkMode, StepBindings, WorkflowGraph};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut wf = WorkflowGraph::new();
//!     wf.load("cwl/tools")?;
//!
//!     let message = wf.add_input(InputSpec::new("wfmessage", "string"))?;
//!     let echoed = wf.instantiate("echo", StepBindings::new().bind("message", &message))?;
//!     wf.add_outputs([("out", echoed.into_vec().remove(0))])?;
//!
//!     wf.save("echo.cwl", LinkMode::Relative)?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod library;
pub mod recipe;
pub mod serialize;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{BuildError, LoadError, LoadFailureKind, RecipeError, ReferenceError, SaveError};
pub use library::loader::{DocumentLoader, FileLoader, LoadedDocument};
pub use library::{LoadEvent, LoadReport, StepSource, StepsLibrary, STEPS_PATH};
pub use recipe::{build_graph, from_graph, load_recipe, Recipe};
pub use serialize::{save, LinkMode, SaveOptions, Serializer};
pub use workflow::{
    Binding, CwlType, GraphScope, InputSpec, Reference, ScatterMethod, StepBindings, StepOutputs, StepTemplate,
    WorkflowGraph,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "cwlgen";
