//! Workflow Definition Module
//!
//! Data structures for wiring step templates into a workflow and checking
//! that the wiring is type-correct.
//!
//! # Structure
//!
//! - [`reference`]: symbolic references to workflow inputs and step outputs
//! - [`types`]: CWL type values and the compatibility rule
//! - [`model`]: step templates, step occurrences and scatter settings
//! - [`validator`]: binding, scatter and round-trip checks
//! - [`graph`]: the workflow graph builder

pub mod graph;
pub mod model;
pub mod reference;
pub mod types;
pub mod validator;

pub use graph::{GraphScope, InputSpec, Requirements, WorkflowGraph, WorkflowOutput};
pub use model::{
    Binding, InputPort, OutputPort, Scatter, ScatterMethod, StepBindings, StepClass, StepInstance, StepOutputs,
    StepTemplate, TemplateLocation,
};
pub use reference::Reference;
pub use types::CwlType;
