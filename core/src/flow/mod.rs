//! Step-pipeline engine used by every settlement workflow.
//!
//! A pipeline is an ordered list of named steps over a shared, lockable
//! context (`ContextData<T>`). Each step may carry `before`, `on` and `after`
//! handlers; a handler either lets the run continue or stops it early.

pub mod context_data;
pub mod control;
pub mod definition;
pub mod execution;
pub mod hooks;
pub mod registry;
pub mod step;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use definition::{Handler, Pipeline};
pub use registry::Registry;
pub use step::{SkipCondition, StepDef};
