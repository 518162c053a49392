// orderflow/src/flow/mod.rs

//! The named-step pipeline engine every fulfilment component is built on.

pub mod context_data;
pub mod control;
pub mod error;
pub mod pipeline;
pub mod step;

pub use context_data::ContextData;
pub use control::{PipelineControl, PipelineResult};
pub use error::FlowError;
pub use pipeline::{Handler, Pipeline};
pub use step::{SkipCondition, StepDef};
