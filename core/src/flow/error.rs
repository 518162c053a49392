// orderflow/src/flow/error.rs
use thiserror::Error;

/// Failures raised by the pipeline engine itself, as opposed to a handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FlowError {
  #[error("Handler missing for non-optional step: {step_name}")]
  HandlerMissing { step_name: String },

  #[error("Step not found: {step_name}")]
  StepNotFound { step_name: String },
}
