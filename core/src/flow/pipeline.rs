// orderflow/src/flow/pipeline.rs

//! `Pipeline<TData, Err>`: named steps with `before`/`on`/`after` handlers,
//! executed in declaration order against a shared `ContextData<TData>`.

use super::context_data::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::error::FlowError;
use super::step::{SkipCondition, StepDef};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{event, instrument, span, Instrument, Level};

/// A boxed async step handler.
///
/// Handlers take a clone of the run's `ContextData`, must drop any lock guard
/// before awaiting, and return `Continue` or `Stop`.
pub type Handler<TData, Err> = Box<
  dyn Fn(ContextData<TData>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>
    + Send
    + Sync,
>;

#[derive(Clone, Copy, Debug)]
enum Phase {
  Before,
  On,
  After,
}

impl Phase {
  fn label(self) -> &'static str {
    match self {
      Phase::Before => "before",
      Phase::On => "on",
      Phase::After => "after",
    }
  }
}

pub struct Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  name: &'static str,
  steps: Vec<StepDef<TData>>,
  before: HashMap<String, Vec<Handler<TData, Err>>>,
  on: HashMap<String, Vec<Handler<TData, Err>>>,
  after: HashMap<String, Vec<Handler<TData, Err>>>,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: 'static + Send + Sync,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Creates a pipeline from `(step name, optional, skip condition)` triples.
  pub fn new(name: &'static str, step_defs: &[(&str, bool, Option<SkipCondition<TData>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step_name, optional, skip_if)| StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      name,
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  fn step_mut(&mut self, step_name: &str) -> Result<&mut StepDef<TData>, FlowError> {
    self
      .steps
      .iter_mut()
      .find(|s| s.name == step_name)
      .ok_or_else(|| FlowError::StepNotFound {
        step_name: step_name.to_string(),
      })
  }

  /// Panics on an unknown step name: that is a wiring bug, not a runtime condition.
  fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "pipeline '{}' setup error: step '{}' is not declared",
        self.name, step_name
      );
    }
  }

  pub fn set_skip_condition(
    &mut self,
    step_name: &str,
    skip_if: Option<SkipCondition<TData>>,
  ) -> Result<(), FlowError> {
    self.step_mut(step_name)?.skip_if = skip_if;
    Ok(())
  }

  pub fn set_optional(&mut self, step_name: &str, optional: bool) -> Result<(), FlowError> {
    self.step_mut(step_name)?.optional = optional;
    Ok(())
  }

  fn wrap<F, UserErr>(handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static) -> Handler<TData, Err>
  where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    Box::new(move |ctx_data| {
      let user_fut = handler_fn(ctx_data);
      Box::pin(async move { user_fut.await.map_err(Into::into) })
    })
  }

  pub fn before<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let handler = Self::wrap(handler_fn);
    self.before.entry(step_name.to_string()).or_default().push(handler);
  }

  pub fn on<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let handler = Self::wrap(handler_fn);
    self.on.entry(step_name.to_string()).or_default().push(handler);
  }

  pub fn after<F, UserErr>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, UserErr>> + Send + 'static,
    UserErr: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    let handler = Self::wrap(handler_fn);
    self.after.entry(step_name.to_string()).or_default().push(handler);
  }

  fn handlers(&self, phase: Phase, step_name: &str) -> Option<&Vec<Handler<TData, Err>>> {
    let map = match phase {
      Phase::Before => &self.before,
      Phase::On => &self.on,
      Phase::After => &self.after,
    };
    map.get(step_name).filter(|v| !v.is_empty())
  }

  /// Runs every handler of one phase. `Some(result)` means the run ends here.
  async fn run_phase(
    &self,
    phase: Phase,
    step_name: &str,
    ctx_data: &ContextData<TData>,
  ) -> Option<Result<PipelineResult, Err>> {
    let handlers = self.handlers(phase, step_name)?;
    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let handler_span = span!(Level::DEBUG, "handler", phase = phase.label(), handler_index = handler_idx);
      match handler_fn(ctx_data.clone()).instrument(handler_span).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => {
          event!(Level::INFO, step = step_name, phase = phase.label(), "Pipeline stopped by handler.");
          return Some(Ok(PipelineResult::Stopped));
        }
        Err(e) => {
          event!(Level::WARN, step = step_name, phase = phase.label(), error = %e, "Handler failed.");
          return Some(Err(e));
        }
      }
    }
    None
  }

  /// Executes all steps in order against `ctx_data`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(pipeline = self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = span!(Level::INFO, "pipeline_step", step_name, step_index = step_idx);

      let outcome = async {
        if step_def.should_skip(&ctx_data) {
          event!(Level::DEBUG, "Step skipped by its skip condition.");
          return None;
        }

        let has_any = [Phase::Before, Phase::On, Phase::After]
          .iter()
          .any(|phase| self.handlers(*phase, step_name).is_some());
        if !has_any {
          if step_def.optional {
            event!(Level::DEBUG, "Optional step has no handlers, skipping.");
            return None;
          }
          return Some(Err(Err::from(FlowError::HandlerMissing {
            step_name: step_name.to_string(),
          })));
        }

        for phase in [Phase::Before, Phase::On, Phase::After] {
          if let Some(done) = self.run_phase(phase, step_name, &ctx_data).await {
            return Some(done);
          }
        }
        None
      }
      .instrument(step_span)
      .await;

      if let Some(done) = outcome {
        return done;
      }
    }

    event!(Level::DEBUG, "Pipeline run completed.");
    Ok(PipelineResult::Completed)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  #[derive(Debug, thiserror::Error)]
  enum TestError {
    #[error("flow: {0}")]
    Flow(#[from] FlowError),
    #[error("handler: {0}")]
    Handler(String),
  }

  #[derive(Default)]
  struct Trace {
    steps: Vec<String>,
  }

  fn push(step: &'static str) -> impl Fn(ContextData<Trace>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, TestError>> + Send>> {
    move |ctx| {
      Box::pin(async move {
        ctx.write().steps.push(step.to_string());
        Ok(PipelineControl::Continue)
      })
    }
  }

  #[tokio::test]
  async fn runs_phases_in_order_and_honours_skip() {
    let mut p = Pipeline::<Trace, TestError>::new(
      "test",
      &[
        ("a", false, None),
        ("b", false, Some(Arc::new(|t: &Trace| t.steps.len() > 2))),
        ("c", false, None),
      ],
    );
    p.on("a", push("a.on"));
    p.before("a", push("a.before"));
    p.after("a", push("a.after"));
    p.on("b", push("b.on"));
    p.on("c", push("c.on"));

    let ctx = ContextData::new(Trace::default());
    let result = p.run(ctx.clone()).await.unwrap();
    assert_eq!(result, PipelineResult::Completed);
    assert_eq!(ctx.read().steps, vec!["a.before", "a.on", "a.after", "c.on"]);
  }

  #[tokio::test]
  async fn stop_and_error_end_the_run() {
    let mut p = Pipeline::<Trace, TestError>::new("test", &[("a", false, None), ("b", false, None)]);
    p.on("a", |_ctx: ContextData<Trace>| async { Ok::<_, TestError>(PipelineControl::Stop) });
    p.on("b", push("b.on"));
    let ctx = ContextData::new(Trace::default());
    assert_eq!(p.run(ctx.clone()).await.unwrap(), PipelineResult::Stopped);
    assert!(ctx.read().steps.is_empty());

    let mut p = Pipeline::<Trace, TestError>::new("test", &[("a", false, None), ("b", false, None)]);
    p.on("a", |_ctx: ContextData<Trace>| async { Err::<PipelineControl, _>(TestError::Handler("boom".into())) });
    p.on("b", push("b.on"));
    let ctx = ContextData::new(Trace::default());
    assert!(matches!(p.run(ctx.clone()).await, Err(TestError::Handler(m)) if m == "boom"));
    assert!(ctx.read().steps.is_empty());
  }

  #[tokio::test]
  async fn missing_handler_on_required_step_fails() {
    let mut p = Pipeline::<Trace, TestError>::new("test", &[("a", true, None), ("b", false, None)]);
    p.set_optional("a", true).unwrap();
    let err = p.run(ContextData::new(Trace::default())).await.unwrap_err();
    assert!(matches!(err, TestError::Flow(FlowError::HandlerMissing { step_name }) if step_name == "b"));
    assert!(p.set_skip_condition("nope", None).is_err());
  }
}
