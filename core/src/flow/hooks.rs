//! Handler registration for the `before`, `on` and `after` phases.

use super::context_data::ContextData;
use super::control::PipelineControl;
use super::definition::{Handler, Pipeline};
use crate::error::FlowError;
use std::future::Future;

impl<T, Err> Pipeline<T, Err>
where
  T: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn wrap<F, E>(handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static) -> Handler<T, Err>
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    Box::new(move |ctx| {
      let fut = handler_fn(ctx);
      Box::pin(async move { fut.await.map_err(Into::into) })
    })
  }

  pub fn before_root<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self
      .before
      .entry(step_name.to_string())
      .or_default()
      .push(Self::wrap(handler_fn));
  }

  pub fn on_root<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self.on.entry(step_name.to_string()).or_default().push(Self::wrap(handler_fn));
  }

  pub fn after_root<F, E>(&mut self, step_name: &str, handler_fn: impl Fn(ContextData<T>) -> F + Send + Sync + 'static)
  where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + Sync + 'static,
  {
    self.ensure_step_exists(step_name);
    self.after.entry(step_name.to_string()).or_default().push(Self::wrap(handler_fn));
  }
}
