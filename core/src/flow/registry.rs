//! Type-keyed registry of pipelines.
//!
//! Each pipeline is stored under the `TypeId` of its context type, so callers
//! run a workflow just by handing over a context of the right type.

use super::context_data::ContextData;
use super::control::PipelineResult;
use super::definition::Pipeline;
use crate::error::FlowError;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, Level};

#[async_trait]
trait ErasedPipeline<AppErr>: Send + Sync
where
  AppErr: std::error::Error + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, AppErr>;
}

struct PipelineEntry<T, Err, AppErr>
where
  T: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: Arc<Pipeline<T, Err>>,
  _app_err: PhantomData<fn() -> AppErr>,
}

#[async_trait]
impl<T, Err, AppErr> ErasedPipeline<AppErr> for PipelineEntry<T, Err, AppErr>
where
  T: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
  AppErr: std::error::Error + From<Err> + From<FlowError> + Send + Sync + 'static,
{
  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, AppErr> {
    let typed = ctx.downcast::<ContextData<T>>().map_err(|_| {
      AppErr::from(FlowError::TypeMismatch {
        step_name: "registry_dispatch".to_string(),
        expected_type: std::any::type_name::<ContextData<T>>().to_string(),
      })
    })?;
    self.pipeline.run(*typed).await.map_err(AppErr::from)
  }
}

/// Registry returning `AppErr` from every run.
pub struct Registry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipelines: RwLock<HashMap<TypeId, Arc<dyn ErasedPipeline<AppErr>>>>,
}

impl<AppErr> Default for Registry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

impl<AppErr> Registry<AppErr>
where
  AppErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      pipelines: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `pipeline` for context type `T`, replacing any earlier one.
  pub fn register_pipeline<T, Err>(&self, pipeline: Pipeline<T, Err>)
  where
    T: Send + Sync + 'static,
    Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
    AppErr: From<Err>,
  {
    event!(Level::DEBUG, pipeline = %pipeline.name(), context_type = %std::any::type_name::<T>(), "Registering pipeline.");
    let entry = PipelineEntry::<T, Err, AppErr> {
      pipeline: Arc::new(pipeline),
      _app_err: PhantomData,
    };
    self.pipelines.write().insert(TypeId::of::<T>(), Arc::new(entry));
  }

  pub fn is_registered<T: Send + Sync + 'static>(&self) -> bool {
    self.pipelines.read().contains_key(&TypeId::of::<T>())
  }

  /// Runs the pipeline registered for `T`.
  pub async fn run<T>(&self, ctx: ContextData<T>) -> Result<PipelineResult, AppErr>
  where
    T: Send + Sync + 'static,
  {
    let entry = self.pipelines.read().get(&TypeId::of::<T>()).cloned();
    let entry = entry.ok_or_else(|| {
      let type_name = std::any::type_name::<T>();
      event!(Level::ERROR, context_type = %type_name, "No pipeline registered.");
      AppErr::from(FlowError::ConfigurationError {
        step_name: "Registry::run".to_string(),
        message: format!("no pipeline registered for context type {}", type_name),
      })
    })?;
    entry.run_erased(Box::new(ctx)).await
  }
}
