//! The `Pipeline<T, Err>` type and its structural construction.

use super::context_data::ContextData;
use super::control::PipelineControl;
use super::step::{SkipCondition, StepDef};
use crate::error::FlowError;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Boxed async handler for one phase of a step.
pub type Handler<T, Err> =
  Box<dyn Fn(ContextData<T>) -> Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>> + Send + Sync>;

/// Ordered, named steps over a context `T`; handlers fail with `Err`.
///
/// `Err` must absorb `FlowError` so configuration problems found while
/// running (a required step without handlers) surface as the caller's error.
pub struct Pipeline<T, Err>
where
  T: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub(crate) name: String,
  pub(crate) steps: Vec<StepDef<T>>,
  pub(crate) before: HashMap<String, Vec<Handler<T, Err>>>,
  pub(crate) on: HashMap<String, Vec<Handler<T, Err>>>,
  pub(crate) after: HashMap<String, Vec<Handler<T, Err>>>,
}

impl<T, Err> Pipeline<T, Err>
where
  T: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// `step_defs` entries are `(name, optional, skip_if)`.
  pub fn new(name: &str, step_defs: &[(&str, bool, Option<SkipCondition<T>>)]) -> Self {
    let steps = step_defs
      .iter()
      .map(|(step_name, optional, skip_if)| StepDef {
        name: (*step_name).to_string(),
        optional: *optional,
        skip_if: skip_if.clone(),
      })
      .collect();

    Self {
      name: name.to_string(),
      steps,
      before: HashMap::new(),
      on: HashMap::new(),
      after: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn step_names(&self) -> Vec<&str> {
    self.steps.iter().map(|s| s.name.as_str()).collect()
  }

  /// Panics on an unknown step: handlers are wired at startup, so a typo is a
  /// programming error rather than a runtime condition.
  pub(crate) fn ensure_step_exists(&self, step_name: &str) {
    if !self.steps.iter().any(|s| s.name == step_name) {
      panic!(
        "pipeline '{}': step '{}' is not defined",
        self.name, step_name
      );
    }
  }

  pub fn insert_after_step(
    &mut self,
    existing_step_name: &str,
    new_step_name: &str,
    optional: bool,
    skip_if: Option<SkipCondition<T>>,
  ) -> Result<(), FlowError> {
    let idx = self
      .steps
      .iter()
      .position(|s| s.name == existing_step_name)
      .ok_or_else(|| FlowError::StepNotFound {
        step_name: existing_step_name.to_string(),
      })?;
    if self.steps.iter().any(|s| s.name == new_step_name) {
      return Err(FlowError::ConfigurationError {
        step_name: new_step_name.to_string(),
        message: "step already defined".to_string(),
      });
    }
    self.steps.insert(
      idx + 1,
      StepDef {
        name: new_step_name.to_string(),
        optional,
        skip_if,
      },
    );
    Ok(())
  }

  pub fn remove_step(&mut self, step_name: &str) {
    if let Some(idx) = self.steps.iter().position(|s| s.name == step_name) {
      self.steps.remove(idx);
      self.before.remove(step_name);
      self.on.remove(step_name);
      self.after.remove(step_name);
    }
  }
}
