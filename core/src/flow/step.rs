use super::ContextData;
use std::sync::Arc;

/// Predicate evaluated right before a step; `true` skips the step.
pub type SkipCondition<T> = Arc<dyn Fn(ContextData<T>) -> bool + Send + Sync + 'static>;

#[derive(Clone)]
pub struct StepDef<T: Send + Sync + 'static> {
  pub name: String,
  /// Optional steps without handlers are skipped instead of failing the run.
  pub optional: bool,
  pub skip_if: Option<SkipCondition<T>>,
}

impl<T: Send + Sync + 'static> std::fmt::Debug for StepDef<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepDef")
      .field("name", &self.name)
      .field("optional", &self.optional)
      .field("skip_if_present", &self.skip_if.is_some())
      .finish()
  }
}

/// Builds a `SkipCondition` from a plain closure.
pub fn skip_when<T, F>(f: F) -> Option<SkipCondition<T>>
where
  T: Send + Sync + 'static,
  F: Fn(ContextData<T>) -> bool + Send + Sync + 'static,
{
  Some(Arc::new(f))
}
