//! `Pipeline::run`.

use super::context_data::ContextData;
use super::control::{PipelineControl, PipelineResult};
use super::definition::{Handler, Pipeline};
use super::step::StepDef;
use crate::error::FlowError;
use tracing::{event, instrument, Instrument, Level};

enum StepGate {
  Run,
  Skip,
  Missing,
}

enum PhaseOutcome<Err> {
  Continue,
  Stopped,
  Failed(Err),
}

impl<T, Err> Pipeline<T, Err>
where
  T: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  async fn run_phase(&self, phase: &'static str, handlers: Option<&Vec<Handler<T, Err>>>, ctx: &ContextData<T>) -> PhaseOutcome<Err> {
    let Some(handlers) = handlers else {
      return PhaseOutcome::Continue;
    };
    for (handler_idx, handler_fn) in handlers.iter().enumerate() {
      let span = tracing::span!(Level::DEBUG, "handler", phase, handler_index = handler_idx);
      match handler_fn(ctx.clone()).instrument(span).await {
        Ok(PipelineControl::Continue) => {}
        Ok(PipelineControl::Stop) => {
          event!(Level::INFO, phase, "Pipeline stopped by handler.");
          return PhaseOutcome::Stopped;
        }
        Err(e) => {
          event!(Level::WARN, phase, error = %e, "Handler failed.");
          return PhaseOutcome::Failed(e);
        }
      }
    }
    PhaseOutcome::Continue
  }

  fn gate_step(&self, step_def: &StepDef<T>, ctx: &ContextData<T>) -> StepGate {
    if let Some(skip_fn) = &step_def.skip_if {
      if skip_fn(ctx.clone()) {
        event!(Level::DEBUG, "Step skipped by condition.");
        return StepGate::Skip;
      }
    }

    let step_name = step_def.name.as_str();
    let has_handlers = [&self.before, &self.on, &self.after]
      .iter()
      .any(|phase| phase.get(step_name).is_some_and(|v| !v.is_empty()));
    if has_handlers {
      StepGate::Run
    } else if step_def.optional {
      event!(Level::DEBUG, "Optional step has no handlers, skipping.");
      StepGate::Skip
    } else {
      event!(Level::ERROR, "Required step has no handlers.");
      StepGate::Missing
    }
  }

  /// Runs every step in order against `ctx`.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(pipeline = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx: ContextData<T>) -> Result<PipelineResult, Err> {
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_name = step_def.name.as_str();
      let step_span = tracing::span!(Level::INFO, "step", step_name, step_index = step_idx);

      let gate = {
        let _entered = step_span.enter();
        self.gate_step(step_def, &ctx)
      };
      match gate {
        StepGate::Run => {}
        StepGate::Skip => continue,
        StepGate::Missing => {
          return Err(Err::from(FlowError::HandlerMissing {
            step_name: step_def.name.clone(),
          }))
        }
      }

      for (phase, handlers) in [
        ("before", self.before.get(step_name)),
        ("on", self.on.get(step_name)),
        ("after", self.after.get(step_name)),
      ] {
        match self.run_phase(phase, handlers, &ctx).instrument(step_span.clone()).await {
          PhaseOutcome::Continue => {}
          PhaseOutcome::Stopped => return Ok(PipelineResult::Stopped),
          PhaseOutcome::Failed(e) => return Err(e),
        }
      }
    }

    event!(Level::DEBUG, "Pipeline completed.");
    Ok(PipelineResult::Completed)
  }
}
