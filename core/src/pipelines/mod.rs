//! The settlement workflows, each a `flow::Pipeline` over its own context.

use crate::error::MarketError;
use crate::flow::Registry;

pub mod common_steps;
pub mod contexts;
pub mod order_pipeline;
pub mod payment_pipeline;
pub mod payout_pipeline;
pub mod settlement_pipeline;

/// Registers every pipeline the marketplace runs. Called once at startup.
pub fn register_all_pipelines(registry: &Registry<MarketError>) {
  tracing::debug!("Registering settlement pipelines...");

  order_pipeline::register_place_order_pipeline(registry);
  payment_pipeline::register_initialize_payment_pipeline(registry);
  settlement_pipeline::register_settlement_pipeline(registry);
  payout_pipeline::register_payout_pipeline(registry);
  payout_pipeline::register_transfer_update_pipeline(registry);

  tracing::debug!("All settlement pipelines registered.");
}
