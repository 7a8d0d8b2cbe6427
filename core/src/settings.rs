use crate::model::Amount;
use serde::{Deserialize, Serialize};

/// Business constants the pipeline reads at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSettings {
  /// Flat shipping charged on every order.
  pub shipping_cost: Amount,
  pub tax: Amount,
  pub currency: String,
  /// Smallest amount a seller may withdraw.
  pub min_payout: Amount,
  /// Where the transfer gateway should post completion events.
  pub transfer_callback_url: Option<String>,
}

impl Default for MarketSettings {
  fn default() -> Self {
    Self {
      shipping_cost: 1500,
      tax: 0,
      currency: "NGN".to_string(),
      min_payout: 1000,
      transfer_callback_url: None,
    }
  }
}
