use super::Amount;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seller {
  pub id: Uuid,
  /// Account that receives the seller's notifications.
  pub user_id: Uuid,
  pub store_name: String,
  /// Settled revenue, only ever incremented.
  pub total_sales: Amount,
  pub total_orders: i64,
}

impl Seller {
  pub fn new(user_id: Uuid, store_name: &str) -> Self {
    Self {
      id: Uuid::new_v4(),
      user_id,
      store_name: store_name.to_string(),
      total_sales: 0,
      total_orders: 0,
    }
  }
}

/// Ledger view re-derived from settled orders and payouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerBalance {
  /// Σ line totals of the seller's items across payment-completed orders.
  pub revenue: Amount,
  pub completed_payouts: Amount,
  /// PENDING and PROCESSING payouts; already promised to the seller.
  pub in_flight_payouts: Amount,
}

impl SellerBalance {
  /// What a new withdrawal may draw on.
  pub fn available(&self) -> Amount {
    self.revenue - self.completed_payouts - self.in_flight_payouts
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn in_flight_payouts_reduce_the_available_balance() {
    let balance = SellerBalance {
      revenue: 10_000,
      completed_payouts: 2_500,
      in_flight_payouts: 1_500,
    };
    assert_eq!(balance.available(), 6_000);
  }
}
