//! Ledger accrual and balance derivation.
//!
//! `AccrualPlan` is computed from a frozen order and handed to the store,
//! which applies it inside the same unit that flips payment to COMPLETED.

use crate::model::{
  Amount, NewNotification, NotificationKind, Order, PaymentStatus, PayoutStatus, SellerBalance, SellerPayout,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockDecrement {
  pub product_id: Uuid,
  pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditLine {
  pub product_name: String,
  pub quantity: i32,
}

/// Everything one seller earns from one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerCredit {
  pub seller_id: Uuid,
  pub revenue: Amount,
  pub lines: Vec<CreditLine>,
}

impl SellerCredit {
  /// The single aggregated "new order" notice for this seller.
  pub fn notification(&self, seller_user_id: Uuid, order_id: Uuid, currency: &str) -> NewNotification {
    let listing = self
      .lines
      .iter()
      .map(|line| format!("{} x{}", line.product_name, line.quantity))
      .collect::<Vec<_>>()
      .join(", ");
    NewNotification::new(
      seller_user_id,
      NotificationKind::NewOrder,
      "New order received",
      format!("Order {} includes {} ({} {}).", order_id, listing, self.revenue, currency),
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccrualPlan {
  pub order_id: Uuid,
  pub currency: String,
  /// One entry per product, quantities summed across variants.
  pub stock: Vec<StockDecrement>,
  /// One entry per seller, in first-seen item order.
  pub sellers: Vec<SellerCredit>,
}

impl AccrualPlan {
  pub fn for_order(order: &Order) -> Self {
    let mut stock: Vec<StockDecrement> = Vec::new();
    let mut sellers: Vec<SellerCredit> = Vec::new();

    for item in &order.items {
      match stock.iter_mut().find(|s| s.product_id == item.product_id) {
        Some(entry) => entry.quantity += item.quantity,
        None => stock.push(StockDecrement {
          product_id: item.product_id,
          quantity: item.quantity,
        }),
      }

      let line = CreditLine {
        product_name: item.product_name.clone(),
        quantity: item.quantity,
      };
      match sellers.iter_mut().find(|c| c.seller_id == item.seller_id) {
        Some(credit) => {
          credit.revenue += item.line_total();
          credit.lines.push(line);
        }
        None => sellers.push(SellerCredit {
          seller_id: item.seller_id,
          revenue: item.line_total(),
          lines: vec![line],
        }),
      }
    }

    Self {
      order_id: order.id,
      currency: order.currency.clone(),
      stock,
      sellers,
    }
  }

  pub fn product_ids(&self) -> impl Iterator<Item = Uuid> + '_ {
    self.stock.iter().map(|s| s.product_id)
  }

  pub fn total_revenue(&self) -> Amount {
    self.sellers.iter().map(|c| c.revenue).sum()
  }
}

/// Revenue attributable to `seller_id` across payment-completed orders.
pub fn seller_revenue<'a>(orders: impl IntoIterator<Item = &'a Order>, seller_id: Uuid) -> Amount {
  orders
    .into_iter()
    .filter(|order| order.payment_status == PaymentStatus::Completed)
    .flat_map(|order| order.items.iter())
    .filter(|item| item.seller_id == seller_id)
    .map(|item| item.line_total())
    .sum()
}

/// Re-derives a seller's balance from settled orders and their payouts.
pub fn derive_balance<'a>(
  orders: impl IntoIterator<Item = &'a Order>,
  payouts: impl IntoIterator<Item = &'a SellerPayout>,
  seller_id: Uuid,
) -> SellerBalance {
  let mut balance = SellerBalance {
    revenue: seller_revenue(orders, seller_id),
    completed_payouts: 0,
    in_flight_payouts: 0,
  };
  for payout in payouts.into_iter().filter(|p| p.seller_id == seller_id) {
    match payout.status {
      PayoutStatus::Completed => balance.completed_payouts += payout.amount,
      PayoutStatus::Pending | PayoutStatus::Processing => balance.in_flight_payouts += payout.amount,
      PayoutStatus::Failed => {}
    }
  }
  balance
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{OrderItem, OrderOwner, OrderStatus, PayoutMethod};
  use chrono::Utc;

  fn item(order_id: Uuid, seller_id: Uuid, product_id: Uuid, name: &str, quantity: i32, unit_price: Amount) -> OrderItem {
    OrderItem {
      id: Uuid::new_v4(),
      order_id,
      product_id,
      variant_id: None,
      seller_id,
      product_name: name.to_string(),
      quantity,
      unit_price,
    }
  }

  fn order(items: impl FnOnce(Uuid) -> Vec<OrderItem>, payment_status: PaymentStatus) -> Order {
    let id = Uuid::new_v4();
    let items = items(id);
    let subtotal: Amount = items.iter().map(OrderItem::line_total).sum();
    Order {
      id,
      owner: OrderOwner::Authenticated {
        user_id: Uuid::new_v4(),
        shipping_address: None,
      },
      items,
      subtotal,
      discount: 0,
      shipping_cost: 1500,
      tax: 0,
      total: subtotal + 1500,
      currency: "NGN".to_string(),
      status: OrderStatus::Pending,
      payment_status,
      payment_reference: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
    }
  }

  fn payout(seller_id: Uuid, amount: Amount, status: PayoutStatus) -> SellerPayout {
    SellerPayout {
      id: Uuid::new_v4(),
      seller_id,
      amount,
      currency: "NGN".to_string(),
      method: PayoutMethod::BankTransfer,
      account_details: serde_json::json!({}),
      reference: format!("PAYOUT-{}", Uuid::new_v4().simple()),
      status,
      external_transfer_id: None,
      failure_reason: None,
      created_at: Utc::now(),
      updated_at: Utc::now(),
      completed_at: None,
    }
  }

  #[test]
  fn plan_groups_items_per_seller_and_product() {
    let (seller_a, seller_b) = (Uuid::new_v4(), Uuid::new_v4());
    let (tote, wrap) = (Uuid::new_v4(), Uuid::new_v4());
    let o = order(
      |id| {
        vec![
          item(id, seller_a, tote, "Tote", 2, 1000),
          item(id, seller_b, wrap, "Head wrap", 1, 2000),
          item(id, seller_a, tote, "Tote", 1, 900),
        ]
      },
      PaymentStatus::Processing,
    );

    let plan = AccrualPlan::for_order(&o);
    assert_eq!(plan.stock.len(), 2);
    assert_eq!(plan.stock[0], StockDecrement { product_id: tote, quantity: 3 });
    assert_eq!(plan.sellers.len(), 2);
    assert_eq!(plan.sellers[0].seller_id, seller_a);
    assert_eq!(plan.sellers[0].revenue, 2900);
    assert_eq!(plan.sellers[0].lines.len(), 2);
    assert_eq!(plan.sellers[1].revenue, 2000);
    assert_eq!(plan.total_revenue(), o.subtotal);
  }

  #[test]
  fn seller_notification_lists_every_line_once() {
    let credit = SellerCredit {
      seller_id: Uuid::new_v4(),
      revenue: 3000,
      lines: vec![
        CreditLine { product_name: "Tote".into(), quantity: 2 },
        CreditLine { product_name: "Wrap".into(), quantity: 1 },
      ],
    };
    let note = credit.notification(Uuid::new_v4(), Uuid::new_v4(), "NGN");
    assert_eq!(note.kind, NotificationKind::NewOrder);
    assert!(note.message.contains("Tote x2, Wrap x1"));
  }

  #[test]
  fn balance_counts_only_completed_orders_and_live_payouts() {
    let seller = Uuid::new_v4();
    let product = Uuid::new_v4();
    let paid = order(|id| vec![item(id, seller, product, "Tote", 5, 1000)], PaymentStatus::Completed);
    let unpaid = order(|id| vec![item(id, seller, product, "Tote", 3, 1000)], PaymentStatus::Processing);
    let other = order(|id| vec![item(id, Uuid::new_v4(), product, "Tote", 9, 1000)], PaymentStatus::Completed);
    let payouts = vec![
      payout(seller, 1000, PayoutStatus::Completed),
      payout(seller, 1500, PayoutStatus::Processing),
      payout(seller, 700, PayoutStatus::Failed),
    ];

    let balance = derive_balance([&paid, &unpaid, &other], payouts.iter(), seller);
    assert_eq!(balance.revenue, 5000);
    assert_eq!(balance.completed_payouts, 1000);
    assert_eq!(balance.in_flight_payouts, 1500);
    assert_eq!(balance.available(), 2500);
  }
}
