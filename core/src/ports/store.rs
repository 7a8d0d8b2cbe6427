//! Persistence contract.
//!
//! Each operation that guards a money invariant is a single call so the
//! backend can make it atomic: a conditional update checked by affected
//! rows, or a transaction holding a row lock.

use crate::error::StoreResult;
use crate::ledger::AccrualPlan;
use crate::model::{
  Amount, NewNotification, Notification, Order, OrderStatus, Product, Seller, SellerBalance, SellerPayout,
};
use async_trait::async_trait;
use uuid::Uuid;

/// Result of trying to move an order's payment to COMPLETED.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementCommit {
  /// This call performed the transition and applied the accrual plan.
  Applied { order: Order },
  /// The order was already COMPLETED; nothing was touched.
  AlreadySettled,
  /// The order left the payable states (e.g. was cancelled) before the money
  /// arrived. Nothing was touched; the payment needs a refund.
  OrderClosed { status: OrderStatus },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutReservation {
  /// The payout row was inserted as PENDING.
  Reserved(SellerPayout),
  Insufficient { available: Amount },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayoutOutcome {
  Completed,
  Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum PayoutTransition {
  /// The payout moved into the requested terminal state.
  Applied(SellerPayout),
  /// The payout was already terminal; returned as stored.
  Unchanged(SellerPayout),
  NotFound,
}

#[async_trait]
pub trait MarketStore: Send + Sync {
  /// Active products among `ids`; missing or inactive ids are simply absent.
  async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>>;

  /// Persists the order together with its items.
  async fn insert_order(&self, order: &Order) -> StoreResult<()>;

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

  async fn order_by_reference(&self, payment_reference: &str) -> StoreResult<Option<Order>>;

  /// Sets `payment_reference` and moves payment to PROCESSING, only while
  /// payment is PENDING or FAILED and the order is PENDING or CONFIRMED.
  /// Returns whether the row changed.
  async fn attach_payment_reference(&self, order_id: Uuid, payment_reference: &str) -> StoreResult<bool>;

  /// "Set COMPLETED where not COMPLETED" plus the whole accrual plan, as one
  /// unit. The plan is applied only when this call wins the transition and
  /// the order is still PENDING or CONFIRMED.
  async fn commit_settlement(&self, plan: &AccrualPlan) -> StoreResult<SettlementCommit>;

  /// Moves payment to FAILED unless it is already COMPLETED.
  async fn mark_payment_failed(&self, order_id: Uuid) -> StoreResult<bool>;

  /// Compare-and-set on the fulfilment status.
  async fn transition_order_status(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> StoreResult<bool>;

  async fn seller(&self, seller_id: Uuid) -> StoreResult<Option<Seller>>;

  async fn seller_balance(&self, seller_id: Uuid) -> StoreResult<SellerBalance>;

  /// Checks the balance and inserts `payout` as PENDING, serialized per seller.
  async fn reserve_payout(&self, payout: &SellerPayout) -> StoreResult<PayoutReservation>;

  /// Records the gateway's transfer id (unless one is already stored) and
  /// moves PENDING to PROCESSING. A payout a transfer event already finished
  /// keeps its status. Returns the payout as stored, or `None` if missing.
  async fn mark_payout_processing(&self, payout_id: Uuid, transfer_id: &str) -> StoreResult<Option<SellerPayout>>;

  /// Moves a non-terminal payout to a terminal state; idempotent.
  async fn finish_payout(&self, reference: &str, outcome: &PayoutOutcome) -> StoreResult<PayoutTransition>;

  async fn payout(&self, payout_id: Uuid) -> StoreResult<Option<SellerPayout>>;

  async fn payout_by_reference(&self, reference: &str) -> StoreResult<Option<SellerPayout>>;

  async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification>;

  async fn notifications_for(&self, user_id: Uuid) -> StoreResult<Vec<Notification>>;
}
