//! In-process implementations of the store and catalog cache.
//!
//! All state sits behind one mutex, so every `MarketStore` call is atomic
//! and payout reservations are serialized for free.

use crate::error::{StoreError, StoreResult};
use crate::ledger::{derive_balance, AccrualPlan};
use crate::model::{
  NewNotification, Notification, Order, OrderStatus, PaymentStatus, PayoutStatus, Product, Seller, SellerBalance,
  SellerPayout,
};
use crate::ports::cache::CatalogCache;
use crate::ports::store::{MarketStore, PayoutOutcome, PayoutReservation, PayoutTransition, SettlementCommit};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct State {
  products: HashMap<Uuid, Product>,
  sellers: HashMap<Uuid, Seller>,
  orders: HashMap<Uuid, Order>,
  order_refs: HashMap<String, Uuid>,
  payouts: Vec<SellerPayout>,
  notifications: Vec<Notification>,
}

#[derive(Default)]
pub struct MemoryStore {
  state: Mutex<State>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_seller(&self, seller: Seller) {
    self.state.lock().sellers.insert(seller.id, seller);
  }

  pub fn insert_product(&self, product: Product) {
    self.state.lock().products.insert(product.id, product);
  }

  /// Mutates a catalog entry in place, e.g. to reprice it.
  pub fn update_product(&self, product_id: Uuid, f: impl FnOnce(&mut Product)) -> bool {
    match self.state.lock().products.get_mut(&product_id) {
      Some(product) => {
        f(product);
        true
      }
      None => false,
    }
  }

  pub fn get_product(&self, product_id: Uuid) -> Option<Product> {
    self.state.lock().products.get(&product_id).cloned()
  }

  pub fn get_seller(&self, seller_id: Uuid) -> Option<Seller> {
    self.state.lock().sellers.get(&seller_id).cloned()
  }

  pub fn get_order(&self, order_id: Uuid) -> Option<Order> {
    self.state.lock().orders.get(&order_id).cloned()
  }

  pub fn payouts_for(&self, seller_id: Uuid) -> Vec<SellerPayout> {
    self
      .state
      .lock()
      .payouts
      .iter()
      .filter(|p| p.seller_id == seller_id)
      .cloned()
      .collect()
  }

  pub fn get_order_references(&self) -> Vec<String> {
    self.state.lock().order_refs.keys().cloned().collect()
  }

  pub fn get_notifications(&self, user_id: Uuid) -> Vec<Notification> {
    self
      .state
      .lock()
      .notifications
      .iter()
      .filter(|n| n.user_id == user_id)
      .cloned()
      .collect()
  }
}

impl State {
  fn push_notification(&mut self, new: NewNotification) -> Notification {
    let notification = Notification::from_new(new);
    self.notifications.push(notification.clone());
    notification
  }

  fn balance(&self, seller_id: Uuid) -> SellerBalance {
    derive_balance(self.orders.values(), self.payouts.iter(), seller_id)
  }
}

#[async_trait]
impl MarketStore for MemoryStore {
  async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
    let state = self.state.lock();
    Ok(
      ids
        .iter()
        .filter_map(|id| state.products.get(id))
        .filter(|p| p.is_active)
        .cloned()
        .collect(),
    )
  }

  async fn insert_order(&self, order: &Order) -> StoreResult<()> {
    let mut state = self.state.lock();
    if state.orders.contains_key(&order.id) {
      return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
    }
    state.orders.insert(order.id, order.clone());
    Ok(())
  }

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
    Ok(self.state.lock().orders.get(&order_id).cloned())
  }

  async fn order_by_reference(&self, payment_reference: &str) -> StoreResult<Option<Order>> {
    let state = self.state.lock();
    Ok(
      state
        .order_refs
        .get(payment_reference)
        .and_then(|id| state.orders.get(id))
        .cloned(),
    )
  }

  async fn attach_payment_reference(&self, order_id: Uuid, payment_reference: &str) -> StoreResult<bool> {
    let mut state = self.state.lock();
    if state.order_refs.contains_key(payment_reference) {
      return Err(StoreError::Conflict(format!("payment reference '{}' in use", payment_reference)));
    }
    let Some(order) = state.orders.get_mut(&order_id) else {
      return Ok(false);
    };
    if !order.status.accepts_payment() || !order.payment_status.accepts_new_attempt() {
      return Ok(false);
    }
    let previous = order.payment_reference.replace(payment_reference.to_string());
    order.payment_status = PaymentStatus::Processing;
    order.updated_at = Utc::now();
    if let Some(previous) = previous {
      state.order_refs.remove(&previous);
    }
    state.order_refs.insert(payment_reference.to_string(), order_id);
    Ok(true)
  }

  async fn commit_settlement(&self, plan: &AccrualPlan) -> StoreResult<SettlementCommit> {
    let mut state = self.state.lock();
    let order = state
      .orders
      .get_mut(&plan.order_id)
      .ok_or_else(|| StoreError::NotFound(format!("order {}", plan.order_id)))?;
    if order.payment_status == PaymentStatus::Completed {
      return Ok(SettlementCommit::AlreadySettled);
    }
    if !order.status.accepts_payment() {
      return Ok(SettlementCommit::OrderClosed { status: order.status });
    }
    order.payment_status = PaymentStatus::Completed;
    order.status = OrderStatus::Processing;
    order.updated_at = Utc::now();
    let settled = order.clone();

    for decrement in &plan.stock {
      // Products may have been removed since checkout; their history stays on the order.
      if let Some(product) = state.products.get_mut(&decrement.product_id) {
        product.stock -= decrement.quantity;
        product.total_sales += i64::from(decrement.quantity);
      }
    }

    for credit in &plan.sellers {
      let Some(seller) = state.sellers.get_mut(&credit.seller_id) else {
        debug!(seller_id = %credit.seller_id, "Seller missing during accrual, skipping credit.");
        continue;
      };
      seller.total_sales += credit.revenue;
      seller.total_orders += 1;
      let note = credit.notification(seller.user_id, plan.order_id, &plan.currency);
      state.push_notification(note);
    }

    Ok(SettlementCommit::Applied { order: settled })
  }

  async fn mark_payment_failed(&self, order_id: Uuid) -> StoreResult<bool> {
    let mut state = self.state.lock();
    match state.orders.get_mut(&order_id) {
      Some(order) if order.payment_status != PaymentStatus::Completed => {
        order.payment_status = PaymentStatus::Failed;
        order.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn transition_order_status(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> StoreResult<bool> {
    let mut state = self.state.lock();
    match state.orders.get_mut(&order_id) {
      Some(order) if order.status == from => {
        order.status = to;
        order.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn seller(&self, seller_id: Uuid) -> StoreResult<Option<Seller>> {
    Ok(self.state.lock().sellers.get(&seller_id).cloned())
  }

  async fn seller_balance(&self, seller_id: Uuid) -> StoreResult<SellerBalance> {
    Ok(self.state.lock().balance(seller_id))
  }

  async fn reserve_payout(&self, payout: &SellerPayout) -> StoreResult<PayoutReservation> {
    let mut state = self.state.lock();
    if !state.sellers.contains_key(&payout.seller_id) {
      return Err(StoreError::NotFound(format!("seller {}", payout.seller_id)));
    }
    if state.payouts.iter().any(|p| p.reference == payout.reference) {
      return Err(StoreError::Conflict(format!("payout reference '{}' in use", payout.reference)));
    }
    let available = state.balance(payout.seller_id).available();
    if payout.amount > available {
      return Ok(PayoutReservation::Insufficient { available });
    }
    let mut reserved = payout.clone();
    reserved.status = PayoutStatus::Pending;
    state.payouts.push(reserved.clone());
    Ok(PayoutReservation::Reserved(reserved))
  }

  async fn mark_payout_processing(&self, payout_id: Uuid, transfer_id: &str) -> StoreResult<Option<SellerPayout>> {
    let mut state = self.state.lock();
    let Some(payout) = state.payouts.iter_mut().find(|p| p.id == payout_id) else {
      return Ok(None);
    };
    if payout.external_transfer_id.is_none() {
      payout.external_transfer_id = Some(transfer_id.to_string());
    }
    if payout.status == PayoutStatus::Pending {
      payout.status = PayoutStatus::Processing;
    }
    payout.updated_at = Utc::now();
    Ok(Some(payout.clone()))
  }

  async fn finish_payout(&self, reference: &str, outcome: &PayoutOutcome) -> StoreResult<PayoutTransition> {
    let mut state = self.state.lock();
    let Some(payout) = state.payouts.iter_mut().find(|p| p.reference == reference) else {
      return Ok(PayoutTransition::NotFound);
    };
    if payout.status.is_terminal() {
      return Ok(PayoutTransition::Unchanged(payout.clone()));
    }
    let now = Utc::now();
    match outcome {
      PayoutOutcome::Completed => {
        payout.status = PayoutStatus::Completed;
        payout.completed_at = Some(now);
      }
      PayoutOutcome::Failed { reason } => {
        payout.status = PayoutStatus::Failed;
        payout.failure_reason = Some(reason.clone());
      }
    }
    payout.updated_at = now;
    Ok(PayoutTransition::Applied(payout.clone()))
  }

  async fn payout(&self, payout_id: Uuid) -> StoreResult<Option<SellerPayout>> {
    Ok(self.state.lock().payouts.iter().find(|p| p.id == payout_id).cloned())
  }

  async fn payout_by_reference(&self, reference: &str) -> StoreResult<Option<SellerPayout>> {
    Ok(self.state.lock().payouts.iter().find(|p| p.reference == reference).cloned())
  }

  async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
    Ok(self.state.lock().push_notification(notification))
  }

  async fn notifications_for(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
    Ok(
      self
        .state
        .lock()
        .notifications
        .iter()
        .filter(|n| n.user_id == user_id)
        .cloned()
        .collect(),
    )
  }
}

/// `CatalogCache` over a map; entries live until invalidated.
#[derive(Default)]
pub struct MemoryCatalogCache {
  entries: RwLock<HashMap<String, serde_json::Value>>,
}

impl MemoryCatalogCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn len(&self) -> usize {
    self.entries.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.read().is_empty()
  }
}

impl CatalogCache for MemoryCatalogCache {
  fn get(&self, key: &str) -> Option<serde_json::Value> {
    self.entries.read().get(key).cloned()
  }

  fn put(&self, key: &str, value: serde_json::Value) {
    self.entries.write().insert(key.to_string(), value);
  }

  fn invalidate(&self, key_prefix: &str) -> usize {
    let mut entries = self.entries.write();
    let before = entries.len();
    entries.retain(|key, _| !key.starts_with(key_prefix));
    before - entries.len()
  }
}
