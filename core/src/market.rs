//! `Marketplace`: the operations callers use, each backed by a pipeline.

use crate::error::{MarketError, Result};
use crate::flow::{ContextData, Registry};
use crate::model::{Amount, Order, OrderStatus, SellerBalance, SellerPayout};
use crate::pipelines::contexts::{
  InitializePaymentCtx, MarketDeps, OrderRequest, PaymentInit, PayoutCtx, PayoutRequest, PlaceOrderCtx,
  SettlementCtx, SettlementOutcome, SettlementReport, SettlementTrigger, TransferUpdateCtx, TransferUpdateSource,
};
use crate::pipelines::register_all_pipelines;
use crate::ports::store::PayoutTransition;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct Marketplace {
  deps: MarketDeps,
  registry: Arc<Registry<MarketError>>,
}

impl Marketplace {
  pub fn new(deps: MarketDeps) -> Self {
    let registry = Registry::new();
    register_all_pipelines(&registry);
    Self {
      deps,
      registry: Arc::new(registry),
    }
  }

  pub fn deps(&self) -> &MarketDeps {
    &self.deps
  }

  /// Validates, prices and persists a new PENDING/PENDING order.
  #[instrument(name = "Marketplace::create_order", skip_all, fields(items = request.items.len(), guest = request.guest.is_some()), err(Display))]
  pub async fn create_order(&self, request: OrderRequest) -> Result<Order> {
    let ctx = ContextData::new(PlaceOrderCtx::new(self.deps.clone(), request));
    self.registry.run(ctx.clone()).await?;
    let order = ctx.read().order.clone();
    order.ok_or_else(|| MarketError::Validation("order pipeline finished without an order".to_string()))
  }

  /// Reads an order the requester is allowed to see.
  #[instrument(name = "Marketplace::get_order", skip(self), err(Display))]
  pub async fn get_order(&self, order_id: Uuid, requester: Option<Uuid>) -> Result<Order> {
    self
      .deps
      .store
      .order(order_id)
      .await?
      .filter(|order| order.owner.permits(requester))
      .ok_or(MarketError::OrderNotFound(order_id))
  }

  /// Moves an order along its fulfilment state machine.
  #[instrument(name = "Marketplace::update_order_status", skip(self), err(Display))]
  pub async fn update_order_status(&self, order_id: Uuid, next: OrderStatus) -> Result<Order> {
    let store = &self.deps.store;
    let order = store.order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
    if !order.status.can_transition_to(next, order.payment_status) {
      return Err(MarketError::InvalidTransition {
        from: order.status,
        to: next,
        payment: order.payment_status,
      });
    }
    if !store.transition_order_status(order_id, order.status, next).await? {
      // Someone moved it first; report against what is stored now.
      let current = store.order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))?;
      return Err(MarketError::InvalidTransition {
        from: current.status,
        to: next,
        payment: current.payment_status,
      });
    }
    info!(%order_id, from = %order.status, to = %next, "Order status updated.");
    store.order(order_id).await?.ok_or(MarketError::OrderNotFound(order_id))
  }

  /// Starts a payment attempt for a PENDING or FAILED order.
  #[instrument(name = "Marketplace::initialize_payment", skip(self, redirect_url, customer_email), err(Display))]
  pub async fn initialize_payment(
    &self,
    order_id: Uuid,
    requester: Option<Uuid>,
    redirect_url: &str,
    customer_email: Option<String>,
  ) -> Result<PaymentInit> {
    let ctx = ContextData::new(InitializePaymentCtx::new(
      self.deps.clone(),
      order_id,
      requester,
      redirect_url.to_string(),
      customer_email,
    ));
    self.registry.run(ctx.clone()).await?;
    let guard = ctx.read();
    match (&guard.link, &guard.reference) {
      (Some(link), Some(reference)) => Ok(PaymentInit {
        payment_url: link.redirect_link.clone(),
        reference: reference.clone(),
      }),
      _ => Err(MarketError::OrderNotFoundOrAlreadyPaid(order_id)),
    }
  }

  /// Settles by asking the gateway about `transaction_id`.
  #[instrument(name = "Marketplace::settle_payment", skip(self), err(Display))]
  pub async fn settle_payment(&self, transaction_id: &str) -> Result<SettlementReport> {
    self
      .settle(SettlementTrigger::Verify {
        transaction_id: transaction_id.to_string(),
      })
      .await
  }

  /// Settles from a signed gateway event. The signature is checked first.
  #[instrument(name = "Marketplace::handle_payment_webhook", skip_all, err(Display))]
  pub async fn handle_payment_webhook(&self, signature: &str, raw_payload: &[u8]) -> Result<SettlementReport> {
    self
      .settle(SettlementTrigger::Webhook {
        signature: signature.to_string(),
        raw_payload: raw_payload.to_vec(),
      })
      .await
  }

  async fn settle(&self, trigger: SettlementTrigger) -> Result<SettlementReport> {
    let label = trigger.label();
    let ctx = ContextData::new(SettlementCtx::new(self.deps.clone(), trigger));
    self.registry.run(ctx.clone()).await?;

    let guard = ctx.read();
    let (Some(order), Some(outcome)) = (&guard.order, guard.outcome) else {
      return Err(MarketError::Validation("settlement finished without an outcome".to_string()));
    };
    let reference = guard
      .report
      .as_ref()
      .map(|r| r.reference.clone())
      .or_else(|| order.payment_reference.clone())
      .unwrap_or_default();
    if outcome == SettlementOutcome::Settled {
      info!(order_id = %order.id, via = label, "Settlement applied.");
    }
    Ok(SettlementReport {
      order_id: order.id,
      reference,
      outcome,
    })
  }

  /// What the seller may withdraw right now.
  #[instrument(name = "Marketplace::get_available_balance", skip(self), err(Display))]
  pub async fn get_available_balance(&self, seller_id: Uuid) -> Result<Amount> {
    Ok(self.seller_balance(seller_id).await?.available())
  }

  #[instrument(name = "Marketplace::seller_balance", skip(self), err(Display))]
  pub async fn seller_balance(&self, seller_id: Uuid) -> Result<SellerBalance> {
    if self.deps.store.seller(seller_id).await?.is_none() {
      return Err(MarketError::SellerNotFound(seller_id));
    }
    Ok(self.deps.store.seller_balance(seller_id).await?)
  }

  /// Reserves a payout and submits the transfer. A rejected transfer leaves
  /// the payout FAILED and returns `TransferFailed`.
  #[instrument(name = "Marketplace::request_payout", skip_all, fields(seller_id = %request.seller_id, amount = request.amount, method = %request.method), err(Display))]
  pub async fn request_payout(&self, request: PayoutRequest) -> Result<SellerPayout> {
    let ctx = ContextData::new(PayoutCtx::new(self.deps.clone(), request));
    self.registry.run(ctx.clone()).await?;
    let payout = ctx.read().payout.clone();
    payout.ok_or_else(|| MarketError::Validation("payout pipeline finished without a payout".to_string()))
  }

  /// Applies a signed transfer completion/failure event to its payout.
  #[instrument(name = "Marketplace::handle_transfer_webhook", skip_all, err(Display))]
  pub async fn handle_transfer_webhook(&self, signature: &str, raw_payload: &[u8]) -> Result<SellerPayout> {
    self
      .apply_transfer_update(TransferUpdateSource::Webhook {
        signature: signature.to_string(),
        raw_payload: raw_payload.to_vec(),
      })
      .await
  }

  /// Polls the gateway for a PROCESSING payout and applies a final status.
  #[instrument(name = "Marketplace::refresh_payout", skip(self), err(Display))]
  pub async fn refresh_payout(&self, payout_id: Uuid) -> Result<SellerPayout> {
    self.apply_transfer_update(TransferUpdateSource::Poll { payout_id }).await
  }

  async fn apply_transfer_update(&self, source: TransferUpdateSource) -> Result<SellerPayout> {
    let ctx = ContextData::new(TransferUpdateCtx::new(self.deps.clone(), source));
    self.registry.run(ctx.clone()).await?;
    let (transition, reference) = {
      let guard = ctx.read();
      (guard.transition.clone(), guard.reference.clone())
    };
    match transition {
      Some(PayoutTransition::Applied(payout)) | Some(PayoutTransition::Unchanged(payout)) => Ok(payout),
      Some(PayoutTransition::NotFound) | None => Err(MarketError::PayoutNotFound(reference.unwrap_or_default())),
    }
  }
}
