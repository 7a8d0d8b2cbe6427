//! Payment settlement, shared by the verify call and the payment webhook.
//!
//! Both triggers produce a `GatewayReport` and then run the same steps.
//! The read of `payment_status` in `load_order` is only a fast path; the
//! conditional write inside `MarketStore::commit_settlement` is what makes
//! accrual happen at most once per order.

use super::common_steps;
use super::contexts::{GatewayReport, SettlementCtx, SettlementOutcome, SettlementTrigger};
use crate::error::{MarketError, Result};
use crate::flow::step::skip_when;
use crate::flow::{ContextData, Pipeline, PipelineControl, Registry};
use crate::ledger::AccrualPlan;
use crate::model::{NewNotification, NotificationKind, PaymentStatus};
use crate::ports::gateway::GatewayPaymentStatus;
use crate::ports::store::SettlementCommit;
use tracing::{info, instrument, warn};

pub const PIPELINE_NAME: &str = "settle_payment";

pub fn register_settlement_pipeline(registry: &Registry<MarketError>) {
  let mut p = Pipeline::<SettlementCtx, MarketError>::new(
    PIPELINE_NAME,
    &[
      (
        "authenticate_webhook",
        false,
        skip_when(|ctx: ContextData<SettlementCtx>| !ctx.read().trigger.is_webhook()),
      ),
      (
        "verify_with_gateway",
        false,
        skip_when(|ctx: ContextData<SettlementCtx>| ctx.read().trigger.is_webhook()),
      ),
      ("load_order", false, None),
      ("apply_outcome", false, None),
      (
        "invalidate_catalog",
        false,
        skip_when(|ctx: ContextData<SettlementCtx>| ctx.read().outcome != Some(SettlementOutcome::Settled)),
      ),
      ("notify_buyer", true, None),
    ],
  );

  p.on_root("authenticate_webhook", authenticate_webhook);
  p.on_root("verify_with_gateway", verify_with_gateway);
  p.on_root("load_order", load_order);
  p.on_root("apply_outcome", apply_outcome);

  p.on_root("invalidate_catalog", |ctx: ContextData<SettlementCtx>| {
    Box::pin(async move {
      let guard = ctx.read();
      if let Some(plan) = &guard.plan {
        common_steps::invalidate_products(guard.deps.cache.as_ref(), plan.product_ids());
      }
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  p.on_root("notify_buyer", notify_buyer);

  registry.register_pipeline(p);
}

#[instrument(name = "settle_payment::authenticate_webhook", skip_all, err(Display))]
async fn authenticate_webhook(ctx: ContextData<SettlementCtx>) -> Result<PipelineControl> {
  let mut guard = ctx.write();
  let SettlementTrigger::Webhook { signature, raw_payload } = &guard.trigger else {
    return Ok(PipelineControl::Continue);
  };
  let gateway = guard.deps.payments.clone();
  if !gateway.verify_webhook_signature(signature, raw_payload) {
    warn!(payload_len = raw_payload.len(), "Payment webhook rejected: bad signature.");
    return Err(MarketError::InvalidSignature);
  }
  let event = gateway.parse_payment_event(raw_payload)?;
  info!(event = %event.event, reference = %event.reference, status = ?event.status, "Payment webhook accepted.");
  guard.report = Some(GatewayReport {
    reference: event.reference,
    transaction_id: event.transaction_id,
    status: event.status,
    amount: event.amount,
  });
  Ok(PipelineControl::Continue)
}

#[instrument(name = "settle_payment::verify_with_gateway", skip_all, err(Display))]
async fn verify_with_gateway(ctx: ContextData<SettlementCtx>) -> Result<PipelineControl> {
  let (gateway, transaction_id) = {
    let guard = ctx.read();
    let SettlementTrigger::Verify { transaction_id } = &guard.trigger else {
      return Ok(PipelineControl::Continue);
    };
    (guard.deps.payments.clone(), transaction_id.clone())
  };
  if transaction_id.trim().is_empty() {
    return Err(MarketError::Validation("transaction_id is required".to_string()));
  }

  let verification = gateway.verify_payment(&transaction_id).await?;
  info!(%transaction_id, reference = %verification.reference, status = ?verification.status, "Payment verified with gateway.");
  ctx.write().report = Some(GatewayReport {
    reference: verification.reference,
    transaction_id: Some(verification.transaction_id),
    status: verification.status,
    amount: Some(verification.amount),
  });
  Ok(PipelineControl::Continue)
}

#[instrument(name = "settle_payment::load_order", skip_all, err(Display))]
async fn load_order(ctx: ContextData<SettlementCtx>) -> Result<PipelineControl> {
  let (store, reference) = {
    let guard = ctx.read();
    let reference = guard
      .report
      .as_ref()
      .map(|r| r.reference.clone())
      .ok_or_else(|| MarketError::Validation("no gateway report to settle".to_string()))?;
    (guard.deps.store.clone(), reference)
  };

  let order = store
    .order_by_reference(&reference)
    .await?
    .ok_or_else(|| MarketError::UnknownPaymentReference(reference.clone()))?;

  let mut guard = ctx.write();
  let already_settled = order.payment_status == PaymentStatus::Completed;
  guard.order = Some(order);
  if already_settled {
    info!(%reference, "Payment already settled; nothing to do.");
    guard.outcome = Some(SettlementOutcome::AlreadySettled);
    return Ok(PipelineControl::Stop);
  }
  Ok(PipelineControl::Continue)
}

#[instrument(name = "settle_payment::apply_outcome", skip_all, err(Display))]
async fn apply_outcome(ctx: ContextData<SettlementCtx>) -> Result<PipelineControl> {
  let (store, report, order) = {
    let guard = ctx.read();
    match (&guard.report, &guard.order) {
      (Some(report), Some(order)) => (guard.deps.store.clone(), report.clone(), order.clone()),
      _ => return Err(MarketError::Validation("settlement state is incomplete".to_string())),
    }
  };

  let underpaid = report.amount.is_some_and(|amount| amount < order.total);
  if underpaid {
    warn!(order_id = %order.id, reported = ?report.amount, expected = order.total, "Gateway amount below order total; treating as failed.");
  }

  match report.status {
    GatewayPaymentStatus::Successful if !underpaid => {
      let plan = AccrualPlan::for_order(&order);
      match store.commit_settlement(&plan).await? {
        SettlementCommit::Applied { order: settled } => {
          info!(
            order_id = %settled.id,
            revenue = plan.total_revenue(),
            sellers = plan.sellers.len(),
            "Payment settled and ledger accrued."
          );
          let mut guard = ctx.write();
          guard.order = Some(settled);
          guard.plan = Some(plan);
          guard.outcome = Some(SettlementOutcome::Settled);
          Ok(PipelineControl::Continue)
        }
        SettlementCommit::AlreadySettled => {
          info!(order_id = %order.id, "Lost the settlement race; another delivery already settled this order.");
          ctx.write().outcome = Some(SettlementOutcome::AlreadySettled);
          Ok(PipelineControl::Stop)
        }
        SettlementCommit::OrderClosed { status } => {
          warn!(
            order_id = %order.id,
            %status,
            amount = ?report.amount,
            "Payment arrived for an order that no longer accepts it; refund required."
          );
          ctx.write().outcome = Some(SettlementOutcome::RefundDue);
          Ok(PipelineControl::Stop)
        }
      }
    }
    GatewayPaymentStatus::Pending => {
      info!(order_id = %order.id, "Gateway reports the payment as pending.");
      ctx.write().outcome = Some(SettlementOutcome::Pending);
      Ok(PipelineControl::Stop)
    }
    GatewayPaymentStatus::Successful | GatewayPaymentStatus::Failed => {
      if store.mark_payment_failed(order.id).await? {
        info!(order_id = %order.id, "Payment marked failed.");
        let mut guard = ctx.write();
        if let Some(order) = guard.order.as_mut() {
          order.payment_status = PaymentStatus::Failed;
        }
        guard.outcome = Some(SettlementOutcome::Failed);
        Ok(PipelineControl::Continue)
      } else {
        ctx.write().outcome = Some(SettlementOutcome::AlreadySettled);
        Ok(PipelineControl::Stop)
      }
    }
  }
}

#[instrument(name = "settle_payment::notify_buyer", skip_all)]
async fn notify_buyer(ctx: ContextData<SettlementCtx>) -> Result<PipelineControl> {
  let (notifier, order, outcome) = {
    let guard = ctx.read();
    (guard.deps.notifier.clone(), guard.order.clone(), guard.outcome)
  };
  let (Some(order), Some(outcome)) = (order, outcome) else {
    return Ok(PipelineControl::Continue);
  };
  let Some(user_id) = order.owner.user_id() else {
    return Ok(PipelineControl::Continue);
  };

  let notification = match outcome {
    SettlementOutcome::Settled => NewNotification::new(
      user_id,
      NotificationKind::PaymentSuccess,
      "Payment successful",
      format!("We received {} {} for order {}.", order.total, order.currency, order.id),
    ),
    SettlementOutcome::Failed => NewNotification::new(
      user_id,
      NotificationKind::PaymentFailed,
      "Payment failed",
      format!("Payment for order {} did not go through. You can try again.", order.id),
    ),
    SettlementOutcome::AlreadySettled | SettlementOutcome::Pending | SettlementOutcome::RefundDue => {
      return Ok(PipelineControl::Continue)
    }
  };
  common_steps::notify_best_effort(notifier.as_ref(), notification).await;
  Ok(PipelineControl::Continue)
}
