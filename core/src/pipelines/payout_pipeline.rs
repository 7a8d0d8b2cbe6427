//! Payout disbursement: check the balance, reserve the payout, hand it to
//! the transfer gateway.

use super::common_steps;
use super::contexts::{PayoutCtx, TransferUpdateCtx, TransferUpdateSource};
use crate::error::{MarketError, Result};
use crate::flow::step::skip_when;
use crate::flow::{ContextData, Pipeline, PipelineControl, Registry};
use crate::model::{NewNotification, NotificationKind, PayoutMethod, PayoutStatus, SellerPayout};
use crate::ports::gateway::{GatewayTransferStatus, TransferRequest};
use crate::ports::store::{PayoutOutcome, PayoutReservation, PayoutTransition};
use crate::ports::Notifier;
use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const PIPELINE_NAME: &str = "request_payout";
pub const TRANSFER_UPDATE_PIPELINE_NAME: &str = "apply_transfer_update";

/// Payout references never collide with order payment references.
pub fn new_payout_reference() -> String {
  format!("PAYOUT-{}", Uuid::new_v4().simple())
}

pub(crate) fn payout_notification(user_id: Uuid, payout: &SellerPayout) -> Option<NewNotification> {
  let (kind, title, message) = match payout.status {
    PayoutStatus::Pending => return None,
    PayoutStatus::Processing => (
      NotificationKind::PayoutProcessing,
      "Payout on its way",
      format!("Your payout of {} {} is being processed.", payout.amount, payout.currency),
    ),
    PayoutStatus::Completed => (
      NotificationKind::PayoutCompleted,
      "Payout completed",
      format!("Your payout of {} {} has been sent.", payout.amount, payout.currency),
    ),
    PayoutStatus::Failed => (
      NotificationKind::PayoutFailed,
      "Payout failed",
      format!(
        "Your payout of {} {} failed: {}",
        payout.amount,
        payout.currency,
        payout.failure_reason.as_deref().unwrap_or("unknown reason")
      ),
    ),
  };
  Some(NewNotification::new(user_id, kind, title, message))
}

async fn notify_seller(notifier: &dyn Notifier, seller_user_id: Option<Uuid>, payout: &SellerPayout) {
  if let Some(notification) = seller_user_id.and_then(|user_id| payout_notification(user_id, payout)) {
    common_steps::notify_best_effort(notifier, notification).await;
  }
}

pub fn register_payout_pipeline(registry: &Registry<MarketError>) {
  let mut p = Pipeline::<PayoutCtx, MarketError>::new(
    PIPELINE_NAME,
    &[
      ("check_balance", false, None),
      ("reserve_payout", false, None),
      (
        "transfer_bank",
        false,
        skip_when(|ctx: ContextData<PayoutCtx>| ctx.read().method() != PayoutMethod::BankTransfer),
      ),
      (
        "transfer_mobile_money",
        false,
        skip_when(|ctx: ContextData<PayoutCtx>| ctx.read().method() != PayoutMethod::MobileMoney),
      ),
      ("notify_seller", true, None),
    ],
  );

  p.on_root("check_balance", check_balance);
  p.on_root("reserve_payout", reserve_payout);
  p.on_root("transfer_bank", send_transfer);
  p.on_root("transfer_mobile_money", send_transfer);

  p.on_root("notify_seller", |ctx: ContextData<PayoutCtx>| {
    Box::pin(async move {
      let (notifier, seller_user_id, payout) = {
        let guard = ctx.read();
        (
          guard.deps.notifier.clone(),
          guard.seller.as_ref().map(|s| s.user_id),
          guard.payout.clone(),
        )
      };
      if let Some(payout) = payout.filter(|p| p.status == PayoutStatus::Processing) {
        notify_seller(notifier.as_ref(), seller_user_id, &payout).await;
      }
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
}

#[instrument(name = "request_payout::check_balance", skip_all, fields(seller_id), err(Display))]
async fn check_balance(ctx: ContextData<PayoutCtx>) -> Result<PipelineControl> {
  let (store, request, min_payout) = {
    let guard = ctx.read();
    (guard.deps.store.clone(), guard.request.clone(), guard.deps.settings.min_payout)
  };
  tracing::Span::current().record("seller_id", tracing::field::display(request.seller_id));

  if request.amount <= 0 {
    return Err(MarketError::Validation("payout amount must be positive".to_string()));
  }
  let seller = store
    .seller(request.seller_id)
    .await?
    .ok_or(MarketError::SellerNotFound(request.seller_id))?;

  let available = store.seller_balance(request.seller_id).await?.available();
  if request.amount > available {
    return Err(MarketError::InsufficientBalance {
      requested: request.amount,
      available,
    });
  }
  if request.amount < min_payout {
    return Err(MarketError::BelowMinimum {
      requested: request.amount,
      minimum: min_payout,
    });
  }

  ctx.write().seller = Some(seller);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "request_payout::reserve_payout", skip_all, err(Display))]
async fn reserve_payout(ctx: ContextData<PayoutCtx>) -> Result<PipelineControl> {
  let (store, payout) = {
    let guard = ctx.read();
    let now = Utc::now();
    let payout = SellerPayout {
      id: Uuid::new_v4(),
      seller_id: guard.request.seller_id,
      amount: guard.request.amount,
      currency: guard.deps.settings.currency.clone(),
      method: guard.request.method,
      account_details: guard.request.account_details.clone(),
      reference: new_payout_reference(),
      status: PayoutStatus::Pending,
      external_transfer_id: None,
      failure_reason: None,
      created_at: now,
      updated_at: now,
      completed_at: None,
    };
    (guard.deps.store.clone(), payout)
  };

  // The balance is re-checked under the store's per-seller serialization.
  match store.reserve_payout(&payout).await? {
    PayoutReservation::Reserved(payout) => {
      info!(payout_id = %payout.id, reference = %payout.reference, amount = payout.amount, "Payout reserved.");
      ctx.write().payout = Some(payout);
      Ok(PipelineControl::Continue)
    }
    PayoutReservation::Insufficient { available } => Err(MarketError::InsufficientBalance {
      requested: payout.amount,
      available,
    }),
  }
}

#[instrument(name = "request_payout::send_transfer", skip_all, err(Display))]
async fn send_transfer(ctx: ContextData<PayoutCtx>) -> Result<PipelineControl> {
  let (deps, payout, seller) = {
    let guard = ctx.read();
    let payout = guard
      .payout
      .clone()
      .ok_or_else(|| MarketError::Validation("payout was not reserved".to_string()))?;
    (guard.deps.clone(), payout, guard.seller.clone())
  };

  let request = TransferRequest {
    reference: payout.reference.clone(),
    amount: payout.amount,
    currency: payout.currency.clone(),
    account_details: payout.account_details.clone(),
    narration: match &seller {
      Some(seller) => format!("Payout to {}", seller.store_name),
      None => "Seller payout".to_string(),
    },
    callback_url: deps.settings.transfer_callback_url.clone(),
  };

  let submitted = match payout.method {
    PayoutMethod::BankTransfer => deps.transfers.initiate_bank_transfer(&request).await,
    PayoutMethod::MobileMoney => deps.transfers.initiate_mobile_money_transfer(&request).await,
  };
  let rejection = match &submitted {
    Ok(receipt) => match &receipt.status {
      GatewayTransferStatus::Failed { reason } => Some(reason.clone()),
      _ => None,
    },
    Err(e) => Some(e.message().to_string()),
  };

  if let Some(reason) = rejection {
    warn!(reference = %payout.reference, %reason, "Transfer rejected; payout failed.");
    let outcome = PayoutOutcome::Failed { reason: reason.clone() };
    if let PayoutTransition::Applied(failed) = deps.store.finish_payout(&payout.reference, &outcome).await? {
      notify_seller(deps.notifier.as_ref(), seller.as_ref().map(|s| s.user_id), &failed).await;
    }
    return Err(MarketError::TransferFailed {
      reference: payout.reference,
      reason,
    });
  }

  let receipt = submitted?;
  let stored = deps
    .store
    .mark_payout_processing(payout.id, &receipt.transfer_id)
    .await?
    .ok_or_else(|| MarketError::PayoutNotFound(payout.reference.clone()))?;
  if stored.status == PayoutStatus::Processing {
    info!(reference = %payout.reference, transfer_id = %receipt.transfer_id, "Transfer accepted; payout processing.");
  } else {
    // A transfer event beat us here; its pipeline already told the seller.
    info!(reference = %payout.reference, status = %stored.status, "Transfer finished before it was recorded as processing.");
  }

  let mut guard = ctx.write();
  guard.payout = Some(stored);
  guard.receipt = Some(receipt);
  Ok(PipelineControl::Continue)
}

// --- Transfer status updates (webhook or polling) ---

pub fn register_transfer_update_pipeline(registry: &Registry<MarketError>) {
  let mut p = Pipeline::<TransferUpdateCtx, MarketError>::new(
    TRANSFER_UPDATE_PIPELINE_NAME,
    &[
      (
        "authenticate_webhook",
        false,
        skip_when(|ctx: ContextData<TransferUpdateCtx>| !ctx.read().is_webhook()),
      ),
      (
        "poll_gateway",
        false,
        skip_when(|ctx: ContextData<TransferUpdateCtx>| ctx.read().is_webhook()),
      ),
      ("apply_transition", false, None),
      ("notify_seller", true, None),
    ],
  );

  p.on_root("authenticate_webhook", |ctx: ContextData<TransferUpdateCtx>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      let TransferUpdateSource::Webhook { signature, raw_payload } = &guard.source else {
        return Ok(PipelineControl::Continue);
      };
      let gateway = guard.deps.transfers.clone();
      if !gateway.verify_webhook_signature(signature, raw_payload) {
        warn!(payload_len = raw_payload.len(), "Transfer webhook rejected: bad signature.");
        return Err(MarketError::InvalidSignature);
      }
      let event = gateway.parse_transfer_event(raw_payload)?;
      info!(event = %event.event, reference = %event.reference, status = ?event.status, "Transfer webhook accepted.");
      guard.reference = Some(event.reference);
      guard.status = Some(event.status);
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  p.on_root("poll_gateway", poll_gateway);
  p.on_root("apply_transition", apply_transition);

  p.on_root("notify_seller", |ctx: ContextData<TransferUpdateCtx>| {
    Box::pin(async move {
      let (deps, transition) = {
        let guard = ctx.read();
        (guard.deps.clone(), guard.transition.clone())
      };
      let Some(PayoutTransition::Applied(payout)) = transition else {
        return Ok(PipelineControl::Continue);
      };
      let seller_user_id = match deps.store.seller(payout.seller_id).await {
        Ok(seller) => seller.map(|s| s.user_id),
        Err(e) => {
          warn!(error = %e, "Seller lookup for payout notification failed.");
          None
        }
      };
      notify_seller(deps.notifier.as_ref(), seller_user_id, &payout).await;
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
}

#[instrument(name = "apply_transfer_update::poll_gateway", skip_all, err(Display))]
async fn poll_gateway(ctx: ContextData<TransferUpdateCtx>) -> Result<PipelineControl> {
  let (deps, payout_id) = {
    let guard = ctx.read();
    let TransferUpdateSource::Poll { payout_id } = guard.source else {
      return Ok(PipelineControl::Continue);
    };
    (guard.deps.clone(), payout_id)
  };

  let payout = deps
    .store
    .payout(payout_id)
    .await?
    .ok_or_else(|| MarketError::PayoutNotFound(payout_id.to_string()))?;
  let transfer_id = match (&payout.status, &payout.external_transfer_id) {
    (PayoutStatus::Processing, Some(transfer_id)) => transfer_id.clone(),
    _ => {
      info!(reference = %payout.reference, status = %payout.status, "Payout has no transfer in flight; nothing to poll.");
      ctx.write().transition = Some(PayoutTransition::Unchanged(payout));
      return Ok(PipelineControl::Stop);
    }
  };

  let status = deps.transfers.transfer_status(&transfer_id).await?;
  let mut guard = ctx.write();
  guard.reference = Some(payout.reference.clone());
  guard.status = Some(status);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "apply_transfer_update::apply_transition", skip_all, err(Display))]
async fn apply_transition(ctx: ContextData<TransferUpdateCtx>) -> Result<PipelineControl> {
  let (store, reference, status) = {
    let guard = ctx.read();
    match (&guard.reference, &guard.status) {
      (Some(reference), Some(status)) => (guard.deps.store.clone(), reference.clone(), status.clone()),
      _ => return Err(MarketError::Validation("transfer update carries no status".to_string())),
    }
  };

  let outcome = match status {
    GatewayTransferStatus::Successful => PayoutOutcome::Completed,
    GatewayTransferStatus::Failed { reason } => PayoutOutcome::Failed { reason },
    GatewayTransferStatus::Pending => {
      // Not final yet; report the payout as it stands.
      let payout = store
        .payout_by_reference(&reference)
        .await?
        .ok_or_else(|| MarketError::PayoutNotFound(reference.clone()))?;
      ctx.write().transition = Some(PayoutTransition::Unchanged(payout));
      return Ok(PipelineControl::Stop);
    }
  };

  let transition = store.finish_payout(&reference, &outcome).await?;
  match &transition {
    PayoutTransition::Applied(payout) => {
      info!(%reference, status = %payout.status, "Payout reached a terminal state.");
    }
    PayoutTransition::Unchanged(payout) => {
      info!(%reference, status = %payout.status, "Duplicate transfer update ignored.");
    }
    PayoutTransition::NotFound => {
      warn!(%reference, "Transfer update for unknown payout.");
      return Err(MarketError::PayoutNotFound(reference));
    }
  }
  ctx.write().transition = Some(transition);
  Ok(PipelineControl::Continue)
}
