//! Payment initialization: claim a pending order, obtain a checkout link,
//! record the reference.

use super::contexts::InitializePaymentCtx;
use crate::error::{MarketError, Result};
use crate::flow::{ContextData, Pipeline, PipelineControl, Registry};
use crate::ports::gateway::{PaymentCustomer, PaymentInitiation};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const PIPELINE_NAME: &str = "initialize_payment";

/// Fresh, globally unique order payment reference.
pub fn new_payment_reference(order_id: Uuid) -> String {
  format!("ORD-{}-{}", order_id.simple(), Uuid::new_v4().simple())
}

pub fn register_initialize_payment_pipeline(registry: &Registry<MarketError>) {
  let mut p = Pipeline::<InitializePaymentCtx, MarketError>::new(
    PIPELINE_NAME,
    &[
      ("load_payable_order", false, None),
      ("request_payment_link", false, None),
      ("attach_reference", false, None),
    ],
  );

  p.on_root("load_payable_order", load_payable_order);
  p.on_root("request_payment_link", request_payment_link);

  p.on_root("attach_reference", |ctx: ContextData<InitializePaymentCtx>| {
    Box::pin(async move {
      let (store, order_id, reference) = {
        let guard = ctx.read();
        (guard.deps.store.clone(), guard.order_id, guard.reference.clone())
      };
      let reference = reference.ok_or(MarketError::OrderNotFoundOrAlreadyPaid(order_id))?;
      // Loses to any concurrent attempt that got there first.
      if !store.attach_payment_reference(order_id, &reference).await? {
        warn!(%order_id, "Order stopped being payable while the link was requested.");
        return Err(MarketError::OrderNotFoundOrAlreadyPaid(order_id));
      }
      info!(%order_id, %reference, "Payment initialized; awaiting settlement.");
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
}

#[instrument(name = "initialize_payment::load_payable_order", skip_all, err(Display))]
async fn load_payable_order(ctx: ContextData<InitializePaymentCtx>) -> Result<PipelineControl> {
  let (store, order_id, requester) = {
    let guard = ctx.read();
    (guard.deps.store.clone(), guard.order_id, guard.requester)
  };

  let order = store
    .order(order_id)
    .await?
    .filter(|order| order.owner.permits(requester))
    .filter(|order| order.status.accepts_payment() && order.payment_status.accepts_new_attempt())
    .ok_or(MarketError::OrderNotFoundOrAlreadyPaid(order_id))?;

  ctx.write().order = Some(order);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "initialize_payment::request_payment_link", skip_all, err(Display))]
async fn request_payment_link(ctx: ContextData<InitializePaymentCtx>) -> Result<PipelineControl> {
  let (gateway, initiation) = {
    let guard = ctx.read();
    let order = guard
      .order
      .as_ref()
      .ok_or(MarketError::OrderNotFoundOrAlreadyPaid(guard.order_id))?;
    let address = order.owner.shipping_address();
    let email = address
      .map(|a| a.email.clone())
      .filter(|email| !email.trim().is_empty())
      .or_else(|| guard.customer_email.clone())
      .ok_or_else(|| MarketError::Validation("a customer e-mail is required to pay".to_string()))?;

    let initiation = PaymentInitiation {
      reference: new_payment_reference(order.id),
      amount: order.total,
      currency: order.currency.clone(),
      customer: PaymentCustomer {
        email,
        name: address.map(|a| a.full_name()),
        phone: address.map(|a| a.phone.clone()),
      },
      redirect_url: guard.redirect_url.clone(),
      meta: serde_json::json!({
        "order_id": order.id,
        "guest": order.owner.is_guest(),
      }),
    };
    (guard.deps.payments.clone(), initiation)
  };

  let link = gateway.initiate_payment(&initiation).await?;

  let mut guard = ctx.write();
  guard.reference = Some(initiation.reference);
  guard.link = Some(link);
  Ok(PipelineControl::Continue)
}
