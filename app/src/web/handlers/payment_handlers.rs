use actix_web::{web, HttpResponse};
use bazaar::SettlementOutcome;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::Requester;

#[derive(Debug, Deserialize)]
pub struct InitializePayload {
  pub order_id: Uuid,
  /// Where the gateway sends the buyer back; defaults to our verify endpoint.
  #[serde(default)]
  pub redirect_url: Option<String>,
  #[serde(default)]
  pub email: Option<String>,
}

#[instrument(name = "handler::initialize_payment", skip(app_state, payload), fields(order_id = %payload.order_id))]
pub async fn initialize_payment_handler(
  app_state: web::Data<AppState>,
  requester: Requester,
  payload: web::Json<InitializePayload>,
) -> Result<HttpResponse, AppError> {
  let payload = payload.into_inner();
  let redirect_url = payload.redirect_url.unwrap_or_else(|| {
    format!(
      "{}/api/v1/payments/verify",
      app_state.config.app_base_url.trim_end_matches('/')
    )
  });
  let init = app_state
    .market
    .initialize_payment(payload.order_id, requester.0, &redirect_url, payload.email)
    .await?;
  info!(reference = %init.reference, "Payment initialized.");
  Ok(HttpResponse::Ok().json(json!({
    "payment_url": init.payment_url,
    "reference": init.reference,
  })))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
  pub transaction_id: String,
}

pub(crate) fn outcome_label(outcome: SettlementOutcome) -> &'static str {
  match outcome {
    SettlementOutcome::Settled => "settled",
    SettlementOutcome::AlreadySettled => "already_settled",
    SettlementOutcome::Failed => "failed",
    SettlementOutcome::Pending => "pending",
    SettlementOutcome::RefundDue => "refund_due",
  }
}

#[instrument(name = "handler::verify_payment", skip(app_state, query), fields(transaction_id = %query.transaction_id))]
pub async fn verify_payment_handler(
  app_state: web::Data<AppState>,
  query: web::Query<VerifyQuery>,
) -> Result<HttpResponse, AppError> {
  if query.transaction_id.trim().is_empty() {
    return Err(AppError::Validation("transaction_id is required".to_string()));
  }
  let report = app_state.market.settle_payment(query.transaction_id.trim()).await?;
  Ok(HttpResponse::Ok().json(json!({
    "order_id": report.order_id,
    "reference": report.reference,
    "outcome": outcome_label(report.outcome),
  })))
}
