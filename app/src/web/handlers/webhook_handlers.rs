use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;
use tracing::{info, instrument};

use super::payment_handlers::outcome_label;
use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::webhook_signature;

/// Charge events. The raw body is what the signature covers, so it is passed through untouched.
#[instrument(name = "handler::payment_webhook", skip_all, fields(bytes = body.len()))]
pub async fn payment_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let signature = webhook_signature(&req);
  let report = app_state.market.handle_payment_webhook(&signature, &body).await?;
  info!(order_id = %report.order_id, outcome = outcome_label(report.outcome), "Payment webhook processed.");
  Ok(HttpResponse::Ok().json(json!({
    "status": "ok",
    "outcome": outcome_label(report.outcome),
  })))
}

#[instrument(name = "handler::transfer_webhook", skip_all, fields(bytes = body.len()))]
pub async fn transfer_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let signature = webhook_signature(&req);
  let payout = app_state.market.handle_transfer_webhook(&signature, &body).await?;
  info!(reference = %payout.reference, status = %payout.status, "Transfer webhook processed.");
  Ok(HttpResponse::Ok().json(json!({
    "status": "ok",
    "payout_status": payout.status,
  })))
}
