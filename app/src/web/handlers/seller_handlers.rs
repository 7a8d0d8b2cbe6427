use actix_web::{web, HttpResponse};
use bazaar::{Amount, MarketError, PayoutMethod, PayoutRequest, Seller};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

/// Loads the seller and checks that the caller owns the store.
async fn owned_seller(app_state: &AppState, seller_id: Uuid, user: AuthenticatedUser) -> Result<Seller, AppError> {
  let seller = app_state
    .market
    .deps()
    .store
    .seller(seller_id)
    .await
    .map_err(MarketError::from)?
    .ok_or(MarketError::SellerNotFound(seller_id))?;
  if seller.user_id != user.user_id {
    return Err(AppError::Forbidden("Seller account belongs to another user".to_string()));
  }
  Ok(seller)
}

#[instrument(name = "handler::seller_balance", skip(app_state), fields(user_id = %user.user_id))]
pub async fn seller_balance_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let seller = owned_seller(&app_state, path.into_inner(), user).await?;
  let balance = app_state.market.seller_balance(seller.id).await?;
  Ok(HttpResponse::Ok().json(json!({
    "seller_id": seller.id,
    "currency": app_state.config.currency,
    "revenue": balance.revenue,
    "completed_payouts": balance.completed_payouts,
    "in_flight_payouts": balance.in_flight_payouts,
    "available": balance.available(),
  })))
}

#[derive(Debug, Deserialize)]
pub struct PayoutPayload {
  pub amount: Amount,
  pub method: PayoutMethod,
  pub account_details: serde_json::Value,
}

#[instrument(name = "handler::request_payout", skip(app_state, payload), fields(user_id = %user.user_id, amount = payload.amount))]
pub async fn request_payout_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<PayoutPayload>,
) -> Result<HttpResponse, AppError> {
  let seller = owned_seller(&app_state, path.into_inner(), user).await?;
  let payload = payload.into_inner();
  let payout = app_state
    .market
    .request_payout(PayoutRequest {
      seller_id: seller.id,
      amount: payload.amount,
      method: payload.method,
      account_details: payload.account_details,
    })
    .await?;
  info!(reference = %payout.reference, status = %payout.status, "Payout requested.");
  Ok(HttpResponse::Accepted().json(json!({ "payout": payout })))
}

#[instrument(name = "handler::refresh_payout", skip(app_state), fields(user_id = %user.user_id))]
pub async fn refresh_payout_handler(
  app_state: web::Data<AppState>,
  user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let payout_id = path.into_inner();
  let payout = app_state
    .market
    .deps()
    .store
    .payout(payout_id)
    .await
    .map_err(MarketError::from)?
    .ok_or_else(|| MarketError::PayoutNotFound(payout_id.to_string()))?;
  owned_seller(&app_state, payout.seller_id, user).await?;
  let payout = app_state.market.refresh_payout(payout_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "payout": payout })))
}
