use actix_web::{web, HttpResponse};
use bazaar::{Amount, LineRequest, OrderRequest, OrderStatus, ShippingAddress};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::extractors::{AuthenticatedUser, Requester};

#[derive(Debug, Deserialize)]
pub struct CreateOrderPayload {
  pub items: Vec<LineRequest>,
  /// Required when no `X-User-ID` is sent.
  #[serde(default)]
  pub guest: Option<ShippingAddress>,
  #[serde(default)]
  pub shipping_address: Option<ShippingAddress>,
  #[serde(default)]
  pub discount: Amount,
}

impl CreateOrderPayload {
  fn into_request(self, user_id: Option<Uuid>) -> OrderRequest {
    OrderRequest {
      items: self.items,
      user_id,
      guest: self.guest,
      shipping_address: self.shipping_address,
      discount: self.discount,
      shipping_cost: None,
    }
  }
}

#[instrument(name = "handler::create_order", skip_all, fields(user_id = ?requester.0, items = payload.items.len()))]
pub async fn create_order_handler(
  app_state: web::Data<AppState>,
  requester: Requester,
  payload: web::Json<CreateOrderPayload>,
) -> Result<HttpResponse, AppError> {
  let order = app_state
    .market
    .create_order(payload.into_inner().into_request(requester.0))
    .await?;
  info!(order_id = %order.id, total = order.total, "Order created.");
  Ok(HttpResponse::Created().json(json!({ "order": order })))
}

#[instrument(name = "handler::get_order", skip(app_state, requester))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  requester: Requester,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = app_state.market.get_order(path.into_inner(), requester.0).await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}

#[derive(Debug, Deserialize)]
pub struct StatusPayload {
  pub status: OrderStatus,
}

#[instrument(name = "handler::update_order_status", skip(app_state, payload), fields(operator = %operator.user_id, next = %payload.status))]
pub async fn update_order_status_handler(
  app_state: web::Data<AppState>,
  operator: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<StatusPayload>,
) -> Result<HttpResponse, AppError> {
  if !app_state.config.is_admin(operator.user_id) {
    warn!("Order status change refused for a non-operator.");
    return Err(AppError::Forbidden(
      "Only marketplace operators may change order status".to_string(),
    ));
  }
  let order = app_state
    .market
    .update_order_status(path.into_inner(), payload.status)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "order": order })))
}
