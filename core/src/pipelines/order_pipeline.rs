//! Order assembly: validate, check stock, price, persist.

use super::common_steps;
use super::contexts::{LineRequest, PlaceOrderCtx};
use crate::error::{MarketError, Result};
use crate::flow::{ContextData, Pipeline, PipelineControl, Registry};
use crate::model::{Amount, Order, OrderItem, OrderOwner, OrderStatus, PaymentStatus};
use crate::pricing::{resolve_unit_price, OrderTotals};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{info, instrument};
use uuid::Uuid;

pub const PIPELINE_NAME: &str = "place_order";

pub fn register_place_order_pipeline(registry: &Registry<MarketError>) {
  let mut p = Pipeline::<PlaceOrderCtx, MarketError>::new(
    PIPELINE_NAME,
    &[
      ("validate_request", false, None),
      ("load_products", false, None),
      ("check_stock", false, None),
      ("build_order", false, None),
      ("persist_order", false, None),
      ("announce_order", true, None),
    ],
  );

  p.on_root("validate_request", validate_request);
  p.on_root("load_products", load_products);

  p.on_root("check_stock", |ctx: ContextData<PlaceOrderCtx>| {
    Box::pin(async move {
      let guard = ctx.read();
      for (product_id, requested) in requested_quantities(&guard.request.items) {
        let Some(product) = guard.products.get(&product_id) else {
          return Err(MarketError::ProductNotFound(product_id));
        };
        if product.stock < requested {
          return Err(MarketError::InsufficientStock {
            product_id,
            product_name: product.name.clone(),
            requested,
            available: product.stock,
            shortfall: requested - product.stock,
          });
        }
      }
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  p.on_root("build_order", build_order);

  p.on_root("persist_order", |ctx: ContextData<PlaceOrderCtx>| {
    Box::pin(async move {
      let (store, order) = {
        let guard = ctx.read();
        (guard.deps.store.clone(), guard.order.clone())
      };
      let order = order.ok_or_else(|| MarketError::Validation("order was not assembled".to_string()))?;
      store.insert_order(&order).await?;
      info!(order_id = %order.id, total = order.total, items = order.items.len(), "Order persisted.");
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  p.on_root("announce_order", |ctx: ContextData<PlaceOrderCtx>| {
    Box::pin(async move {
      let (notifier, order) = {
        let guard = ctx.read();
        (guard.deps.notifier.clone(), guard.order.clone())
      };
      if let Some(order) = order {
        common_steps::announce_order_best_effort(notifier.as_ref(), &order).await;
      }
      Ok::<_, MarketError>(PipelineControl::Continue)
    })
  });

  registry.register_pipeline(p);
}

/// Requested units per product, summed across variant lines.
fn requested_quantities(items: &[LineRequest]) -> Vec<(Uuid, i32)> {
  let mut totals: Vec<(Uuid, i32)> = Vec::new();
  for line in items {
    match totals.iter_mut().find(|(id, _)| *id == line.product_id) {
      Some((_, qty)) => *qty += line.quantity,
      None => totals.push((line.product_id, line.quantity)),
    }
  }
  totals
}

#[instrument(name = "place_order::validate_request", skip_all, err(Display))]
async fn validate_request(ctx: ContextData<PlaceOrderCtx>) -> Result<PipelineControl> {
  let mut guard = ctx.write();
  let request = &guard.request;

  if request.items.is_empty() {
    return Err(MarketError::Validation("order must contain at least one item".to_string()));
  }
  if let Some(line) = request.items.iter().find(|line| line.quantity <= 0) {
    return Err(MarketError::Validation(format!(
      "quantity for product {} must be positive",
      line.product_id
    )));
  }
  if request.discount < 0 {
    return Err(MarketError::Validation("discount cannot be negative".to_string()));
  }
  if request.shipping_cost.is_some_and(|cost| cost < 0) {
    return Err(MarketError::Validation("shipping cost cannot be negative".to_string()));
  }

  let owner = match (request.user_id, &request.guest) {
    (Some(user_id), None) => OrderOwner::Authenticated {
      user_id,
      shipping_address: request.shipping_address.clone(),
    },
    (None, Some(address)) => {
      let missing = address.missing_fields();
      if !missing.is_empty() {
        return Err(MarketError::Validation(format!(
          "guest checkout is missing: {}",
          missing.join(", ")
        )));
      }
      OrderOwner::Guest {
        shipping_address: address.clone(),
      }
    }
    (Some(_), Some(_)) => {
      return Err(MarketError::Validation(
        "an order belongs to either a user or a guest, not both".to_string(),
      ))
    }
    (None, None) => {
      return Err(MarketError::Validation(
        "either a signed-in user or complete guest details are required".to_string(),
      ))
    }
  };
  guard.owner = Some(owner);
  Ok(PipelineControl::Continue)
}

#[instrument(name = "place_order::load_products", skip_all, err(Display))]
async fn load_products(ctx: ContextData<PlaceOrderCtx>) -> Result<PipelineControl> {
  let (store, wanted) = {
    let guard = ctx.read();
    let wanted: Vec<Uuid> = requested_quantities(&guard.request.items)
      .into_iter()
      .map(|(id, _)| id)
      .collect();
    (guard.deps.store.clone(), wanted)
  };

  let found: HashMap<Uuid, _> = store
    .products_by_ids(&wanted)
    .await?
    .into_iter()
    .map(|p| (p.id, p))
    .collect();
  if let Some(missing) = wanted.iter().find(|id| !found.contains_key(id)) {
    return Err(MarketError::ProductNotFound(*missing));
  }

  ctx.write().products = found;
  Ok(PipelineControl::Continue)
}

#[instrument(name = "place_order::build_order", skip_all, err(Display))]
async fn build_order(ctx: ContextData<PlaceOrderCtx>) -> Result<PipelineControl> {
  let mut guard = ctx.write();
  let order_id = Uuid::new_v4();

  let mut items = Vec::with_capacity(guard.request.items.len());
  for line in &guard.request.items {
    let product = guard
      .products
      .get(&line.product_id)
      .ok_or(MarketError::ProductNotFound(line.product_id))?;
    items.push(OrderItem {
      id: Uuid::new_v4(),
      order_id,
      product_id: product.id,
      variant_id: line.variant_id,
      seller_id: product.seller_id,
      product_name: product.name.clone(),
      quantity: line.quantity,
      unit_price: resolve_unit_price(product, line.variant_id),
    });
  }

  let subtotal: Amount = items.iter().map(OrderItem::line_total).sum();
  if guard.request.discount > subtotal {
    return Err(MarketError::Validation(format!(
      "discount {} exceeds subtotal {}",
      guard.request.discount, subtotal
    )));
  }
  let settings = guard.deps.settings.clone();
  let totals = OrderTotals::compute(
    subtotal,
    guard.request.discount,
    guard.request.shipping_cost.unwrap_or(settings.shipping_cost),
    settings.tax,
  );
  let owner = guard
    .owner
    .clone()
    .ok_or_else(|| MarketError::Validation("order owner was not resolved".to_string()))?;

  let now = Utc::now();
  guard.order = Some(Order {
    id: order_id,
    owner,
    items,
    subtotal: totals.subtotal,
    discount: totals.discount,
    shipping_cost: totals.shipping_cost,
    tax: totals.tax,
    total: totals.total,
    currency: settings.currency.clone(),
    status: OrderStatus::Pending,
    payment_status: PaymentStatus::Pending,
    payment_reference: None,
    created_at: now,
    updated_at: now,
  });
  Ok(PipelineControl::Continue)
}
