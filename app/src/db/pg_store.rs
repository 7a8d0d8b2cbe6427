use super::rows::{parse_text, NotificationRow, OrderItemRow, OrderRow, PayoutRow, ProductRow, SellerRow, VariantRow};
use async_trait::async_trait;
use bazaar::ledger::AccrualPlan;
use bazaar::model::NewNotification;
use bazaar::ports::{MarketStore, PayoutOutcome, PayoutReservation, PayoutTransition, SettlementCommit};
use bazaar::{
  Notification, Order, OrderOwner, OrderStatus, PaymentStatus, Product, Seller, SellerBalance, SellerPayout, StoreError,
  StoreResult, Variant,
};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use tracing::{debug, instrument};
use uuid::Uuid;

const ORDER_COLUMNS: &str = "id, user_id, is_guest, shipping_address, subtotal, discount, shipping_cost, tax, total, \
  currency, status, payment_status, payment_reference, created_at, updated_at";

const PAYOUT_COLUMNS: &str = "id, seller_id, amount, currency, method, account_details, reference, status, \
  external_transfer_id, failure_reason, created_at, updated_at, completed_at";

const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, title, message, is_read, created_at";

fn store_err(err: sqlx::Error) -> StoreError {
  if let sqlx::Error::Database(db) = &err {
    if db.is_unique_violation() {
      return StoreError::Conflict(db.message().to_string());
    }
  }
  if matches!(err, sqlx::Error::RowNotFound) {
    return StoreError::NotFound("row".to_string());
  }
  StoreError::Backend(err.into())
}

/// `MarketStore` over Postgres.
///
/// Settlement and payout reservation each run in one transaction; the
/// idempotency guard is the conditional UPDATE checked by affected rows.
#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

async fn load_order(conn: &mut PgConnection, order_id: Uuid) -> StoreResult<Option<Order>> {
  let row = sqlx::query_as::<_, OrderRow>(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
    .bind(order_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(store_err)?;
  let Some(row) = row else {
    return Ok(None);
  };
  let items = sqlx::query_as::<_, OrderItemRow>(
    "SELECT id, order_id, product_id, variant_id, seller_id, product_name, quantity, unit_price \
     FROM order_items WHERE order_id = $1 ORDER BY product_name, id",
  )
  .bind(order_id)
  .fetch_all(&mut *conn)
  .await
  .map_err(store_err)?;
  row.into_order(items.into_iter().map(Into::into).collect()).map(Some)
}

async fn balance_on(conn: &mut PgConnection, seller_id: Uuid) -> StoreResult<SellerBalance> {
  let revenue: i64 = sqlx::query_scalar(
    "SELECT COALESCE(SUM(oi.unit_price * oi.quantity), 0)::BIGINT \
     FROM order_items oi JOIN orders o ON o.id = oi.order_id \
     WHERE oi.seller_id = $1 AND o.payment_status = 'completed'",
  )
  .bind(seller_id)
  .fetch_one(&mut *conn)
  .await
  .map_err(store_err)?;

  let (completed_payouts, in_flight_payouts): (i64, i64) = sqlx::query_as(
    "SELECT COALESCE(SUM(amount) FILTER (WHERE status = 'completed'), 0)::BIGINT, \
            COALESCE(SUM(amount) FILTER (WHERE status IN ('pending', 'processing')), 0)::BIGINT \
     FROM seller_payouts WHERE seller_id = $1",
  )
  .bind(seller_id)
  .fetch_one(&mut *conn)
  .await
  .map_err(store_err)?;

  Ok(SellerBalance {
    revenue,
    completed_payouts,
    in_flight_payouts,
  })
}

#[async_trait]
impl MarketStore for PgStore {
  async fn products_by_ids(&self, ids: &[Uuid]) -> StoreResult<Vec<Product>> {
    let rows = sqlx::query_as::<_, ProductRow>(
      "SELECT id, seller_id, name, price, sale_price, stock, total_sales, is_active \
       FROM products WHERE id = ANY($1) AND is_active",
    )
    .bind(ids)
    .fetch_all(&self.pool)
    .await
    .map_err(store_err)?;

    let found: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let variant_rows = sqlx::query_as::<_, VariantRow>(
      "SELECT id, product_id, name, price FROM product_variants WHERE product_id = ANY($1) ORDER BY name",
    )
    .bind(&found)
    .fetch_all(&self.pool)
    .await
    .map_err(store_err)?;

    let mut variants: HashMap<Uuid, Vec<Variant>> = HashMap::new();
    for row in variant_rows {
      variants.entry(row.product_id).or_default().push(row.into());
    }
    Ok(
      rows
        .into_iter()
        .map(|row| {
          let own = variants.remove(&row.id).unwrap_or_default();
          row.into_product(own)
        })
        .collect(),
    )
  }

  #[instrument(name = "PgStore::insert_order", skip_all, fields(order_id = %order.id), err(Display))]
  async fn insert_order(&self, order: &Order) -> StoreResult<()> {
    let mut tx = self.pool.begin().await.map_err(store_err)?;
    let (user_id, shipping_address) = match &order.owner {
      OrderOwner::Authenticated {
        user_id,
        shipping_address,
      } => (Some(*user_id), shipping_address.clone()),
      OrderOwner::Guest { shipping_address } => (None, Some(shipping_address.clone())),
    };

    sqlx::query(
      "INSERT INTO orders (id, user_id, is_guest, shipping_address, subtotal, discount, shipping_cost, tax, total, \
         currency, status, payment_status, payment_reference, created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
    )
    .bind(order.id)
    .bind(user_id)
    .bind(order.owner.is_guest())
    .bind(shipping_address.map(Json))
    .bind(order.subtotal)
    .bind(order.discount)
    .bind(order.shipping_cost)
    .bind(order.tax)
    .bind(order.total)
    .bind(&order.currency)
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(order.payment_reference.as_deref())
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;

    for item in &order.items {
      sqlx::query(
        "INSERT INTO order_items (id, order_id, product_id, variant_id, seller_id, product_name, quantity, unit_price) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
      )
      .bind(item.id)
      .bind(order.id)
      .bind(item.product_id)
      .bind(item.variant_id)
      .bind(item.seller_id)
      .bind(&item.product_name)
      .bind(item.quantity)
      .bind(item.unit_price)
      .execute(&mut *tx)
      .await
      .map_err(store_err)?;
    }

    tx.commit().await.map_err(store_err)
  }

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
    let mut conn = self.pool.acquire().await.map_err(store_err)?;
    load_order(&mut conn, order_id).await
  }

  async fn order_by_reference(&self, payment_reference: &str) -> StoreResult<Option<Order>> {
    let mut conn = self.pool.acquire().await.map_err(store_err)?;
    let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM orders WHERE payment_reference = $1")
      .bind(payment_reference)
      .fetch_optional(&mut *conn)
      .await
      .map_err(store_err)?;
    match id {
      Some(id) => load_order(&mut conn, id).await,
      None => Ok(None),
    }
  }

  async fn attach_payment_reference(&self, order_id: Uuid, payment_reference: &str) -> StoreResult<bool> {
    let result = sqlx::query(
      "UPDATE orders SET payment_reference = $2, payment_status = 'processing', updated_at = now() \
       WHERE id = $1 AND payment_status IN ('pending', 'failed') AND status IN ('pending', 'confirmed')",
    )
    .bind(order_id)
    .bind(payment_reference)
    .execute(&self.pool)
    .await
    .map_err(store_err)?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(name = "PgStore::commit_settlement", skip_all, fields(order_id = %plan.order_id), err(Display))]
  async fn commit_settlement(&self, plan: &AccrualPlan) -> StoreResult<SettlementCommit> {
    let mut tx = self.pool.begin().await.map_err(store_err)?;

    let flipped = sqlx::query(
      "UPDATE orders SET payment_status = 'completed', status = 'processing', updated_at = now() \
       WHERE id = $1 AND payment_status <> 'completed' AND status IN ('pending', 'confirmed')",
    )
    .bind(plan.order_id)
    .execute(&mut *tx)
    .await
    .map_err(store_err)?;

    if flipped.rows_affected() == 0 {
      let current: Option<(String, String)> =
        sqlx::query_as("SELECT payment_status, status FROM orders WHERE id = $1")
          .bind(plan.order_id)
          .fetch_optional(&mut *tx)
          .await
          .map_err(store_err)?;
      tx.rollback().await.map_err(store_err)?;
      let Some((payment_status, status)) = current else {
        return Err(StoreError::NotFound(format!("order {}", plan.order_id)));
      };
      return unsettled_commit(&payment_status, &status);
    }

    for decrement in &plan.stock {
      sqlx::query(
        "UPDATE products SET stock = stock - $2, total_sales = total_sales + $2, updated_at = now() WHERE id = $1",
      )
      .bind(decrement.product_id)
      .bind(decrement.quantity)
      .execute(&mut *tx)
      .await
      .map_err(store_err)?;
    }

    for credit in &plan.sellers {
      let seller_user: Option<Uuid> = sqlx::query_scalar(
        "UPDATE sellers SET total_sales = total_sales + $2, total_orders = total_orders + 1 \
         WHERE id = $1 RETURNING user_id",
      )
      .bind(credit.seller_id)
      .bind(credit.revenue)
      .fetch_optional(&mut *tx)
      .await
      .map_err(store_err)?;
      let Some(seller_user) = seller_user else {
        debug!(seller_id = %credit.seller_id, "Seller missing during accrual, skipping credit.");
        continue;
      };
      insert_notification_on(&mut tx, credit.notification(seller_user, plan.order_id, &plan.currency)).await?;
    }

    let order = load_order(&mut tx, plan.order_id)
      .await?
      .ok_or_else(|| StoreError::NotFound(format!("order {}", plan.order_id)))?;
    tx.commit().await.map_err(store_err)?;
    Ok(SettlementCommit::Applied { order })
  }

  async fn mark_payment_failed(&self, order_id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query(
      "UPDATE orders SET payment_status = 'failed', updated_at = now() \
       WHERE id = $1 AND payment_status <> 'completed'",
    )
    .bind(order_id)
    .execute(&self.pool)
    .await
    .map_err(store_err)?;
    Ok(result.rows_affected() == 1)
  }

  async fn transition_order_status(&self, order_id: Uuid, from: OrderStatus, to: OrderStatus) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE orders SET status = $3, updated_at = now() WHERE id = $1 AND status = $2")
      .bind(order_id)
      .bind(from.as_str())
      .bind(to.as_str())
      .execute(&self.pool)
      .await
      .map_err(store_err)?;
    Ok(result.rows_affected() == 1)
  }

  async fn seller(&self, seller_id: Uuid) -> StoreResult<Option<Seller>> {
    let row = sqlx::query_as::<_, SellerRow>(
      "SELECT id, user_id, store_name, total_sales, total_orders FROM sellers WHERE id = $1",
    )
    .bind(seller_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(store_err)?;
    Ok(row.map(Into::into))
  }

  async fn seller_balance(&self, seller_id: Uuid) -> StoreResult<SellerBalance> {
    let mut conn = self.pool.acquire().await.map_err(store_err)?;
    balance_on(&mut conn, seller_id).await
  }

  #[instrument(name = "PgStore::reserve_payout", skip_all, fields(seller_id = %payout.seller_id, amount = payout.amount), err(Display))]
  async fn reserve_payout(&self, payout: &SellerPayout) -> StoreResult<PayoutReservation> {
    let mut tx = self.pool.begin().await.map_err(store_err)?;

    // Serializes reservations per seller until commit.
    let locked: Option<Uuid> = sqlx::query_scalar("SELECT id FROM sellers WHERE id = $1 FOR UPDATE")
      .bind(payout.seller_id)
      .fetch_optional(&mut *tx)
      .await
      .map_err(store_err)?;
    if locked.is_none() {
      tx.rollback().await.map_err(store_err)?;
      return Err(StoreError::NotFound(format!("seller {}", payout.seller_id)));
    }

    let available = balance_on(&mut tx, payout.seller_id).await?.available();
    if payout.amount > available {
      tx.rollback().await.map_err(store_err)?;
      return Ok(PayoutReservation::Insufficient { available });
    }

    let row = sqlx::query_as::<_, PayoutRow>(&format!(
      "INSERT INTO seller_payouts (id, seller_id, amount, currency, method, account_details, reference, status, \
         created_at, updated_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', $8, $9) RETURNING {}",
      PAYOUT_COLUMNS
    ))
    .bind(payout.id)
    .bind(payout.seller_id)
    .bind(payout.amount)
    .bind(&payout.currency)
    .bind(payout.method.as_str())
    .bind(Json(&payout.account_details))
    .bind(&payout.reference)
    .bind(payout.created_at)
    .bind(payout.updated_at)
    .fetch_one(&mut *tx)
    .await
    .map_err(store_err)?;

    tx.commit().await.map_err(store_err)?;
    Ok(PayoutReservation::Reserved(row.try_into()?))
  }

  async fn mark_payout_processing(&self, payout_id: Uuid, transfer_id: &str) -> StoreResult<Option<SellerPayout>> {
    let row = sqlx::query_as::<_, PayoutRow>(&format!(
      "UPDATE seller_payouts SET \
         status = CASE WHEN status = 'pending' THEN 'processing' ELSE status END, \
         external_transfer_id = COALESCE(external_transfer_id, $2), updated_at = now() \
       WHERE id = $1 RETURNING {}",
      PAYOUT_COLUMNS
    ))
    .bind(payout_id)
    .bind(transfer_id)
    .fetch_optional(&self.pool)
    .await
    .map_err(store_err)?;
    row.map(TryInto::try_into).transpose()
  }

  #[instrument(name = "PgStore::finish_payout", skip(self, outcome), err(Display))]
  async fn finish_payout(&self, reference: &str, outcome: &PayoutOutcome) -> StoreResult<PayoutTransition> {
    let (status, reason) = match outcome {
      PayoutOutcome::Completed => ("completed", None),
      PayoutOutcome::Failed { reason } => ("failed", Some(reason.as_str())),
    };
    let updated = sqlx::query_as::<_, PayoutRow>(&format!(
      "UPDATE seller_payouts SET status = $2, failure_reason = $3, updated_at = now(), \
         completed_at = CASE WHEN $2 = 'completed' THEN now() ELSE completed_at END \
       WHERE reference = $1 AND status IN ('pending', 'processing') RETURNING {}",
      PAYOUT_COLUMNS
    ))
    .bind(reference)
    .bind(status)
    .bind(reason)
    .fetch_optional(&self.pool)
    .await
    .map_err(store_err)?;

    if let Some(row) = updated {
      return Ok(PayoutTransition::Applied(row.try_into()?));
    }
    match self.payout_by_reference(reference).await? {
      Some(payout) => Ok(PayoutTransition::Unchanged(payout)),
      None => Ok(PayoutTransition::NotFound),
    }
  }

  async fn payout(&self, payout_id: Uuid) -> StoreResult<Option<SellerPayout>> {
    let row = sqlx::query_as::<_, PayoutRow>(&format!("SELECT {} FROM seller_payouts WHERE id = $1", PAYOUT_COLUMNS))
      .bind(payout_id)
      .fetch_optional(&self.pool)
      .await
      .map_err(store_err)?;
    row.map(TryInto::try_into).transpose()
  }

  async fn payout_by_reference(&self, reference: &str) -> StoreResult<Option<SellerPayout>> {
    let row = sqlx::query_as::<_, PayoutRow>(&format!(
      "SELECT {} FROM seller_payouts WHERE reference = $1",
      PAYOUT_COLUMNS
    ))
    .bind(reference)
    .fetch_optional(&self.pool)
    .await
    .map_err(store_err)?;
    row.map(TryInto::try_into).transpose()
  }

  async fn insert_notification(&self, notification: NewNotification) -> StoreResult<Notification> {
    let mut conn = self.pool.acquire().await.map_err(store_err)?;
    insert_notification_on(&mut conn, notification).await
  }

  async fn notifications_for(&self, user_id: Uuid) -> StoreResult<Vec<Notification>> {
    let rows = sqlx::query_as::<_, NotificationRow>(&format!(
      "SELECT {} FROM notifications WHERE user_id = $1 ORDER BY created_at DESC",
      NOTIFICATION_COLUMNS
    ))
    .bind(user_id)
    .fetch_all(&self.pool)
    .await
    .map_err(store_err)?;
    rows.into_iter().map(TryInto::try_into).collect()
  }
}

/// Why the conditional settlement UPDATE matched no row.
fn unsettled_commit(payment_status: &str, status: &str) -> StoreResult<SettlementCommit> {
  if parse_text::<PaymentStatus>("payment_status", payment_status)? == PaymentStatus::Completed {
    return Ok(SettlementCommit::AlreadySettled);
  }
  Ok(SettlementCommit::OrderClosed {
    status: parse_text("status", status)?,
  })
}

async fn insert_notification_on(conn: &mut PgConnection, new: NewNotification) -> StoreResult<Notification> {
  let notification = Notification::from_new(new);
  sqlx::query(
    "INSERT INTO notifications (id, user_id, kind, title, message, is_read, created_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7)",
  )
  .bind(notification.id)
  .bind(notification.user_id)
  .bind(notification.kind.as_str())
  .bind(&notification.title)
  .bind(&notification.message)
  .bind(notification.is_read)
  .bind(notification.created_at)
  .execute(&mut *conn)
  .await
  .map_err(store_err)?;
  Ok(notification)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unmatched_settlement_distinguishes_replay_from_closed_order() {
    assert_eq!(
      unsettled_commit("completed", "processing").unwrap(),
      SettlementCommit::AlreadySettled
    );
    assert_eq!(
      unsettled_commit("processing", "cancelled").unwrap(),
      SettlementCommit::OrderClosed {
        status: OrderStatus::Cancelled
      }
    );
    assert!(unsettled_commit("paid", "pending").is_err());
  }
}
