// tests/settlement_tests.rs
mod common;

use bazaar::ports::gateway::GatewayPaymentStatus;
use bazaar::ports::{product_cache_key, CatalogCache};
use bazaar::{MarketError, NotificationKind, OrderStatus, PaymentStatus, SettlementOutcome};
use common::*;
use serial_test::serial;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn end_to_end_order_payment_and_accrual() {
  let h = Harness::new();
  let seller_a = h.seed_seller("Adire House");
  let seller_b = h.seed_seller("Kente Corner");
  let product_a = h.seed_product(&seller_a, "Tote", 1000, 5);
  let product_b = h.seed_product(&seller_b, "Stole", 2000, 3);
  let buyer = Uuid::new_v4();

  let order = h.place_order(buyer, &[(&product_a, 2), (&product_b, 1)]).await;
  assert_eq!(order.subtotal, 4000);
  assert_eq!(order.total, 5500);

  let (init, transaction_id) = h.start_payment(&order, Some(buyer)).await;
  let pending = h.order_now(&order);
  assert_eq!(pending.payment_status, PaymentStatus::Processing);
  assert_eq!(pending.payment_reference.as_deref(), Some(init.reference.as_str()));
  assert!(init.payment_url.contains(&init.reference));

  let report = h.market.settle_payment(&transaction_id).await.expect("settles");
  assert_eq!(report.outcome, SettlementOutcome::Settled);
  assert_eq!(report.order_id, order.id);

  let settled = h.order_now(&order);
  assert_eq!(settled.payment_status, PaymentStatus::Completed);
  assert_eq!(settled.status, OrderStatus::Processing);
  assert_eq!(h.stock_of(&product_a), 3);
  assert_eq!(h.stock_of(&product_b), 2);

  let a = h.seller_now(&seller_a);
  let b = h.seller_now(&seller_b);
  assert_eq!((a.total_sales, a.total_orders), (2000, 1));
  assert_eq!((b.total_sales, b.total_orders), (2000, 1));

  for seller in [&seller_a, &seller_b] {
    let notes = h.store.get_notifications(seller.user_id);
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].kind, NotificationKind::NewOrder);
  }
  let buyer_notes = h.notifier.created_for(buyer);
  assert_eq!(buyer_notes.len(), 1);
  assert_eq!(buyer_notes[0].kind, NotificationKind::PaymentSuccess);

  assert_eq!(h.market.get_available_balance(seller_a.id).await.expect("balance"), 2000);
}

#[tokio::test]
async fn settling_twice_accrues_once() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 2)]).await;
  let (_, transaction_id) = h.start_payment(&order, Some(buyer)).await;

  let first = h.market.settle_payment(&transaction_id).await.expect("first");
  let second = h.market.settle_payment(&transaction_id).await.expect("replay is not an error");

  assert_eq!(first.outcome, SettlementOutcome::Settled);
  assert_eq!(second.outcome, SettlementOutcome::AlreadySettled);
  assert_eq!(h.stock_of(&tote), 3);
  assert_eq!(h.seller_now(&seller).total_sales, 2000);
  assert_eq!(h.seller_now(&seller).total_orders, 1);
  assert_eq!(h.order_now(&order).payment_status, PaymentStatus::Completed);
  assert_eq!(h.store.get_notifications(seller.user_id).len(), 1);
  assert_eq!(h.notifier.created_for(buyer).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_verify_and_webhooks_settle_once() {
  let h = Arc::new(Harness::new());
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 50);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 4)]).await;
  let (init, transaction_id) = h.start_payment(&order, Some(buyer)).await;

  let payload = charge_event(&init.reference, &transaction_id, "successful", order.total);
  let signature = h.payments.sign(&payload);

  let mut tasks = Vec::new();
  for i in 0..8 {
    let h = h.clone();
    let (payload, signature, transaction_id) = (payload.clone(), signature.clone(), transaction_id.clone());
    tasks.push(tokio::spawn(async move {
      if i % 2 == 0 {
        h.market.settle_payment(&transaction_id).await
      } else {
        h.market.handle_payment_webhook(&signature, &payload).await
      }
    }));
  }

  let mut settled = 0;
  for task in futures::future::join_all(tasks).await {
    let report = task.expect("task joins").expect("every delivery succeeds");
    if report.outcome == SettlementOutcome::Settled {
      settled += 1;
    } else {
      assert_eq!(report.outcome, SettlementOutcome::AlreadySettled);
    }
  }

  assert_eq!(settled, 1);
  assert_eq!(h.stock_of(&tote), 46);
  assert_eq!(h.seller_now(&seller).total_sales, 4000);
  assert_eq!(h.seller_now(&seller).total_orders, 1);
}

#[tokio::test]
async fn webhook_with_bad_signature_changes_nothing() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;
  let (init, transaction_id) = h.start_payment(&order, Some(buyer)).await;

  let payload = charge_event(&init.reference, &transaction_id, "successful", order.total);
  let forged = bazaar::ports::gateway::sign_payload("not-the-secret", &payload);

  let err = h
    .market
    .handle_payment_webhook(&forged, &payload)
    .await
    .expect_err("forged signature");
  assert!(matches!(err, MarketError::InvalidSignature));
  assert_eq!(h.order_now(&order).payment_status, PaymentStatus::Processing);
  assert_eq!(h.stock_of(&tote), 5);
}

#[tokio::test]
async fn webhook_settles_on_its_own() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let order = h.market.create_order(guest_request(&[(&tote, 1)])).await.expect("guest order");
  let (init, transaction_id) = h.start_payment(&order, None).await;

  let payload = charge_event(&init.reference, &transaction_id, "successful", order.total);
  let report = h
    .market
    .handle_payment_webhook(&h.payments.sign(&payload), &payload)
    .await
    .expect("webhook settles");

  assert_eq!(report.outcome, SettlementOutcome::Settled);
  assert_eq!(report.reference, init.reference);
  assert_eq!(h.stock_of(&tote), 4);
  // Guests have no account to notify.
  assert!(h.notifier.created().is_empty());
}

#[tokio::test]
async fn failed_payment_leaves_ledger_alone_and_can_be_retried() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;
  let (init, _) = h.start_payment(&order, Some(buyer)).await;

  h.payments
    .script_verification("TX-DECLINED", &init.reference, GatewayPaymentStatus::Failed, order.total);
  let report = h.market.settle_payment("TX-DECLINED").await.expect("failure is an outcome");
  assert_eq!(report.outcome, SettlementOutcome::Failed);
  assert_eq!(h.order_now(&order).payment_status, PaymentStatus::Failed);
  assert_eq!(h.stock_of(&tote), 5);
  assert_eq!(h.seller_now(&seller).total_sales, 0);
  assert_eq!(h.notifier.created_for(buyer)[0].kind, NotificationKind::PaymentFailed);

  let (retry, transaction_id) = h.start_payment(&order, Some(buyer)).await;
  assert_ne!(retry.reference, init.reference);
  let report = h.market.settle_payment(&transaction_id).await.expect("retry settles");
  assert_eq!(report.outcome, SettlementOutcome::Settled);
  assert_eq!(h.stock_of(&tote), 4);
}

#[tokio::test]
async fn underpaid_success_is_treated_as_failure() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;
  let (init, _) = h.start_payment(&order, Some(buyer)).await;

  h.payments
    .script_verification("TX-SHORT", &init.reference, GatewayPaymentStatus::Successful, order.total - 1);
  let report = h.market.settle_payment("TX-SHORT").await.expect("outcome");
  assert_eq!(report.outcome, SettlementOutcome::Failed);
  assert_eq!(h.stock_of(&tote), 5);
}

#[tokio::test]
async fn pending_gateway_status_changes_nothing() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;
  let (init, _) = h.start_payment(&order, Some(buyer)).await;

  h.payments
    .script_verification("TX-WAIT", &init.reference, GatewayPaymentStatus::Pending, order.total);
  let report = h.market.settle_payment("TX-WAIT").await.expect("outcome");
  assert_eq!(report.outcome, SettlementOutcome::Pending);
  assert_eq!(h.order_now(&order).payment_status, PaymentStatus::Processing);
}

#[tokio::test]
async fn unknown_reference_is_rejected() {
  let h = Harness::new();
  h.payments
    .script_verification("TX-STRAY", "ORD-nobody", GatewayPaymentStatus::Successful, 1000);
  let err = h.market.settle_payment("TX-STRAY").await.expect_err("no such order");
  assert!(matches!(err, MarketError::UnknownPaymentReference(ref r) if r == "ORD-nobody"));
}

#[tokio::test]
async fn initialization_requires_a_payable_order_of_the_requester() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;

  let stranger = h
    .market
    .initialize_payment(order.id, Some(Uuid::new_v4()), "https://shop.test/done", None)
    .await;
  assert!(matches!(stranger, Err(MarketError::OrderNotFoundOrAlreadyPaid(_))));

  h.start_payment(&order, Some(buyer)).await;
  let again = h
    .market
    .initialize_payment(order.id, Some(buyer), "https://shop.test/done", None)
    .await;
  assert!(matches!(again, Err(MarketError::OrderNotFoundOrAlreadyPaid(_))));

  let missing = h.market.initialize_payment(Uuid::new_v4(), None, "https://shop.test/done", None).await;
  assert!(matches!(missing, Err(MarketError::OrderNotFoundOrAlreadyPaid(_))));
}

#[tokio::test]
async fn gateway_outage_is_retryable_and_leaves_order_pending() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;

  h.payments.set_initiation_failure(true);
  let err = h
    .market
    .initialize_payment(order.id, Some(buyer), "https://shop.test/done", Some("b@example.com".into()))
    .await
    .expect_err("gateway down");
  assert!(err.is_retryable());
  let stored = h.order_now(&order);
  assert_eq!(stored.payment_status, PaymentStatus::Pending);
  assert_eq!(stored.payment_reference, None);

  h.payments.set_initiation_failure(false);
  h.start_payment(&order, Some(buyer)).await;
  assert_eq!(h.order_now(&order).payment_status, PaymentStatus::Processing);
}

#[tokio::test]
async fn settlement_invalidates_cached_catalog_entries() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let untouched = h.seed_product(&seller, "Stole", 1000, 5);
  h.cache.put(&product_cache_key(tote.id), serde_json::json!({"stock": 5}));
  h.cache.put(&product_cache_key(untouched.id), serde_json::json!({"stock": 5}));
  h.cache.put("catalog:featured", serde_json::json!([tote.id]));

  h.settled_order(Uuid::new_v4(), &[(&tote, 1)]).await;

  assert!(h.cache.get(&product_cache_key(tote.id)).is_none());
  assert!(h.cache.get("catalog:featured").is_none());
  assert!(h.cache.get(&product_cache_key(untouched.id)).is_some());
}

#[tokio::test]
async fn notification_failures_never_fail_settlement() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;
  let (_, transaction_id) = h.start_payment(&order, Some(buyer)).await;

  h.notifier.set_failing(true);
  let report = h.market.settle_payment(&transaction_id).await.expect("settles anyway");
  assert_eq!(report.outcome, SettlementOutcome::Settled);
  assert_eq!(h.stock_of(&tote), 4);
}

#[tokio::test]
async fn cancelled_order_cannot_start_a_payment() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 1)]).await;
  h.market
    .update_order_status(order.id, OrderStatus::Cancelled)
    .await
    .expect("cancel");

  let init = h
    .market
    .initialize_payment(order.id, Some(buyer), "https://shop.test/done", Some("b@example.com".into()))
    .await;
  assert!(matches!(init, Err(MarketError::OrderNotFoundOrAlreadyPaid(_))));
  assert_eq!(h.order_now(&order).payment_reference, None);
}

#[tokio::test]
async fn payment_for_order_cancelled_mid_flight_is_flagged_for_refund() {
  let h = Harness::new();
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 5);
  let buyer = Uuid::new_v4();
  let order = h.place_order(buyer, &[(&tote, 2)]).await;
  let (init, transaction_id) = h.start_payment(&order, Some(buyer)).await;
  h.market
    .update_order_status(order.id, OrderStatus::Cancelled)
    .await
    .expect("cancel while payment is processing");

  let report = h.market.settle_payment(&transaction_id).await.expect("outcome");
  assert_eq!(report.outcome, SettlementOutcome::RefundDue);

  let payload = charge_event(&init.reference, &transaction_id, "successful", order.total);
  let replay = h
    .market
    .handle_payment_webhook(&h.payments.sign(&payload), &payload)
    .await
    .expect("webhook outcome");
  assert_eq!(replay.outcome, SettlementOutcome::RefundDue);

  let stored = h.order_now(&order);
  assert_eq!(stored.status, OrderStatus::Cancelled);
  assert_ne!(stored.payment_status, PaymentStatus::Completed);
  assert_eq!(h.stock_of(&tote), 5);
  assert_eq!(h.seller_now(&seller).total_sales, 0);
  assert!(h.store.get_notifications(seller.user_id).is_empty());
  assert_eq!(h.market.get_available_balance(seller.id).await.expect("balance"), 0);
}
