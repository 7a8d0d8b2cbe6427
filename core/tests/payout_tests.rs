// tests/payout_tests.rs
mod common;

use async_trait::async_trait;
use bazaar::mock::MockTransferGateway;
use bazaar::ports::gateway::GatewayTransferStatus;
use bazaar::ports::{GatewayError, MarketStore, PayoutOutcome, TransferGateway, TransferReceipt, TransferRequest};
use bazaar::{
  MarketDeps, MarketError, Marketplace, MemoryStore, NotificationKind, PayoutMethod, PayoutRequest, PayoutStatus, Seller,
};
use common::*;
use serial_test::serial;
use std::sync::Arc;
use uuid::Uuid;

fn bank_request(seller: &Seller, amount: i64) -> PayoutRequest {
  PayoutRequest {
    seller_id: seller.id,
    amount,
    method: PayoutMethod::BankTransfer,
    account_details: serde_json::json!({"account_bank": "044", "account_number": "0690000040"}),
  }
}

/// A seller with 5000 of settled revenue.
async fn earning_seller(h: &Harness) -> Seller {
  let seller = h.seed_seller("Adire House");
  let tote = h.seed_product(&seller, "Tote", 1000, 20);
  h.settled_order(Uuid::new_v4(), &[(&tote, 5)]).await;
  seller
}

#[tokio::test]
async fn bank_payout_moves_to_processing() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;

  let payout = h.market.request_payout(bank_request(&seller, 3000)).await.expect("payout");
  assert_eq!(payout.status, PayoutStatus::Processing);
  assert!(payout.reference.starts_with("PAYOUT-"));
  assert!(payout.external_transfer_id.is_some());

  let requests = h.transfers.requests();
  assert_eq!(requests.len(), 1);
  assert_eq!(requests[0].0, PayoutMethod::BankTransfer);
  assert_eq!(requests[0].1.reference, payout.reference);
  assert_eq!(requests[0].1.amount, 3000);

  let balance = h.market.seller_balance(seller.id).await.expect("balance");
  assert_eq!(balance.revenue, 5000);
  assert_eq!(balance.in_flight_payouts, 3000);
  assert_eq!(balance.available(), 2000);

  let notes = h.notifier.created_for(seller.user_id);
  assert_eq!(notes.last().map(|n| n.kind), Some(NotificationKind::PayoutProcessing));
}

#[tokio::test]
async fn mobile_money_uses_its_own_transfer_route() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  let request = PayoutRequest {
    method: PayoutMethod::MobileMoney,
    account_details: serde_json::json!({"account_bank": "MPS", "account_number": "233542773934"}),
    ..bank_request(&seller, 2000)
  };

  h.market.request_payout(request).await.expect("payout");
  assert_eq!(h.transfers.requests()[0].0, PayoutMethod::MobileMoney);
}

#[tokio::test]
async fn over_withdrawal_and_tiny_payouts_are_rejected() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;

  let err = h.market.request_payout(bank_request(&seller, 5001)).await.expect_err("too much");
  assert!(matches!(
    err,
    MarketError::InsufficientBalance {
      requested: 5001,
      available: 5000
    }
  ));

  let err = h.market.request_payout(bank_request(&seller, 999)).await.expect_err("too little");
  assert!(matches!(err, MarketError::BelowMinimum { requested: 999, minimum: 1000 }));

  assert!(h.store.payouts_for(seller.id).is_empty());
  assert!(h.transfers.requests().is_empty());
}

#[tokio::test]
async fn sellers_without_revenue_cannot_withdraw() {
  let h = Harness::new();
  let seller = h.seed_seller("New Stall");
  let err = h.market.request_payout(bank_request(&seller, 1000)).await.expect_err("nothing earned");
  assert!(matches!(err, MarketError::InsufficientBalance { available: 0, .. }));

  let unknown = Seller::new(Uuid::new_v4(), "Nobody");
  assert!(matches!(
    h.market.request_payout(bank_request(&unknown, 1000)).await,
    Err(MarketError::SellerNotFound(_))
  ));
}

#[tokio::test]
async fn rejected_transfer_fails_the_payout_and_frees_the_balance() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  h.transfers.reject(PayoutMethod::BankTransfer, "Account resolve failed");

  let err = h.market.request_payout(bank_request(&seller, 4000)).await.expect_err("rejected");
  match err {
    MarketError::TransferFailed { reason, .. } => assert_eq!(reason, "Account resolve failed"),
    other => panic!("unexpected error: {other}"),
  }

  let payouts = h.store.payouts_for(seller.id);
  assert_eq!(payouts.len(), 1);
  assert_eq!(payouts[0].status, PayoutStatus::Failed);
  assert_eq!(payouts[0].failure_reason.as_deref(), Some("Account resolve failed"));
  assert_eq!(h.market.get_available_balance(seller.id).await.expect("balance"), 5000);

  h.transfers.clear_rejections();
  let retry = h.market.request_payout(bank_request(&seller, 4000)).await.expect("retry");
  assert_eq!(retry.status, PayoutStatus::Processing);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_withdrawals_cannot_exceed_the_balance() {
  let h = Arc::new(Harness::new());
  let seller = earning_seller(&h).await;

  let tasks: Vec<_> = (0..5)
    .map(|_| {
      let h = h.clone();
      let request = bank_request(&seller, 2000);
      tokio::spawn(async move { h.market.request_payout(request).await })
    })
    .collect();

  let mut accepted = 0;
  for task in futures::future::join_all(tasks).await {
    match task.expect("task joins") {
      Ok(_) => accepted += 1,
      Err(MarketError::InsufficientBalance { .. }) => {}
      Err(other) => panic!("unexpected error: {other}"),
    }
  }

  assert_eq!(accepted, 2);
  let balance = h.market.seller_balance(seller.id).await.expect("balance");
  assert_eq!(balance.in_flight_payouts, 4000);
  assert!(balance.available() >= 0);
}

#[tokio::test]
async fn transfer_webhook_completes_the_payout_once() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  let payout = h.market.request_payout(bank_request(&seller, 3000)).await.expect("payout");

  let payload = transfer_event(&payout.reference, "SUCCESSFUL", "Transaction was successful");
  let signature = h.transfers.sign(&payload);

  let done = h.market.handle_transfer_webhook(&signature, &payload).await.expect("applies");
  assert_eq!(done.status, PayoutStatus::Completed);
  assert!(done.completed_at.is_some());

  let replay = h.market.handle_transfer_webhook(&signature, &payload).await.expect("replay is a no-op");
  assert_eq!(replay.status, PayoutStatus::Completed);
  assert_eq!(replay.completed_at, done.completed_at);

  let completed_notes = h
    .notifier
    .created_for(seller.user_id)
    .into_iter()
    .filter(|n| n.kind == NotificationKind::PayoutCompleted)
    .count();
  assert_eq!(completed_notes, 1);

  let balance = h.market.seller_balance(seller.id).await.expect("balance");
  assert_eq!(balance.completed_payouts, 3000);
  assert_eq!(balance.available(), 2000);
}

#[tokio::test]
async fn transfer_webhook_failure_returns_funds() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  let payout = h.market.request_payout(bank_request(&seller, 3000)).await.expect("payout");

  let payload = transfer_event(&payout.reference, "FAILED", "Insufficient funds in merchant wallet");
  let failed = h
    .market
    .handle_transfer_webhook(&h.transfers.sign(&payload), &payload)
    .await
    .expect("applies");
  assert_eq!(failed.status, PayoutStatus::Failed);
  assert_eq!(failed.failure_reason.as_deref(), Some("Insufficient funds in merchant wallet"));

  // A late success cannot resurrect a terminal payout.
  let late = transfer_event(&payout.reference, "SUCCESSFUL", "ok");
  let still = h
    .market
    .handle_transfer_webhook(&h.transfers.sign(&late), &late)
    .await
    .expect("no-op");
  assert_eq!(still.status, PayoutStatus::Failed);
  assert_eq!(h.market.get_available_balance(seller.id).await.expect("balance"), 5000);
}

#[tokio::test]
async fn transfer_webhook_is_authenticated_and_matched_by_payout_reference() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  let payout = h.market.request_payout(bank_request(&seller, 3000)).await.expect("payout");

  let payload = transfer_event(&payout.reference, "SUCCESSFUL", "ok");
  let err = h
    .market
    .handle_transfer_webhook("deadbeef", &payload)
    .await
    .expect_err("bad signature");
  assert!(matches!(err, MarketError::InvalidSignature));
  assert_eq!(h.store.payouts_for(seller.id)[0].status, PayoutStatus::Processing);

  // An order payment reference is not a payout reference.
  let order_ref = h.store.get_order_references().into_iter().next().expect("one settled order");
  let stray = transfer_event(&order_ref, "SUCCESSFUL", "ok");
  let err = h
    .market
    .handle_transfer_webhook(&h.transfers.sign(&stray), &stray)
    .await
    .expect_err("unknown payout");
  assert!(matches!(err, MarketError::PayoutNotFound(_)));
}

#[tokio::test]
async fn refresh_polls_the_gateway_for_a_final_status() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  let payout = h.market.request_payout(bank_request(&seller, 3000)).await.expect("payout");
  let transfer_id = payout.external_transfer_id.clone().expect("transfer id");

  let unchanged = h.market.refresh_payout(payout.id).await.expect("still pending");
  assert_eq!(unchanged.status, PayoutStatus::Processing);

  h.transfers.set_transfer_status(&transfer_id, GatewayTransferStatus::Successful);
  let done = h.market.refresh_payout(payout.id).await.expect("completes");
  assert_eq!(done.status, PayoutStatus::Completed);

  let again = h.market.refresh_payout(payout.id).await.expect("terminal payouts are returned as-is");
  assert_eq!(again.status, PayoutStatus::Completed);

  assert!(matches!(
    h.market.refresh_payout(Uuid::new_v4()).await,
    Err(MarketError::PayoutNotFound(_))
  ));
}

/// Lets the transfer's completion land in the store before the submit call
/// returns, as a fast webhook would.
struct CompletesBeforeReturning {
  store: Arc<MemoryStore>,
  inner: MockTransferGateway,
}

#[async_trait]
impl TransferGateway for CompletesBeforeReturning {
  async fn initiate_bank_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    let receipt = self.inner.initiate_bank_transfer(request).await?;
    self
      .store
      .finish_payout(&request.reference, &PayoutOutcome::Completed)
      .await
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    Ok(receipt)
  }

  async fn initiate_mobile_money_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError> {
    self.inner.initiate_mobile_money_transfer(request).await
  }

  async fn transfer_status(&self, transfer_id: &str) -> Result<GatewayTransferStatus, GatewayError> {
    self.inner.transfer_status(transfer_id).await
  }

  fn verify_webhook_signature(&self, signature: &str, raw_payload: &[u8]) -> bool {
    self.inner.verify_webhook_signature(signature, raw_payload)
  }
}

#[tokio::test]
async fn transfer_completed_during_submission_keeps_its_transfer_id() {
  let h = Harness::new();
  let seller = earning_seller(&h).await;
  let market = Marketplace::new(MarketDeps {
    store: h.store.clone(),
    payments: h.payments.clone(),
    transfers: Arc::new(CompletesBeforeReturning {
      store: h.store.clone(),
      inner: MockTransferGateway::default(),
    }),
    notifier: h.notifier.clone(),
    cache: h.cache.clone(),
    settings: Arc::new(bazaar::MarketSettings::default()),
  });

  let payout = market.request_payout(bank_request(&seller, 3000)).await.expect("payout");
  assert_eq!(payout.status, PayoutStatus::Completed);
  assert!(payout.external_transfer_id.is_some());

  let stored = h.store.payout(payout.id).await.expect("read").expect("stored");
  assert_eq!(stored.status, PayoutStatus::Completed);
  assert_eq!(stored.external_transfer_id, payout.external_transfer_id);
  assert!(h
    .notifier
    .created_for(seller.user_id)
    .iter()
    .all(|n| n.kind != NotificationKind::PayoutProcessing));
}
