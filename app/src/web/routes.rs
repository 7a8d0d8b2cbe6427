use actix_web::web;

use crate::web::handlers::{order_handlers, payment_handlers, seller_handlers, webhook_handlers};

async fn health_check_handler() -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route(
            "/{order_id}/status",
            web::patch().to(order_handlers::update_order_status_handler),
          ),
      )
      .service(
        web::scope("/payments")
          .route(
            "/initialize",
            web::post().to(payment_handlers::initialize_payment_handler),
          )
          .route("/verify", web::get().to(payment_handlers::verify_payment_handler)),
      )
      .service(
        web::scope("/webhooks")
          .route("/payments", web::post().to(webhook_handlers::payment_webhook_handler))
          .route("/transfers", web::post().to(webhook_handlers::transfer_webhook_handler)),
      )
      .service(
        web::scope("/sellers")
          .route(
            "/{seller_id}/balance",
            web::get().to(seller_handlers::seller_balance_handler),
          )
          .route(
            "/{seller_id}/payouts",
            web::post().to(seller_handlers::request_payout_handler),
          ),
      )
      .route(
        "/payouts/{payout_id}/refresh",
        web::post().to(seller_handlers::refresh_payout_handler),
      ),
  );
}
