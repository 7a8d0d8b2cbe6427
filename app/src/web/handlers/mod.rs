pub mod order_handlers;
pub mod payment_handlers;
pub mod seller_handlers;
pub mod webhook_handlers;
