pub mod admin_service;
pub mod cart_service;
pub mod discount;
pub mod idempotency;
pub mod inventory;
pub mod notification_service;
pub mod order_service;
pub mod payment_service;
pub mod pricing;
