pub mod audit_logs;
pub mod cart_items;
pub mod discount_code_products;
pub mod discount_codes;
pub mod order_items;
pub mod orders;
pub mod payment_confirmations;
pub mod product_variants;
pub mod products;
pub mod user_notifications;
pub mod users;

pub use audit_logs::Entity as AuditLogs;
pub use cart_items::Entity as CartItems;
pub use discount_code_products::Entity as DiscountCodeProducts;
pub use discount_codes::Entity as DiscountCodes;
pub use order_items::Entity as OrderItems;
pub use orders::Entity as Orders;
pub use payment_confirmations::Entity as PaymentConfirmations;
pub use product_variants::Entity as ProductVariants;
pub use products::Entity as Products;
pub use user_notifications::Entity as UserNotifications;
pub use users::Entity as Users;
