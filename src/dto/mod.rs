pub mod admin;
pub mod cart;
pub mod notifications;
pub mod orders;
pub mod payments;
