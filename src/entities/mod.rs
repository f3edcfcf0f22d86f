pub mod cart_item;
pub mod order;
pub mod order_item;
pub mod payment;
pub mod product;
pub mod product_variant;
pub mod voucher;
pub mod wallet;
pub mod wallet_transaction;
