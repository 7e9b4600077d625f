//! Shared types for the checkout pipeline.

pub mod types;

pub use types::{AttemptId, CartId, CartItemId, CouponId, GuestId, OrderId, OrderItemId, UserId};
