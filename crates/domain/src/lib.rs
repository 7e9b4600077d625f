//! Domain model for the checkout pipeline.
//!
//! This crate holds the pure data types shared by storage and the checkout
//! core:
//! - `Money` and `DiscountPercent` with the documented rounding rule
//! - `Cart`, `CartItem` and `CartOwner`
//! - `Order`, `OrderItem` and the `NewOrder` write model
//! - `Coupon` with its expiry check

pub mod cart;
pub mod coupon;
pub mod error;
pub mod money;
pub mod order;
pub mod value_objects;

pub use cart::{Cart, CartItem, CartOwner};
pub use coupon::{Coupon, CouponRejection};
pub use error::DomainError;
pub use money::{DiscountPercent, Money};
pub use order::{NewOrder, Order, OrderItem, OrderStatus, PricedLine};
pub use value_objects::{ProductId, Quantity, VariantId};
