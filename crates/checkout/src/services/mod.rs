//! Collaborator traits, in-memory implementations and their resilient wrappers.

pub mod catalog;
pub mod coupons;
pub mod payment;

pub use catalog::{Catalog, CatalogUnavailable, InMemoryCatalog, PriceResolver, PricingError};
pub use coupons::{CouponError, CouponValidator, DiscountOutcome};
pub use payment::{
    AuthorizationOutcome, AuthorizationRequest, GatewayFailure, InMemoryPaymentGateway,
    PaymentAuthorizer, PaymentGateway, ScriptedAuthorization, VoidError,
};
