//! Cart-to-order checkout orchestration.
//!
//! This crate turns a user's cart into an order. A checkout attempt runs
//! these steps:
//! 1. Load the cart (it must have lines)
//! 2. Price every line from the catalog
//! 3. Apply the coupon, if any
//! 4. Authorize payment, if an instrument was supplied
//! 5. Write the order and take the ordered lines out of the cart in one
//!    transaction
//!
//! Every step is journaled per attempt ID, so a retried request resumes
//! where the previous one stopped. A payment captured before a failed
//! write is voided, and a periodic sweep voids payments of attempts left
//! waiting at the payment step. The crate also consolidates a guest cart
//! into a user's cart on sign-in.

pub mod attempt;
pub mod carts;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod locks;
pub mod retry;
pub mod services;
pub mod state;

pub use attempt::CheckoutAttempt;
pub use carts::CartService;
pub use config::{CallTimeouts, CheckoutConfig};
pub use coordinator::{CheckoutCoordinator, CheckoutRequest, CheckoutStore};
pub use error::{CartError, CheckoutError, ConsolidationError, ErrorKind, Result};
pub use events::CheckoutEvent;
pub use locks::{CartGuard, CartLocks};
pub use retry::{RetryPolicy, Transient};
pub use services::{
    AuthorizationOutcome, AuthorizationRequest, Catalog, CatalogUnavailable, CouponError,
    CouponValidator, DiscountOutcome, GatewayFailure, InMemoryCatalog, InMemoryPaymentGateway,
    PaymentAuthorizer, PaymentGateway, PriceResolver, PricingError, ScriptedAuthorization,
    VoidError,
};
pub use state::CheckoutState;
