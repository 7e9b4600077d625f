//! Persistence for carts, orders, coupons and the checkout journal.
//!
//! Every store trait has an in-memory implementation (used by tests and the
//! demo binary) and a PostgreSQL implementation with the same semantics.

pub mod error;
pub mod journal;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use journal::{JournalEntry, JournalEntryBuilder, Sequence};
pub use memory::{InMemoryStore, PlaceOrderFailure};
pub use postgres::PostgresStore;
pub use store::{CartStore, CheckoutJournal, ConsolidationOutcome, CouponStore, OrderLedger};
