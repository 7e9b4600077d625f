//! Catalog trait, in-memory implementation and the price resolver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use domain::{DomainError, Money, ProductId, VariantId};
use thiserror::Error;

use crate::retry::{RetryPolicy, Transient, with_retry, within};

/// The catalog could not answer.
#[derive(Debug, Clone, Error)]
#[error("Catalog unavailable: {0}")]
pub struct CatalogUnavailable(pub String);

/// Read access to product and variant prices.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Returns the product's base price, or `None` if the product does not exist.
    async fn product_price(&self, product_id: &ProductId)
    -> Result<Option<Money>, CatalogUnavailable>;

    /// Returns the variant's additional price, or `None` if the variant does not exist.
    async fn variant_price(
        &self,
        product_id: &ProductId,
        variant_id: &VariantId,
    ) -> Result<Option<Money>, CatalogUnavailable>;
}

/// Errors from resolving a unit price.
#[derive(Debug, Clone, Error)]
pub enum PricingError {
    /// The product, or the requested variant of it, is not in the catalog.
    #[error("Product not found: {product_id}")]
    ProductNotFound {
        product_id: ProductId,
        variant_id: Option<VariantId>,
    },

    /// The catalog did not answer in time, even after retries.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    /// The prices cannot be combined.
    #[error("Malformed price: {0}")]
    Malformed(DomainError),
}

impl Transient for PricingError {
    fn is_transient(&self) -> bool {
        matches!(self, PricingError::Unavailable(_))
    }
}

/// Resolves unit prices from the catalog.
///
/// The only place that knows how a unit price is composed: base product
/// price plus the variant's additional price when a variant is given.
#[derive(Debug, Clone)]
pub struct PriceResolver<C> {
    catalog: C,
    timeout: Duration,
    retry: RetryPolicy,
}

impl<C: Catalog> PriceResolver<C> {
    /// Creates a new price resolver.
    pub fn new(catalog: C, timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            catalog,
            timeout,
            retry,
        }
    }

    /// Returns the unit price for a product and optional variant.
    ///
    /// Pure read; timeouts and catalog outages are retried per the policy.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_unit_price(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Money, PricingError> {
        with_retry(&self.retry, "pricing", || {
            self.resolve_once(product_id, variant_id)
        })
        .await
    }

    async fn resolve_once(
        &self,
        product_id: &ProductId,
        variant_id: Option<&VariantId>,
    ) -> Result<Money, PricingError> {
        let not_found = || PricingError::ProductNotFound {
            product_id: product_id.clone(),
            variant_id: variant_id.cloned(),
        };

        let base = self
            .timed(self.catalog.product_price(product_id))
            .await?
            .ok_or_else(not_found)?;

        let Some(variant_id) = variant_id else {
            return Ok(base);
        };

        let additional = self
            .timed(self.catalog.variant_price(product_id, variant_id))
            .await?
            .ok_or_else(not_found)?;

        base.checked_add(additional).map_err(PricingError::Malformed)
    }

    async fn timed<F>(&self, call: F) -> Result<Option<Money>, PricingError>
    where
        F: std::future::Future<Output = Result<Option<Money>, CatalogUnavailable>>,
    {
        match within(self.timeout, call).await {
            Some(result) => result.map_err(|e| PricingError::Unavailable(e.0)),
            None => Err(PricingError::Unavailable(format!(
                "no answer within {:?}",
                self.timeout
            ))),
        }
    }
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, Money>,
    variants: HashMap<(ProductId, VariantId), Money>,
    lookups: usize,
    unavailable_lookups: usize,
    delay: Option<Duration>,
}

/// In-memory catalog for tests and the demo binary.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    state: Arc<Mutex<InMemoryCatalogState>>,
}

impl InMemoryCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, InMemoryCatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds or reprices a product.
    pub fn add_product(&self, product_id: impl Into<ProductId>, price: Money) {
        self.state().products.insert(product_id.into(), price);
    }

    /// Adds or reprices a variant's additional price.
    pub fn add_variant(
        &self,
        product_id: impl Into<ProductId>,
        variant_id: impl Into<VariantId>,
        additional_price: Money,
    ) {
        self.state()
            .variants
            .insert((product_id.into(), variant_id.into()), additional_price);
    }

    /// Removes a product and its variants.
    pub fn remove_product(&self, product_id: &ProductId) {
        let mut state = self.state();
        state.products.remove(product_id);
        state.variants.retain(|(pid, _), _| pid != product_id);
    }

    /// Makes the next `count` lookups fail as unavailable.
    pub fn fail_next_lookups(&self, count: usize) {
        self.state().unavailable_lookups = count;
    }

    /// Delays every lookup, to exercise timeouts.
    pub fn set_delay(&self, delay: Option<Duration>) {
        self.state().delay = delay;
    }

    /// Returns how many lookups were made.
    pub fn lookup_count(&self) -> usize {
        self.state().lookups
    }

    async fn lookup<F>(&self, find: F) -> Result<Option<Money>, CatalogUnavailable>
    where
        F: FnOnce(&InMemoryCatalogState) -> Option<Money>,
    {
        let delay = {
            let mut state = self.state();
            state.lookups += 1;
            if state.unavailable_lookups > 0 {
                state.unavailable_lookups -= 1;
                return Err(CatalogUnavailable("injected outage".to_string()));
            }
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok(find(&self.state()))
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn product_price(
        &self,
        product_id: &ProductId,
    ) -> Result<Option<Money>, CatalogUnavailable> {
        self.lookup(|state| state.products.get(product_id).copied())
            .await
    }

    async fn variant_price(
        &self,
        product_id: &ProductId,
        variant_id: &VariantId,
    ) -> Result<Option<Money>, CatalogUnavailable> {
        let key = (product_id.clone(), variant_id.clone());
        self.lookup(|state| state.variants.get(&key).copied()).await
    }
}
