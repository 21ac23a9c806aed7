//! Product catalog port and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use domain::{Money, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

/// A product as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
}

impl Product {
    pub fn new(id: impl Into<ProductId>, name: impl Into<String>, price: Money) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            price,
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CatalogError {
    #[error("Product {0} not found")]
    NotFound(ProductId),

    /// The catalog could not be reached or answered garbage.
    #[error("Product catalog unavailable: {0}")]
    Upstream(String),
}

/// Looks up current product names and prices.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Product, CatalogError>;
}

#[derive(Debug, Default)]
struct InMemoryCatalogState {
    products: HashMap<ProductId, Product>,
    unavailable: bool,
    fetches: usize,
}

/// In-memory catalog for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductCatalog {
    state: Arc<RwLock<InMemoryCatalogState>>,
}

impl InMemoryProductCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog pre-loaded with products.
    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let state = InMemoryCatalogState {
            products: products.into_iter().map(|p| (p.id.clone(), p)).collect(),
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// Adds or replaces a product.
    pub async fn insert(&self, product: Product) {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product);
    }

    pub async fn set_price(&self, product_id: &ProductId, price: Money) {
        if let Some(product) = self.state.write().await.products.get_mut(product_id) {
            product.price = price;
        }
    }

    pub async fn remove(&self, product_id: &ProductId) {
        self.state.write().await.products.remove(product_id);
    }

    /// Makes every lookup fail with `CatalogError::Upstream`.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Number of lookups served so far, failed ones included.
    pub async fn fetch_count(&self) -> usize {
        self.state.read().await.fetches
    }
}

#[async_trait]
impl ProductCatalog for InMemoryProductCatalog {
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Product, CatalogError> {
        let mut state = self.state.write().await;
        state.fetches += 1;

        if state.unavailable {
            return Err(CatalogError::Upstream("catalog offline".to_string()));
        }

        state
            .products
            .get(product_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(product_id.clone()))
    }
}
