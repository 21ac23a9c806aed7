//! HTTP client for the external product catalog.

use std::time::Duration;

use async_trait::async_trait;
use cart_service::{CatalogError, Product, ProductCatalog};
use domain::{Money, ProductId};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;

/// Failure to set up the catalog client.
#[derive(Debug, Error)]
pub enum CatalogClientError {
    #[error("invalid catalog URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Wire format of `GET /products/{id}`. Prices are decimal currency units.
#[derive(Debug, Deserialize)]
struct ProductResponse {
    id: String,
    name: String,
    price: f64,
}

/// Product catalog reached over HTTP.
#[derive(Debug, Clone)]
pub struct HttpProductCatalog {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpProductCatalog {
    pub fn new(base_url: &str) -> Result<Self, CatalogClientError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Self::with_client(client, base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, CatalogClientError> {
        let invalid = |reason: String| CatalogClientError::InvalidUrl {
            url: base_url.to_string(),
            reason,
        };
        let parsed = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        Ok(Self {
            client,
            base_url: parsed,
        })
    }

    /// `{base}/products/{id}`, with the id escaped as a single path segment.
    fn product_url(&self, product_id: &ProductId) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| CatalogError::Upstream("catalog URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(["products", product_id.as_str()]);
        Ok(url)
    }
}

#[async_trait]
impl ProductCatalog for HttpProductCatalog {
    #[tracing::instrument(skip(self), fields(product_id = %product_id))]
    async fn fetch_product(&self, product_id: &ProductId) -> Result<Product, CatalogError> {
        let response = self
            .client
            .get(self.product_url(product_id)?)
            .send()
            .await
            .map_err(|e| CatalogError::Upstream(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(CatalogError::NotFound(product_id.clone())),
            status if !status.is_success() => {
                return Err(CatalogError::Upstream(format!("catalog returned {status}")));
            }
            _ => {}
        }

        let body: ProductResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Upstream(format!("invalid catalog response: {e}")))?;

        if body.id != product_id.as_str() {
            tracing::warn!(returned = %body.id, "Catalog answered for a different product");
            return Err(CatalogError::Upstream(format!(
                "catalog returned product {} for {}",
                body.id, product_id
            )));
        }

        Ok(Product {
            id: product_id.clone(),
            name: body.name,
            price: price_to_money(body.price)?,
        })
    }
}

/// Converts a decimal price to cents, rounding to the nearest cent.
fn price_to_money(price: f64) -> Result<Money, CatalogError> {
    let cents = (price * 100.0).round();
    if !cents.is_finite() || cents < 0.0 || cents > i64::MAX as f64 {
        return Err(CatalogError::Upstream(format!("invalid price {price}")));
    }
    Ok(Money::from_cents(cents as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_conversion_rounds_to_cents() {
        assert_eq!(price_to_money(10.0).unwrap(), Money::from_cents(1000));
        assert_eq!(price_to_money(19.99).unwrap(), Money::from_cents(1999));
        assert_eq!(price_to_money(0.125).unwrap(), Money::from_cents(13));
        assert_eq!(price_to_money(0.0).unwrap(), Money::zero());
    }

    #[test]
    fn test_invalid_prices_are_upstream_errors() {
        for price in [-1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                price_to_money(price),
                Err(CatalogError::Upstream(_))
            ));
        }
    }

    fn catalog(base_url: &str) -> HttpProductCatalog {
        HttpProductCatalog::with_client(reqwest::Client::new(), base_url).unwrap()
    }

    fn url_for(catalog: &HttpProductCatalog, id: &str) -> String {
        catalog.product_url(&ProductId::new(id)).unwrap().to_string()
    }

    #[test]
    fn test_product_url_handles_trailing_slash_and_prefix() {
        assert_eq!(
            url_for(&catalog("http://catalog:4000/"), "p1"),
            "http://catalog:4000/products/p1"
        );
        assert_eq!(
            url_for(&catalog("http://catalog:4000"), "p1"),
            "http://catalog:4000/products/p1"
        );
        assert_eq!(
            url_for(&catalog("http://catalog:4000/v2/"), "p1"),
            "http://catalog:4000/v2/products/p1"
        );
    }

    #[test]
    fn test_product_id_is_escaped_as_one_segment() {
        let catalog = catalog("http://catalog:4000");

        assert_eq!(
            url_for(&catalog, "p2/../p1"),
            "http://catalog:4000/products/p2%2F..%2Fp1"
        );
        assert_eq!(
            url_for(&catalog, "p1?admin=1#x"),
            "http://catalog:4000/products/p1%3Fadmin=1%23x"
        );
    }

    #[test]
    fn test_invalid_base_url_is_rejected() {
        for base in ["not a url", "mailto:catalog@example.com"] {
            assert!(matches!(
                HttpProductCatalog::with_client(reqwest::Client::new(), base),
                Err(CatalogClientError::InvalidUrl { .. })
            ));
        }
    }
}
