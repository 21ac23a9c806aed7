//! Service error taxonomy.

use domain::{CartError, DomainError};
use event_store::EventStoreError;
use projections::ProjectionError;
use serde::Serialize;
use thiserror::Error;

use crate::catalog::CatalogError;

/// Stable error categories reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Validation,
    NotFound,
    InvalidState,
    Conflict,
    Upstream,
    Persistence,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::InvalidState => "invalid_state",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::Upstream => "upstream",
            ErrorCategory::Persistence => "persistence",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by [`crate::CartService`].
///
/// Each variant carries a message that is safe to show to the caller.
/// Storage details are logged, not returned.
#[derive(Debug, Clone, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidState(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),

    #[error("{0}")]
    Persistence(String),
}

impl ServiceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ServiceError::Validation(_) => ErrorCategory::Validation,
            ServiceError::NotFound(_) => ErrorCategory::NotFound,
            ServiceError::InvalidState(_) => ErrorCategory::InvalidState,
            ServiceError::Conflict(_) => ErrorCategory::Conflict,
            ServiceError::Upstream(_) => ErrorCategory::Upstream,
            ServiceError::Persistence(_) => ErrorCategory::Persistence,
        }
    }

    pub(crate) fn cart_not_found() -> Self {
        ServiceError::NotFound("cart not found".to_string())
    }

    pub(crate) fn storage_failure() -> Self {
        ServiceError::Persistence("storage failure".to_string())
    }
}

impl From<CartError> for ServiceError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::EmptyUserId
            | CartError::EmptyProductId
            | CartError::InvalidQuantity { .. }
            | CartError::InvalidPrice { .. } => ServiceError::Validation(err.to_string()),
            CartError::NotCreated => ServiceError::cart_not_found(),
            CartError::ProductNotInCart { .. } => ServiceError::NotFound(err.to_string()),
            CartError::AlreadyCheckedOut | CartError::EmptyCart => {
                ServiceError::InvalidState(err.to_string())
            }
            CartError::AlreadyCreated => ServiceError::Conflict(err.to_string()),
        }
    }
}

impl From<EventStoreError> for ServiceError {
    fn from(err: EventStoreError) -> Self {
        if err.is_conflict() {
            return ServiceError::Conflict(
                "cart was modified concurrently, please retry".to_string(),
            );
        }
        tracing::error!(error = %err, "Event store failure");
        ServiceError::storage_failure()
    }
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Cart(e) => e.into(),
            DomainError::EventStore(e) => e.into(),
            DomainError::AggregateNotFound { .. } => ServiceError::cart_not_found(),
            DomainError::ConcurrencyRetriesExhausted { aggregate_id, attempts } => {
                tracing::warn!(%aggregate_id, attempts, "Command gave up after conflicts");
                ServiceError::Conflict("cart was modified concurrently, please retry".to_string())
            }
            DomainError::Serialization(e) => {
                tracing::error!(error = %e, "Failed to encode or decode cart events");
                ServiceError::storage_failure()
            }
        }
    }
}

impl From<CatalogError> for ServiceError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(product_id) => {
                ServiceError::NotFound(format!("product {product_id} not found"))
            }
            CatalogError::Upstream(reason) => {
                tracing::warn!(%reason, "Product catalog call failed");
                ServiceError::Upstream("product catalog unavailable".to_string())
            }
        }
    }
}

impl From<ProjectionError> for ServiceError {
    fn from(err: ProjectionError) -> Self {
        tracing::error!(error = %err, "Projection failure");
        ServiceError::storage_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::StreamId;
    use domain::ProductId;
    use event_store::Version;

    #[test]
    fn cart_errors_map_to_categories() {
        let cases = [
            (CartError::EmptyProductId, ErrorCategory::Validation),
            (CartError::InvalidQuantity { quantity: 0 }, ErrorCategory::Validation),
            (CartError::NotCreated, ErrorCategory::NotFound),
            (
                CartError::ProductNotInCart {
                    product_id: ProductId::new("p1"),
                },
                ErrorCategory::NotFound,
            ),
            (CartError::AlreadyCheckedOut, ErrorCategory::InvalidState),
            (CartError::EmptyCart, ErrorCategory::InvalidState),
            (CartError::AlreadyCreated, ErrorCategory::Conflict),
        ];

        for (err, category) in cases {
            assert_eq!(ServiceError::from(err).category(), category);
        }
    }

    #[test]
    fn conflicts_map_to_conflict() {
        let stream_id = StreamId::new();
        let conflict = EventStoreError::ConcurrencyConflict {
            stream_id,
            expected: Version::new(1),
            actual: Version::new(2),
        };
        assert_eq!(
            ServiceError::from(DomainError::EventStore(conflict)).category(),
            ErrorCategory::Conflict
        );

        let exhausted = DomainError::ConcurrencyRetriesExhausted {
            aggregate_id: stream_id,
            attempts: 3,
        };
        assert_eq!(ServiceError::from(exhausted).category(), ErrorCategory::Conflict);
    }

    #[test]
    fn persistence_messages_hide_details() {
        let err = ServiceError::from(EventStoreError::InvalidAppend("secret detail".into()));
        assert_eq!(err.category(), ErrorCategory::Persistence);
        assert!(!err.to_string().contains("secret"));
    }

    #[test]
    fn catalog_errors_map_to_categories() {
        let not_found = ServiceError::from(CatalogError::NotFound(ProductId::new("p1")));
        assert_eq!(not_found.category(), ErrorCategory::NotFound);
        assert_eq!(not_found.to_string(), "product p1 not found");

        let upstream = ServiceError::from(CatalogError::Upstream("timeout".into()));
        assert_eq!(upstream.category(), ErrorCategory::Upstream);
    }

    #[test]
    fn category_strings_are_stable() {
        assert_eq!(ErrorCategory::InvalidState.as_str(), "invalid_state");
        assert_eq!(
            serde_json::to_value(ErrorCategory::NotFound).unwrap(),
            serde_json::json!("not_found")
        );
    }
}
