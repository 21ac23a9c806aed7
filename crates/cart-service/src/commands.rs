//! Commands and queries accepted by [`crate::CartService`].
//!
//! Fields hold raw caller input; the service validates them before doing
//! any I/O.

use common::UserId;
use domain::ProductId;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Opens a new cart for a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCart {
    pub user_id: UserId,
}

impl CreateCart {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Adds units of a product to the user's active cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddProduct {
    pub user_id: UserId,
    pub product_id: ProductId,

    /// Signed so that zero and negative input can be rejected as validation
    /// errors rather than failing to parse.
    pub quantity: i64,
}

impl AddProduct {
    pub fn new(user_id: impl Into<UserId>, product_id: impl Into<ProductId>, quantity: i64) -> Self {
        Self {
            user_id: user_id.into(),
            product_id: product_id.into(),
            quantity,
        }
    }

    /// Returns the quantity as a positive `u32`.
    pub fn validated_quantity(&self) -> Result<u32, ServiceError> {
        match u32::try_from(self.quantity) {
            Ok(quantity) if quantity > 0 => Ok(quantity),
            _ => Err(ServiceError::Validation(format!(
                "Invalid quantity: {} (must be between 1 and {})",
                self.quantity,
                u32::MAX
            ))),
        }
    }
}

/// Removes a product line from the user's active cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveProduct {
    pub user_id: UserId,
    pub product_id: ProductId,
}

impl RemoveProduct {
    pub fn new(user_id: impl Into<UserId>, product_id: impl Into<ProductId>) -> Self {
        Self {
            user_id: user_id.into(),
            product_id: product_id.into(),
        }
    }
}

/// Checks out the user's active cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkout {
    pub user_id: UserId,
}

impl Checkout {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

/// Reads the user's current cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetCart {
    pub user_id: UserId,
}

impl GetCart {
    pub fn new(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

pub(crate) fn require_user(user_id: &UserId) -> Result<(), ServiceError> {
    if user_id.is_blank() {
        return Err(ServiceError::Validation("User ID is required".to_string()));
    }
    Ok(())
}

pub(crate) fn require_product(product_id: &ProductId) -> Result<(), ServiceError> {
    if product_id.is_blank() {
        return Err(ServiceError::Validation("Product ID is required".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorCategory;

    #[test]
    fn quantity_must_be_positive_u32() {
        assert_eq!(AddProduct::new("u1", "p1", 3).validated_quantity().unwrap(), 3);

        for bad in [0, -1, i64::from(u32::MAX) + 1] {
            let err = AddProduct::new("u1", "p1", bad).validated_quantity().unwrap_err();
            assert_eq!(err.category(), ErrorCategory::Validation);
        }
    }

    #[test]
    fn add_product_parses_from_json() {
        let cmd: AddProduct = serde_json::from_value(serde_json::json!({
            "user_id": "u1",
            "product_id": "p1",
            "quantity": -2
        }))
        .unwrap();

        assert_eq!(cmd.user_id, UserId::new("u1"));
        assert_eq!(cmd.product_id, ProductId::new("p1"));
        assert_eq!(cmd.quantity, -2);
    }

    #[test]
    fn blank_ids_are_rejected() {
        assert!(require_user(&UserId::new(" ")).is_err());
        assert!(require_user(&UserId::new("u1")).is_ok());
        assert!(require_product(&ProductId::new("")).is_err());
    }
}
