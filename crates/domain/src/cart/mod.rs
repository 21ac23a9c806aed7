//! Cart aggregate and related types.

mod aggregate;
mod events;
mod state;
mod value_objects;

pub use aggregate::Cart;
pub use events::{
    CartCheckedOutData, CartCreatedData, CartEvent, ProductAddedData, ProductRemovedData,
};
pub use state::CartState;
pub use value_objects::{LineItem, Money, ProductId};

use thiserror::Error;

/// Cart rules that can reject a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Cart already created")]
    AlreadyCreated,

    #[error("User ID is required")]
    EmptyUserId,

    #[error("Product ID is required")]
    EmptyProductId,

    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: u32 },

    #[error("Invalid price: {price} (must not be negative)")]
    InvalidPrice { price: i64 },

    #[error("Cart has not been created")]
    NotCreated,

    #[error("Cart already checked out")]
    AlreadyCheckedOut,

    #[error("Product {product_id} is not in the cart")]
    ProductNotInCart { product_id: ProductId },

    #[error("Cannot check out an empty cart")]
    EmptyCart,
}
