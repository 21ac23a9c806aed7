//! Cart domain events.
//!
//! Payloads carry no wall-clock data; the store stamps each envelope.

use common::{StreamId, UserId};
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

use super::{LineItem, Money, ProductId};

/// Events that can occur on a cart aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CartEvent {
    /// The cart was opened for a user.
    CartCreated(CartCreatedData),

    /// Units of a product were added; price and name are the catalog's
    /// latest values.
    ProductAdded(ProductAddedData),

    /// A product line was removed entirely.
    ProductRemoved(ProductRemovedData),

    /// The cart was checked out.
    CartCheckedOut(CartCheckedOutData),
}

impl DomainEvent for CartEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated(_) => "CartCreated",
            CartEvent::ProductAdded(_) => "ProductAdded",
            CartEvent::ProductRemoved(_) => "ProductRemoved",
            CartEvent::CartCheckedOut(_) => "CartCheckedOut",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCreatedData {
    pub cart_id: StreamId,
    pub user_id: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductAddedData {
    pub product_id: ProductId,

    /// Units added by this event, not the resulting line quantity.
    pub quantity: u32,

    pub price: Money,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRemovedData {
    pub product_id: ProductId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartCheckedOutData {
    pub total_value: Money,
    pub total_items: u64,
}

impl CartEvent {
    pub fn cart_created(cart_id: StreamId, user_id: UserId) -> Self {
        CartEvent::CartCreated(CartCreatedData { cart_id, user_id })
    }

    pub fn product_added(
        product_id: ProductId,
        quantity: u32,
        price: Money,
        name: impl Into<String>,
    ) -> Self {
        CartEvent::ProductAdded(ProductAddedData {
            product_id,
            quantity,
            price,
            name: name.into(),
        })
    }

    pub fn product_removed(product_id: ProductId) -> Self {
        CartEvent::ProductRemoved(ProductRemovedData { product_id })
    }

    /// Builds a checkout event with totals computed from the given lines.
    pub fn cart_checked_out<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Self {
        let (total_value, total_items) = items
            .into_iter()
            .fold((Money::zero(), 0u64), |(value, count), item| {
                (
                    value + item.line_total(),
                    count.saturating_add(u64::from(item.quantity)),
                )
            });
        CartEvent::CartCheckedOut(CartCheckedOutData {
            total_value,
            total_items,
        })
    }
}
