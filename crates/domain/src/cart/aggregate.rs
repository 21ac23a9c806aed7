//! Cart aggregate implementation.

use std::collections::BTreeMap;

use common::{StreamId, UserId};
use event_store::Version;
use serde::{Deserialize, Serialize};

use crate::aggregate::{Aggregate, SnapshotCapable};

use super::{
    CartError, CartEvent, CartState, LineItem, Money, ProductId,
    events::{CartCreatedData, ProductAddedData},
};

/// Cart aggregate root.
///
/// Items live in an ordered map so that two replays of the same history
/// compare equal and serialize to identical JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: Option<StreamId>,

    #[serde(default)]
    version: Version,

    user_id: Option<UserId>,

    state: CartState,

    items: BTreeMap<ProductId, LineItem>,
}

impl Aggregate for Cart {
    type Event = CartEvent;
    type Error = CartError;

    fn aggregate_type() -> &'static str {
        "Cart"
    }

    fn id(&self) -> Option<StreamId> {
        self.id
    }

    fn owner(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CartEvent::CartCreated(data) => self.apply_cart_created(data),
            CartEvent::ProductAdded(data) => self.apply_product_added(data),
            CartEvent::ProductRemoved(data) => {
                self.items.remove(&data.product_id);
            }
            CartEvent::CartCheckedOut(_) => {
                self.state = CartState::CheckedOut;
            }
        }
    }
}

impl SnapshotCapable for Cart {
    fn snapshot_interval() -> i64 {
        10
    }
}

// Query methods
impl Cart {
    pub fn user_id(&self) -> Option<&UserId> {
        self.user_id.as_ref()
    }

    pub fn state(&self) -> CartState {
        self.state
    }

    pub fn is_checked_out(&self) -> bool {
        self.state.is_terminal()
    }

    /// Returns the lines ordered by product id.
    pub fn items(&self) -> impl Iterator<Item = &LineItem> {
        self.items.values()
    }

    pub fn get_item(&self, product_id: &ProductId) -> Option<&LineItem> {
        self.items.get(product_id)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns Σ quantity over all lines.
    pub fn total_items(&self) -> u64 {
        self.items
            .values()
            .fold(0u64, |acc, item| acc.saturating_add(u64::from(item.quantity)))
    }

    /// Returns Σ price × quantity over all lines.
    pub fn total_value(&self) -> Money {
        self.items.values().map(LineItem::line_total).sum()
    }
}

// Command methods (return events, never mutate)
impl Cart {
    /// Opens the cart for a user.
    pub fn create(&self, cart_id: StreamId, user_id: UserId) -> Result<Vec<CartEvent>, CartError> {
        if self.id.is_some() {
            return Err(CartError::AlreadyCreated);
        }

        if user_id.is_blank() {
            return Err(CartError::EmptyUserId);
        }

        Ok(vec![CartEvent::cart_created(cart_id, user_id)])
    }

    /// Adds units of a product, recording the catalog's latest price and name.
    pub fn add_product(
        &self,
        product_id: ProductId,
        quantity: u32,
        price: Money,
        name: impl Into<String>,
    ) -> Result<Vec<CartEvent>, CartError> {
        if product_id.is_blank() {
            return Err(CartError::EmptyProductId);
        }

        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        if price.is_negative() {
            return Err(CartError::InvalidPrice {
                price: price.cents(),
            });
        }

        self.ensure_modifiable()?;

        Ok(vec![CartEvent::product_added(
            product_id, quantity, price, name,
        )])
    }

    /// Removes a product line entirely.
    pub fn remove_product(&self, product_id: ProductId) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_modifiable()?;

        if product_id.is_blank() {
            return Err(CartError::EmptyProductId);
        }

        if !self.items.contains_key(&product_id) {
            return Err(CartError::ProductNotInCart { product_id });
        }

        Ok(vec![CartEvent::product_removed(product_id)])
    }

    /// Checks the cart out, recording its totals.
    pub fn checkout(&self) -> Result<Vec<CartEvent>, CartError> {
        self.ensure_modifiable()?;

        if self.is_empty() {
            return Err(CartError::EmptyCart);
        }

        Ok(vec![CartEvent::cart_checked_out(self.items.values())])
    }

    fn ensure_modifiable(&self) -> Result<(), CartError> {
        if self.id.is_none() {
            return Err(CartError::NotCreated);
        }

        if !self.state.can_modify_items() {
            return Err(CartError::AlreadyCheckedOut);
        }

        Ok(())
    }
}

// Apply event helpers
impl Cart {
    fn apply_cart_created(&mut self, data: CartCreatedData) {
        self.id = Some(data.cart_id);
        self.user_id = Some(data.user_id);
        self.state = CartState::Active;
    }

    fn apply_product_added(&mut self, data: ProductAddedData) {
        match self.items.get_mut(&data.product_id) {
            Some(item) => {
                item.quantity = item.quantity.saturating_add(data.quantity);
                item.price = data.price;
                item.name = data.name;
            }
            None => {
                let item = LineItem::new(data.product_id.clone(), data.name, data.quantity, data.price);
                self.items.insert(data.product_id, item);
            }
        }
    }
}
