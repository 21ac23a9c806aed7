//! Cart read model: active carts, finalized carts and the user index.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{StreamId, UserId};
use domain::{Aggregate, Cart, CartEvent, LineItem, Money};
use event_store::{EventEnvelope, Version};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::projection::{Projection, ProjectionPosition};
use crate::{ProjectionError, Result};
use crate::read_model::ReadModel;

/// Denormalized view of one cart.
///
/// Rebuildable from the event log and never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartView {
    pub cart_id: StreamId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub is_checked_out: bool,

    /// Sequence of the last event folded into this view.
    pub version: Version,

    pub total_value: Money,
    pub total_items: u64,
    pub last_modified: DateTime<Utc>,
    pub checked_out_at: Option<DateTime<Utc>>,
}

impl CartView {
    /// Builds a view from a loaded aggregate.
    ///
    /// Returns None for an aggregate that was never created.
    pub fn from_cart(cart: &Cart, last_modified: DateTime<Utc>) -> Option<Self> {
        let cart_id = cart.id()?;
        let user_id = cart.user_id()?.clone();
        let is_checked_out = cart.is_checked_out();

        Some(Self {
            cart_id,
            user_id,
            items: cart.items().cloned().collect(),
            is_checked_out,
            version: cart.version(),
            total_value: cart.total_value(),
            total_items: cart.total_items(),
            last_modified,
            checked_out_at: is_checked_out.then_some(last_modified),
        })
    }

    fn recalculate_totals(&mut self) {
        self.total_value = self.items.iter().map(LineItem::line_total).sum();
        self.total_items = self
            .items
            .iter()
            .fold(0u64, |acc, item| acc.saturating_add(u64::from(item.quantity)));
    }

    /// Folds the next event of the stream into the view.
    fn apply(&mut self, event: CartEvent, sequence: Version, timestamp: DateTime<Utc>) {
        match event {
            CartEvent::CartCreated(_) => {}
            CartEvent::ProductAdded(data) => {
                match self.items.iter_mut().find(|i| i.product_id == data.product_id) {
                    Some(item) => {
                        item.quantity = item.quantity.saturating_add(data.quantity);
                        item.price = data.price;
                        item.name = data.name;
                    }
                    None => {
                        self.items.push(LineItem::new(
                            data.product_id,
                            data.name,
                            data.quantity,
                            data.price,
                        ));
                        self.items.sort_by(|a, b| a.product_id.cmp(&b.product_id));
                    }
                }
                self.recalculate_totals();
            }
            CartEvent::ProductRemoved(data) => {
                self.items.retain(|i| i.product_id != data.product_id);
                self.recalculate_totals();
            }
            CartEvent::CartCheckedOut(data) => {
                self.is_checked_out = true;
                self.checked_out_at = Some(timestamp);
                self.total_value = data.total_value;
                self.total_items = data.total_items;
            }
        }
        self.version = sequence;
        self.last_modified = timestamp;
    }
}

#[derive(Default)]
struct CartIndex {
    active: HashMap<StreamId, CartView>,
    finalized: HashMap<StreamId, CartView>,
    /// User → active cart. May point at a claimed cart with no view yet.
    active_by_user: HashMap<UserId, StreamId>,
    /// User → most recently checked-out cart.
    latest_finalized: HashMap<UserId, StreamId>,
    /// Claims without a view yet. The weak half dies with the claim guard.
    claims: HashMap<StreamId, Weak<()>>,
}

impl CartIndex {
    fn stored_version(&self, cart_id: &StreamId) -> Option<Version> {
        self.active
            .get(cart_id)
            .or_else(|| self.finalized.get(cart_id))
            .map(|view| view.version)
    }

    fn claim_is_live(&self, cart_id: &StreamId) -> bool {
        self.claims
            .get(cart_id)
            .is_some_and(|holder| holder.strong_count() > 0)
    }

    /// Frees the user's slot if it still points at a claim with no view.
    fn release(&mut self, user_id: &UserId, cart_id: StreamId) -> bool {
        self.claims.remove(&cart_id);
        if self.active_by_user.get(user_id) == Some(&cart_id) && !self.active.contains_key(&cart_id)
        {
            self.active_by_user.remove(user_id);
            return true;
        }
        false
    }

    fn upsert(&mut self, view: CartView) -> bool {
        if let Some(stored) = self.stored_version(&view.cart_id)
            && stored >= view.version
        {
            return false;
        }

        let cart_id = view.cart_id;
        self.claims.remove(&cart_id);
        if view.is_checked_out {
            self.active.remove(&cart_id);
            if self.active_by_user.get(&view.user_id) == Some(&cart_id) {
                self.active_by_user.remove(&view.user_id);
            }
            self.latest_finalized.insert(view.user_id.clone(), cart_id);
            self.finalized.insert(cart_id, view);
        } else {
            self.active_by_user.insert(view.user_id.clone(), cart_id);
            self.active.insert(cart_id, view);
        }
        true
    }
}

/// In-memory projection of every cart.
///
/// Keeps active carts, finalized (checked-out) carts, and a user → active
/// cart index that also serves as the single-active-cart claim. Updates are
/// conditional on the version so a late writer never overwrites a newer view.
#[derive(Clone, Default)]
pub struct CartProjection {
    index: Arc<RwLock<CartIndex>>,
    position: Arc<RwLock<ProjectionPosition>>,
}

impl CartProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a view unless the stored one is at the same or a newer version.
    ///
    /// Returns true if the view was applied.
    pub async fn upsert(&self, view: CartView) -> bool {
        let cart_id = view.cart_id;
        let version = view.version;
        let applied = self.index.write().await.upsert(view);
        if !applied {
            tracing::debug!(%cart_id, %version, "Ignored stale cart view");
        }
        applied
    }

    /// Reserves the user's single active-cart slot for `cart_id`.
    ///
    /// Returns None if the slot is taken by an active cart or by another
    /// claim, live or abandoned. Abandoned claims are cleared with
    /// [`expire_claim`](Self::expire_claim).
    pub async fn claim_active_cart(
        &self,
        user_id: &UserId,
        cart_id: StreamId,
    ) -> Option<ActiveCartClaim> {
        let mut index = self.index.write().await;
        if index.active_by_user.contains_key(user_id) {
            return None;
        }

        let holder = Arc::new(());
        index.active_by_user.insert(user_id.clone(), cart_id);
        index.claims.insert(cart_id, Arc::downgrade(&holder));

        Some(ActiveCartClaim {
            index: Arc::clone(&self.index),
            user_id: user_id.clone(),
            cart_id,
            _holder: holder,
        })
    }

    /// True while the guard for a claim on `cart_id` is alive.
    pub async fn claim_in_flight(&self, cart_id: StreamId) -> bool {
        self.index.read().await.claim_is_live(&cart_id)
    }

    /// Frees a slot held by a claim whose guard is gone and which never
    /// produced a view.
    ///
    /// Returns true if the slot was freed.
    pub async fn expire_claim(&self, user_id: &UserId, cart_id: StreamId) -> bool {
        let mut index = self.index.write().await;
        if index.claim_is_live(&cart_id) {
            return false;
        }
        index.release(user_id, cart_id)
    }

    /// Returns the id of the user's active cart or claim.
    pub async fn active_cart_id(&self, user_id: &UserId) -> Option<StreamId> {
        self.index.read().await.active_by_user.get(user_id).copied()
    }

    /// Returns the user's latest finalized cart id.
    pub async fn latest_finalized_id(&self, user_id: &UserId) -> Option<StreamId> {
        self.index.read().await.latest_finalized.get(user_id).copied()
    }

    /// Returns the user's active cart, else their most recently finalized one.
    pub async fn current_for_user(&self, user_id: &UserId) -> Option<CartView> {
        let index = self.index.read().await;
        index
            .active_by_user
            .get(user_id)
            .and_then(|id| index.active.get(id))
            .or_else(|| {
                index
                    .latest_finalized
                    .get(user_id)
                    .and_then(|id| index.finalized.get(id))
            })
            .cloned()
    }

    pub async fn get(&self, cart_id: StreamId) -> Option<CartView> {
        let index = self.index.read().await;
        index
            .active
            .get(&cart_id)
            .or_else(|| index.finalized.get(&cart_id))
            .cloned()
    }

    /// Returns every cart of the user, oldest modification first.
    pub async fn carts_for_user(&self, user_id: &UserId) -> Vec<CartView> {
        let index = self.index.read().await;
        let mut carts: Vec<CartView> = index
            .active
            .values()
            .chain(index.finalized.values())
            .filter(|view| &view.user_id == user_id)
            .cloned()
            .collect();
        carts.sort_by_key(|view| view.last_modified);
        carts
    }

    pub async fn active_count(&self) -> usize {
        self.index.read().await.active.len()
    }

    pub async fn finalized_count(&self) -> usize {
        self.index.read().await.finalized.len()
    }
}

#[async_trait]
impl Projection for CartProjection {
    fn name(&self) -> &'static str {
        "CartProjection"
    }

    async fn handle(&self, event: &EventEnvelope) -> Result<()> {
        let cart_id = event.stream_id;
        let sequence = event.sequence;
        let cart_event: CartEvent = event
            .decode()
            .map_err(|e| ProjectionError::decode(cart_id, sequence, e))?;

        {
            let mut index = self.index.write().await;
            let current = index.stored_version(&cart_id).unwrap_or_default();

            if sequence <= current {
                tracing::trace!(%cart_id, %sequence, "Skipping already projected event");
            } else if sequence != current.next() {
                tracing::warn!(%cart_id, %sequence, %current, "Gap in cart stream, skipping event");
            } else if let CartEvent::CartCreated(data) = &cart_event {
                let view = CartView {
                    cart_id: data.cart_id,
                    user_id: data.user_id.clone(),
                    items: Vec::new(),
                    is_checked_out: false,
                    version: sequence,
                    total_value: Money::zero(),
                    total_items: 0,
                    last_modified: event.timestamp,
                    checked_out_at: None,
                };
                index.upsert(view);
            } else {
                let existing = index
                    .active
                    .get(&cart_id)
                    .or_else(|| index.finalized.get(&cart_id))
                    .cloned();
                match existing {
                    Some(mut view) => {
                        view.apply(cart_event, sequence, event.timestamp);
                        index.upsert(view);
                    }
                    None => {
                        tracing::warn!(%cart_id, %sequence, "Event for unknown cart, skipping");
                    }
                }
            }
        }

        let mut pos = self.position.write().await;
        *pos = pos.record(event);

        Ok(())
    }

    async fn position(&self) -> ProjectionPosition {
        *self.position.read().await
    }

    async fn reset(&self) -> Result<()> {
        *self.index.write().await = CartIndex::default();
        *self.position.write().await = ProjectionPosition::zero();
        Ok(())
    }
}

#[async_trait]
impl ReadModel for CartProjection {
    type Entry = CartView;

    /// Every cart of every user, oldest modification first.
    async fn entries(&self) -> Vec<CartView> {
        let index = self.index.read().await;
        let mut carts: Vec<CartView> = index
            .active
            .values()
            .chain(index.finalized.values())
            .cloned()
            .collect();
        carts.sort_by_key(|view| view.last_modified);
        carts
    }

    async fn entry_count(&self) -> usize {
        let index = self.index.read().await;
        index.active.len() + index.finalized.len()
    }
}

/// Holds a user's active-cart slot while their cart is being created.
///
/// Dropping the guard frees the slot unless a view of the cart was stored
/// first, so a create that fails or is dropped partway never leaves the user
/// locked out. A `CartCreated` that did commit is found again by replaying
/// the user's streams.
#[must_use = "the slot is freed when the claim is dropped"]
pub struct ActiveCartClaim {
    index: Arc<RwLock<CartIndex>>,
    user_id: UserId,
    cart_id: StreamId,
    _holder: Arc<()>,
}

impl ActiveCartClaim {
    pub fn cart_id(&self) -> StreamId {
        self.cart_id
    }
}

impl Drop for ActiveCartClaim {
    fn drop(&mut self) {
        let cart_id = self.cart_id;
        if let Ok(mut index) = self.index.try_write() {
            index.release(&self.user_id, cart_id);
            return;
        }

        // Lock is busy; release once it frees up
        let index = Arc::clone(&self.index);
        let user_id = self.user_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    index.write().await.release(&user_id, cart_id);
                });
            }
            Err(_) => {
                tracing::warn!(%cart_id, "Dropped cart claim outside a runtime, left for expiry");
            }
        }
    }
}
