//! Cart service: the user-facing command and query surface.

use std::sync::Arc;

use chrono::Utc;
use common::{StreamId, UserId};
use domain::{
    Aggregate, Cart, CartError, CartEvent, CommandHandler, CommandResult, DomainError, RetryPolicy,
};
use event_store::{EventEnvelope, EventStore};
use projections::{CartProjection, CartView};

use crate::catalog::{CatalogError, ProductCatalog};
use crate::commands::{
    AddProduct, Checkout, CreateCart, GetCart, RemoveProduct, require_product, require_user,
};
use crate::error::ServiceError;

/// Tunables for [`CartService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub retry_policy: RetryPolicy,

    /// Re-fetch every line's price from the catalog before checking out.
    pub verify_prices_on_checkout: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            retry_policy: RetryPolicy::default(),
            verify_prices_on_checkout: true,
        }
    }
}

/// Largest price drift, in cents, tolerated at checkout.
const PRICE_TOLERANCE_CENTS: i64 = 1;

/// Service for managing shopping carts.
///
/// Each user has at most one active cart. Write commands resolve that cart,
/// run through the command handler's retry loop, and push the resulting
/// state into the projection. The event log stays the source of truth: when
/// the projection has nothing for a user, the user's streams are replayed.
pub struct CartService<S: EventStore> {
    handler: CommandHandler<S, Cart>,
    projection: CartProjection,
    catalog: Arc<dyn ProductCatalog>,
    config: ServiceConfig,
}

impl<S: EventStore + Clone> Clone for CartService<S> {
    fn clone(&self) -> Self {
        Self {
            handler: self.handler.clone(),
            projection: self.projection.clone(),
            catalog: Arc::clone(&self.catalog),
            config: self.config.clone(),
        }
    }
}

impl<S: EventStore> CartService<S> {
    pub fn new(store: S, projection: CartProjection, catalog: Arc<dyn ProductCatalog>) -> Self {
        Self {
            handler: CommandHandler::new(store),
            projection,
            catalog,
            config: ServiceConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handler(&self) -> &CommandHandler<S, Cart> {
        &self.handler
    }

    pub fn projection(&self) -> &CartProjection {
        &self.projection
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Opens a cart for a user who has no active cart.
    ///
    /// The user's active slot is claimed in the projection before the
    /// `CartCreated` event is appended, so two concurrent creates for the
    /// same user cannot both succeed. The claim is a guard: if the append
    /// fails or this future is dropped, the slot is freed.
    #[tracing::instrument(skip(self))]
    pub async fn create_cart(&self, cmd: CreateCart) -> Result<StreamId, ServiceError> {
        let user_id = cmd.user_id;
        require_user(&user_id)?;

        if let Some(existing) = self.find_active_cart(&user_id).await?
            && self.confirm_active(existing).await?
        {
            return Err(user_has_active_cart());
        }

        let cart_id = StreamId::new();
        let Some(claim) = self.projection.claim_active_cart(&user_id, cart_id).await else {
            return Err(user_has_active_cart());
        };

        let result = self
            .handler
            .execute(cart_id, |cart| cart.create(cart_id, user_id.clone()))
            .await?;
        self.publish(&result).await?;
        drop(claim);

        tracing::info!(%cart_id, %user_id, "Cart created");
        Ok(cart_id)
    }

    /// Adds units of a product at the catalog's current price.
    #[tracing::instrument(skip(self))]
    pub async fn add_product(&self, cmd: AddProduct) -> Result<CartView, ServiceError> {
        require_user(&cmd.user_id)?;
        require_product(&cmd.product_id)?;
        let quantity = cmd.validated_quantity()?;

        let cart_id = self.resolve_active_cart(&cmd.user_id).await?;
        let product = self.catalog.fetch_product(&cmd.product_id).await?;

        let result = self
            .handler
            .execute_with_retry(cart_id, &self.config.retry_policy, |cart| {
                cart.add_product(
                    cmd.product_id.clone(),
                    quantity,
                    product.price,
                    product.name.clone(),
                )
            })
            .await;
        let result = self.settle(cart_id, result).await?;

        self.publish(&result).await
    }

    /// Removes a product line from the user's active cart.
    #[tracing::instrument(skip(self))]
    pub async fn remove_product(&self, cmd: RemoveProduct) -> Result<CartView, ServiceError> {
        require_user(&cmd.user_id)?;
        require_product(&cmd.product_id)?;

        let cart_id = self.resolve_active_cart(&cmd.user_id).await?;

        let result = self
            .handler
            .execute_with_retry(cart_id, &self.config.retry_policy, |cart| {
                cart.remove_product(cmd.product_id.clone())
            })
            .await;
        let result = self.settle(cart_id, result).await?;

        self.publish(&result).await
    }

    /// Checks out the user's active cart.
    #[tracing::instrument(skip(self))]
    pub async fn checkout(&self, cmd: Checkout) -> Result<CartView, ServiceError> {
        require_user(&cmd.user_id)?;

        let cart_id = self.resolve_active_cart(&cmd.user_id).await?;

        if self.config.verify_prices_on_checkout {
            self.verify_prices(cart_id).await?;
        }

        let result = self
            .handler
            .execute_with_retry(cart_id, &self.config.retry_policy, |cart| cart.checkout())
            .await;
        let result = self.settle(cart_id, result).await?;

        metrics::counter!("cart_checkouts_total").increment(1);
        tracing::info!(%cart_id, user_id = %cmd.user_id, "Cart checked out");

        self.publish(&result).await
    }

    /// Returns the user's active cart, else their most recently checked-out
    /// cart.
    #[tracing::instrument(skip(self))]
    pub async fn get_cart(&self, query: GetCart) -> Result<CartView, ServiceError> {
        require_user(&query.user_id)?;

        if let Some(view) = self.projection.current_for_user(&query.user_id).await {
            return Ok(view);
        }

        let carts = self.replay_user_carts(&query.user_id).await?;
        current_of(carts).ok_or_else(ServiceError::cart_not_found)
    }

    /// Returns every cart the user ever had, oldest first.
    #[tracing::instrument(skip(self))]
    pub async fn list_carts(&self, user_id: &UserId) -> Result<Vec<CartView>, ServiceError> {
        require_user(user_id)?;

        let carts = self.projection.carts_for_user(user_id).await;
        if !carts.is_empty() {
            return Ok(carts);
        }

        let mut carts = self.replay_user_carts(user_id).await?;
        carts.sort_by_key(|view| view.last_modified);
        Ok(carts)
    }

    /// Finds the cart a write command should target.
    async fn resolve_active_cart(&self, user_id: &UserId) -> Result<StreamId, ServiceError> {
        if let Some(cart_id) = self.find_active_cart(user_id).await? {
            return Ok(cart_id);
        }

        let finalized = self.projection.latest_finalized_id(user_id).await.is_some();
        if finalized {
            Err(ServiceError::InvalidState("cart already checked out".to_string()))
        } else {
            Err(ServiceError::cart_not_found())
        }
    }

    /// Looks up the user's active cart in the projection, then in the log.
    async fn find_active_cart(&self, user_id: &UserId) -> Result<Option<StreamId>, ServiceError> {
        if let Some(cart_id) = self.projection.active_cart_id(user_id).await {
            if self.projection.get(cart_id).await.is_some()
                || self.projection.claim_in_flight(cart_id).await
            {
                return Ok(Some(cart_id));
            }

            // The create that claimed this slot is gone. Whatever it
            // committed is picked up by the replay below.
            if self.projection.expire_claim(user_id, cart_id).await {
                tracing::info!(%user_id, %cart_id, "Expired abandoned cart claim");
            }
        }

        // Replaying also records finalized carts in the projection
        let carts = self.replay_user_carts(user_id).await?;
        Ok(carts
            .into_iter()
            .find(|view| !view.is_checked_out)
            .map(|view| view.cart_id))
    }

    /// Rebuilds every cart of the user from the log and feeds the views to
    /// the projection.
    async fn replay_user_carts(&self, user_id: &UserId) -> Result<Vec<CartView>, ServiceError> {
        let events = self.handler.store().read_by_user(user_id).await?;

        let mut views = Vec::new();
        for stream in events.chunk_by(|a, b| a.stream_id == b.stream_id) {
            if let Some(view) = fold_stream(stream)? {
                views.push(view);
            }
        }

        if !views.is_empty() {
            tracing::debug!(%user_id, carts = views.len(), "Replayed carts from the event log");
        }
        for view in &views {
            self.projection.upsert(view.clone()).await;
        }

        Ok(views)
    }

    /// Re-reads one cart from the log and stores the result in the
    /// projection.
    async fn refresh_cart(&self, cart_id: StreamId) -> Result<Option<CartView>, ServiceError> {
        let events = self.handler.store().read_stream(cart_id).await?;
        let view = fold_stream(&events)?;
        if let Some(view) = &view
            && self.projection.upsert(view.clone()).await
        {
            tracing::info!(%cart_id, version = %view.version, "Refreshed lagging cart view");
        }
        Ok(view)
    }

    /// Checks with the log that a cart the projection lists as active has
    /// not been checked out since.
    async fn confirm_active(&self, cart_id: StreamId) -> Result<bool, ServiceError> {
        if self.projection.get(cart_id).await.is_none() {
            // A create holding the claim is still in flight
            return Ok(true);
        }
        Ok(self
            .refresh_cart(cart_id)
            .await?
            .is_some_and(|view| !view.is_checked_out))
    }

    /// Maps a command outcome to the service result.
    ///
    /// A command can only find the cart checked out or missing when the
    /// projection lags the log, e.g. after a write whose caller went away
    /// between the append and the projection update. The view is refreshed
    /// so the next command resolves against the log's state.
    async fn settle(
        &self,
        cart_id: StreamId,
        result: Result<CommandResult<Cart>, DomainError>,
    ) -> Result<CommandResult<Cart>, ServiceError> {
        match result {
            Ok(result) => Ok(result),
            Err(err @ DomainError::Cart(CartError::AlreadyCheckedOut | CartError::NotCreated)) => {
                if let Err(refresh_err) = self.refresh_cart(cart_id).await {
                    tracing::warn!(%cart_id, error = %refresh_err, "Could not refresh cart view");
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn verify_prices(&self, cart_id: StreamId) -> Result<(), ServiceError> {
        let cart = self.handler.load(cart_id).await?;
        if cart.is_checked_out() {
            return self
                .settle(cart_id, Err(CartError::AlreadyCheckedOut.into()))
                .await
                .map(|_| ());
        }

        for item in cart.items() {
            match self.catalog.fetch_product(&item.product_id).await {
                Ok(product) if product.price.distance(item.price) > PRICE_TOLERANCE_CENTS => {
                    tracing::info!(
                        %cart_id,
                        product_id = %item.product_id,
                        cart_price = %item.price,
                        catalog_price = %product.price,
                        "Price changed since the product was added"
                    );
                    return Err(ServiceError::InvalidState(format!(
                        "price for {} has changed",
                        item.name
                    )));
                }
                Ok(_) => {}
                Err(CatalogError::NotFound(_)) => {
                    return Err(ServiceError::InvalidState(format!(
                        "product {} is no longer available",
                        item.name
                    )));
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Pushes the command's resulting state into the projection.
    async fn publish(&self, result: &CommandResult<Cart>) -> Result<CartView, ServiceError> {
        let last_modified = result
            .committed
            .last()
            .map(|e| e.timestamp)
            .unwrap_or_else(Utc::now);
        let view = CartView::from_cart(&result.aggregate, last_modified)
            .ok_or_else(ServiceError::cart_not_found)?;

        self.projection.upsert(view.clone()).await;
        tracing::debug!(
            cart_id = %view.cart_id,
            version = %result.new_version,
            attempts = result.attempts,
            "Projection updated"
        );

        Ok(view)
    }
}

/// Folds one stream's events into a view. None for an empty stream.
fn fold_stream(stream: &[EventEnvelope]) -> Result<Option<CartView>, ServiceError> {
    let history = stream
        .iter()
        .map(|e| e.decode::<CartEvent>().map(|event| (e.sequence, event)))
        .collect::<Result<Vec<_>, _>>()
        .map_err(DomainError::from)?;

    let cart = Cart::from_events(history);
    let last_modified = stream.last().map(|e| e.timestamp).unwrap_or_else(Utc::now);
    Ok(CartView::from_cart(&cart, last_modified))
}

fn user_has_active_cart() -> ServiceError {
    ServiceError::Conflict("user already has an active cart".to_string())
}

/// Picks the active cart, else the most recently modified one.
fn current_of(carts: Vec<CartView>) -> Option<CartView> {
    let (active, finalized): (Vec<_>, Vec<_>) =
        carts.into_iter().partition(|view| !view.is_checked_out);

    active
        .into_iter()
        .next()
        .or_else(|| finalized.into_iter().max_by_key(|view| view.last_modified))
}
