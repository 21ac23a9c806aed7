//! Cart command and query endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use cart_service::{AddProduct, CartService, Checkout, CreateCart, GetCart, RemoveProduct};
use event_store::EventStore;
use projections::{CartView, ProjectionProcessor};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
pub struct AppState<S: EventStore> {
    pub cart_service: CartService<S>,
    pub projection_processor: Arc<ProjectionProcessor<S>>,
}

#[derive(Serialize)]
pub struct CartCreatedResponse {
    pub cart_id: String,
}

/// POST /api/cart/create
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<CreateCart>, JsonRejection>,
) -> Result<(StatusCode, Json<CartCreatedResponse>), ApiError> {
    let Json(cmd) = payload?;
    let cart_id = state.cart_service.create_cart(cmd).await?;

    Ok((
        StatusCode::CREATED,
        Json(CartCreatedResponse {
            cart_id: cart_id.to_string(),
        }),
    ))
}

/// POST /api/cart/add
#[tracing::instrument(skip(state, payload))]
pub async fn add<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<AddProduct>, JsonRejection>,
) -> Result<Json<CartView>, ApiError> {
    let Json(cmd) = payload?;
    Ok(Json(state.cart_service.add_product(cmd).await?))
}

/// POST /api/cart/remove
#[tracing::instrument(skip(state, payload))]
pub async fn remove<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<RemoveProduct>, JsonRejection>,
) -> Result<Json<CartView>, ApiError> {
    let Json(cmd) = payload?;
    Ok(Json(state.cart_service.remove_product(cmd).await?))
}

/// POST /api/cart/checkout
#[tracing::instrument(skip(state, payload))]
pub async fn checkout<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    payload: Result<Json<Checkout>, JsonRejection>,
) -> Result<Json<CartView>, ApiError> {
    let Json(cmd) = payload?;
    Ok(Json(state.cart_service.checkout(cmd).await?))
}

/// GET /api/cart/{user_id}
#[tracing::instrument(skip(state))]
pub async fn get<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<CartView>, ApiError> {
    let view = state.cart_service.get_cart(GetCart::new(user_id)).await?;
    Ok(Json(view))
}
