//! Diagnostic endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::UserId;
use event_store::EventStore;
use projections::{CartView, ReadModel};
use serde::Serialize;

use crate::error::ApiError;
use crate::routes::cart::AppState;

#[derive(Serialize)]
pub struct AllCartsResponse {
    pub count: usize,
    pub active: usize,
    pub checked_out: usize,
    pub carts: Vec<CartView>,
}

#[derive(Serialize)]
pub struct UserCartsResponse {
    pub user_id: UserId,
    pub count: usize,
    pub carts: Vec<CartView>,
}

/// GET /api/debug/carts: every cart the projection holds, oldest
/// modification first.
#[tracing::instrument(skip(state))]
pub async fn all_carts<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Json<AllCartsResponse> {
    let carts = state.cart_service.projection().entries().await;
    let checked_out = carts.iter().filter(|view| view.is_checked_out).count();

    Json(AllCartsResponse {
        count: carts.len(),
        active: carts.len() - checked_out,
        checked_out,
        carts,
    })
}

/// GET /api/debug/carts/{user_id}: every cart of the user, active and
/// checked out.
#[tracing::instrument(skip(state))]
pub async fn user_carts<S: EventStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserCartsResponse>, ApiError> {
    let user_id = UserId::new(user_id);
    let carts = state.cart_service.list_carts(&user_id).await?;
    Ok(Json(UserCartsResponse {
        user_id,
        count: carts.len(),
        carts,
    }))
}
