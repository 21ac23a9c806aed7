//! HTTP API server with observability for the cart engine.
//!
//! Exposes the cart commands over REST, with structured logging (tracing)
//! and Prometheus metrics.

pub mod catalog;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use cart_service::{CartService, ProductCatalog, ServiceConfig};
use event_store::EventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use projections::{CartProjection, Projection, ProjectionProcessor};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::cart::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: EventStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/api/cart/create", post(routes::cart::create::<S>))
        .route("/api/cart/add", post(routes::cart::add::<S>))
        .route("/api/cart/remove", post(routes::cart::remove::<S>))
        .route("/api/cart/checkout", post(routes::cart::checkout::<S>))
        .route("/api/cart/{user_id}", get(routes::cart::get::<S>))
        .route("/api/debug/carts", get(routes::debug::all_carts::<S>))
        .route(
            "/api/debug/carts/{user_id}",
            get(routes::debug::user_carts::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state: the cart service and a projection
/// processor sharing one cart projection.
pub fn create_default_state<S: EventStore + Clone + 'static>(
    event_store: S,
    catalog: Arc<dyn ProductCatalog>,
    config: ServiceConfig,
) -> Arc<AppState<S>> {
    let projection = CartProjection::new();

    let mut processor = ProjectionProcessor::new(event_store.clone());
    processor.register(Box::new(projection.clone()) as Box<dyn Projection>);

    let cart_service = CartService::new(event_store, projection, catalog).with_config(config);

    Arc::new(AppState {
        cart_service,
        projection_processor: Arc::new(processor),
    })
}
