//! HTTP API server with observability for the stock ledger.
//!
//! Provides REST endpoints for operations, stock records, ledger history and
//! alerts, with structured logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post, put};
use domain::OperationNotifier;
use metrics_exporter_prometheus::PrometheusHandle;
use stock_store::InventoryStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use state::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: InventoryStore + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route(
            "/operations",
            post(routes::operations::create::<S>).get(routes::operations::list::<S>),
        )
        .route(
            "/operations/{id}",
            get(routes::operations::get::<S>).delete(routes::operations::delete::<S>),
        )
        .route(
            "/operations/{id}/lines",
            post(routes::operations::add_line::<S>),
        )
        .route(
            "/operations/{id}/lines/{line_id}/damages",
            post(routes::operations::register_damage::<S>),
        )
        .route(
            "/operations/{id}/close",
            post(routes::operations::close::<S>),
        )
        .route("/operations/{id}/void", post(routes::operations::void::<S>))
        .route(
            "/operations/{id}/movements",
            get(routes::operations::movements::<S>),
        )
        .route(
            "/stock",
            post(routes::stock::create::<S>).get(routes::stock::list::<S>),
        )
        .route("/stock/alerts", get(routes::stock::alerts::<S>))
        .route("/stock/{id}", get(routes::stock::get::<S>))
        .route(
            "/stock/{id}/settings",
            put(routes::stock::update_settings::<S>),
        )
        .route("/stock/{id}/adjust", post(routes::stock::adjust::<S>))
        .route("/stock/{id}/movements", get(routes::stock::movements::<S>))
        .route("/stock/{id}/monthly", get(routes::stock::monthly::<S>))
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

/// Creates the application state over a store.
pub fn create_default_state<S: InventoryStore + Clone + 'static>(
    store: S,
    config: &Config,
    notifier: Arc<dyn OperationNotifier>,
) -> Arc<AppState<S>> {
    Arc::new(AppState::new(store, config, notifier))
}
