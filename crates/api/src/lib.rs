//! Read-only HTTP query facade over the driver points projection.
//!
//! Serves driver aggregates, violation histories, and synchronizer status,
//! with structured logging (tracing) and Prometheus metrics. Writes never
//! enter through this surface; the event log is the only source of change.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use event_log::{EventLog, InMemoryEventLog};
use metrics_exporter_prometheus::PrometheusHandle;
use projection::{InMemoryProjectionStore, ProjectionStore};
use sync::{SyncConfig, Synchronizer};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::drivers::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<L, P>(state: Arc<AppState<L, P>>, metrics_handle: PrometheusHandle) -> Router
where
    L: EventLog + 'static,
    P: ProjectionStore + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/sync", get(routes::sync_status::get::<L, P>))
        .route("/drivers/{address}", get(routes::drivers::get::<L, P>))
        .route(
            "/drivers/{address}/violations",
            get(routes::drivers::violations::<L, P>),
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

/// Wires the in-memory log, projection store, and synchronizer together.
///
/// The log handle is returned so a caller (or test) can append entries.
pub fn create_default_state(
    sync_config: SyncConfig,
) -> (
    Arc<AppState<InMemoryEventLog, InMemoryProjectionStore>>,
    Arc<Synchronizer<InMemoryEventLog, InMemoryProjectionStore>>,
    Arc<InMemoryEventLog>,
) {
    let log = Arc::new(InMemoryEventLog::new());
    let store = Arc::new(InMemoryProjectionStore::new());
    let synchronizer = Arc::new(Synchronizer::new(
        Arc::clone(&log),
        Arc::clone(&store),
        sync_config,
    ));

    let state = Arc::new(AppState {
        store,
        synchronizer: Arc::clone(&synchronizer),
    });

    (state, synchronizer, log)
}
