//! HTTP surface for the trading service.
//!
//! Accepts purchase requests, answers purchase status queries and serves the
//! store view, with structured logging (tracing) and Prometheus metrics.
//! Purchases are published to an in-process channel drained by the trading
//! worker pool.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::SagaStore;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use trading::{
    BroadcastNotifier, InMemoryBalances, InMemoryCatalog, InMemoryDeadLetters, InMemoryInventory,
    InMemoryMessageBus, Ingress, PurchaseOrchestrator, StoreView, TradingConfig, WorkerPool,
};

pub use routes::purchase::{AppState, Orchestrator};

/// Capacity of the inbound purchase channel.
const PUBLISH_BUFFER: usize = 1024;

/// Capacity of the status notification broadcast channel.
const NOTIFY_BUFFER: usize = 256;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: SagaStore + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/purchase", post(routes::purchase::submit::<S>))
        .route(
            "/purchase/status/{correlation_id}",
            get(routes::purchase::status::<S>),
        )
        .route("/store", get(routes::store::get::<S>))
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

/// Wires the orchestrator, in-memory collaborators and the worker pool.
///
/// Must be called from within a tokio runtime. The pool stops once the
/// returned state, which owns the only publisher, is dropped.
pub fn create_default_state<S: SagaStore + 'static>(
    store: S,
    config: TradingConfig,
) -> (Arc<AppState<S>>, WorkerPool) {
    let catalog = InMemoryCatalog::new();
    let inventory = InMemoryInventory::new();
    let balances = InMemoryBalances::new();
    let bus = InMemoryMessageBus::new();
    let notifier = BroadcastNotifier::new(NOTIFY_BUFFER);
    let workers = config.worker_count;
    let retry = config.retry;

    let orchestrator: Arc<Orchestrator<S>> = Arc::new(PurchaseOrchestrator::new(
        store,
        catalog.clone(),
        bus.clone(),
        notifier.clone(),
        config,
    ));

    let (publisher, receiver) = mpsc::channel(PUBLISH_BUFFER);
    let ingress = Arc::new(Ingress::new(
        Arc::clone(&orchestrator),
        InMemoryDeadLetters::new(),
        retry,
    ));
    let pool = WorkerPool::spawn(ingress, receiver, workers);

    let state = Arc::new(AppState {
        orchestrator,
        publisher,
        store_view: StoreView::new(catalog.clone(), inventory.clone(), balances.clone()),
        catalog,
        inventory,
        balances,
        bus,
        notifier,
    });

    (state, pool)
}
