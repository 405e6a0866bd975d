//! API server entry point.

use api::config::{Config, LogFormat};
use common::{Gil, ItemId};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::{InMemorySagaStore, PostgresSagaStore, SagaStore};
use tokio::signal;
use trading::{CatalogItem, InMemoryCatalog, TradingConfig};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Items offered until a catalog service is wired in.
async fn seed_catalog(catalog: &InMemoryCatalog) {
    let items = [
        ("Potion", "Restores 50 HP", 50),
        ("Ether", "Restores 30 MP", 150),
        ("Phoenix Down", "Revives a fallen ally", 300),
    ];
    for (name, description, price) in items {
        catalog
            .add_item(CatalogItem::new(
                ItemId::new(),
                name,
                description,
                Gil::from_whole(price),
            ))
            .await;
    }
}

async fn serve<S: SagaStore + 'static>(
    store: S,
    config: &Config,
    trading_config: TradingConfig,
    metrics_handle: PrometheusHandle,
) {
    let workers = trading_config.worker_count;
    let (state, pool) = api::create_default_state(store, trading_config);
    seed_catalog(&state.catalog).await;
    let app = api::create_app(state.clone(), metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, workers, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // Dropping the last publisher lets the workers drain and stop.
    drop(state);
    pool.join().await;
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);
    let trading_config = TradingConfig::from_env();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the saga store and run
    match &config.database_url {
        Some(url) => {
            let store = PostgresSagaStore::connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            store
                .run_migrations()
                .await
                .expect("failed to run migrations");
            tracing::info!("using PostgreSQL saga store");
            serve(store, &config, trading_config, metrics_handle).await;
        }
        None => {
            tracing::info!("using in-memory saga store");
            serve(InMemorySagaStore::new(), &config, trading_config, metrics_handle).await;
        }
    }

    tracing::info!("server shut down gracefully");
}
