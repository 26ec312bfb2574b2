//! Server entry point: synchronizer plus the query facade.

use std::sync::Arc;

use api::config::Config;
use api::routes::drivers::AppState;
use event_log::InMemoryEventLog;
use metrics_exporter_prometheus::PrometheusHandle;
use projection::{InMemoryProjectionStore, PostgresProjectionStore, ProjectionStore};
use sync::Synchronizer;
use tokio::signal;
use tokio::sync::watch;
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

async fn serve<P: ProjectionStore + 'static>(
    config: Config,
    store: Arc<P>,
    metrics_handle: PrometheusHandle,
) {
    let log = Arc::new(InMemoryEventLog::new());
    let synchronizer = Arc::new(Synchronizer::new(
        Arc::clone(&log),
        Arc::clone(&store),
        config.sync_config(),
    ));

    // An unreachable log or store at startup is a configuration problem;
    // everything after this point is transient and retried.
    synchronizer
        .run_backfill()
        .await
        .expect("startup backfill failed");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = tokio::spawn(Arc::clone(&synchronizer).run(shutdown_rx));

    let state = Arc::new(AppState {
        store,
        synchronizer,
    });
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = shutdown_tx.send(true);
        })
        .await
        .expect("server error");

    if let Err(error) = sync_task.await {
        tracing::warn!(%error, "synchronizer task join failed");
    }
    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(&url)
                .await
                .expect("failed to connect to database");
            let store = Arc::new(PostgresProjectionStore::new(pool));
            store.run_migrations().await.expect("migration failed");
            serve(config, store, metrics_handle).await;
        }
        None => {
            tracing::info!("DATABASE_URL unset, using in-memory projection store");
            serve(config, Arc::new(InMemoryProjectionStore::new()), metrics_handle).await;
        }
    }
}
