//! API server entry point.

use api::Coordinator;
use api::config::{Config, LogFormat};
use checkout::{CheckoutConfig, CheckoutStore, InMemoryPaymentGateway};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, PostgresStore};
use tokio::signal;
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

/// Periodically voids payments held by checkout attempts nobody came back for.
fn spawn_stalled_attempt_sweep<S: CheckoutStore>(
    coordinator: Coordinator<S>,
    config: &CheckoutConfig,
) {
    let older_than = config.stale_attempt_after;
    let mut ticker = tokio::time::interval(config.sweep_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    tokio::spawn(async move {
        loop {
            ticker.tick().await;
            if let Err(err) = coordinator.release_stalled_attempts(older_than).await {
                tracing::warn!(error = %err, "stalled attempt sweep failed");
            }
        }
    });
}

/// Builds the application around `store` and serves it until shutdown.
async fn serve<S: CheckoutStore>(store: S, config: Config, metrics_handle: PrometheusHandle) {
    let state = api::AppState::new(
        store,
        api::demo_catalog(),
        InMemoryPaymentGateway::new(),
        config.checkout.clone(),
    );
    spawn_stalled_attempt_sweep(state.coordinator.clone(), &config.checkout);
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, currency = %config.checkout.currency, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}

#[tokio::main]
async fn main() {
    let config = Config::from_env().expect("invalid configuration");

    // 1. Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Pick the store and serve
    match config.database_url.clone() {
        Some(url) => {
            let pool = sqlx::PgPool::connect(&url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresStore::new(pool);
            store.run_migrations().await.expect("migrations failed");
            tracing::info!("using PostgreSQL store");
            serve(store, config, metrics_handle).await;
        }
        None => {
            let store = InMemoryStore::new();
            api::seed_demo_coupons(&store)
                .await
                .expect("failed to seed demo coupons");
            tracing::info!("using in-memory store with demo coupons");
            serve(store, config, metrics_handle).await;
        }
    }
}
