use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use widgetcfg_api::config::{ServerConfig, StoreBackend};
use widgetcfg_api::router::build_app_router;
use widgetcfg_api::state::AppState;
use widgetcfg_core::manager::VersionManager;
use widgetcfg_core::memory::MemoryConfigurationStore;
use widgetcfg_core::store::ConfigurationStore;
use widgetcfg_db::PgConfigurationStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    let json_logs = config.log_json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "widgetcfg_api=debug,widgetcfg_core=debug,widgetcfg_db=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Configuration store ---
    let store: Arc<dyn ConfigurationStore> = match config.store.backend {
        StoreBackend::Postgres => {
            let database_url = config
                .store
                .database_url
                .as_deref()
                .expect("DATABASE_URL must be set when CONFIG_STORE=postgres");

            let pool = widgetcfg_db::create_pool(database_url, config.store.max_connections)
                .await
                .expect("Failed to connect to database");
            tracing::info!("Database connection pool created");

            widgetcfg_db::health_check(&pool)
                .await
                .expect("Database health check failed");
            tracing::info!("Database health check passed");

            widgetcfg_db::run_migrations(&pool)
                .await
                .expect("Failed to run database migrations");
            tracing::info!("Database migrations applied");

            Arc::new(PgConfigurationStore::new(pool).with_lock_timeout(config.store.lock_timeout))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory configuration store; state is lost on restart");
            Arc::new(MemoryConfigurationStore::auto_register())
        }
    };

    // --- App state ---
    let versions = Arc::new(VersionManager::new(store, config.versioning));
    let state = AppState {
        config: Arc::new(config.clone()),
        versions,
    };

    let app = build_app_router(state);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
    };
    let drain = Duration::from_secs(config.shutdown_timeout_secs);

    tokio::select! {
        result = server => result.expect("Server error"),
        () = drain_deadline(drain) => {
            tracing::warn!(
                timeout_secs = config.shutdown_timeout_secs,
                "Graceful shutdown timed out; dropping remaining connections",
            );
        }
    }

    tracing::info!("Graceful shutdown complete");
}

/// Resolves `drain` after a shutdown signal, bounding how long in-flight
/// requests may keep the server alive.
async fn drain_deadline(drain: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(drain).await;
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server
/// shuts down cleanly whether stopped interactively or by a process
/// manager.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
