use identity_service::{
    build_router,
    config::{IdentityConfig, StoreBackend},
    db,
    services::{EntraTokenClient, InMemoryStore, PgStore, TokenStore},
    utils::PasswordHasher,
    AppState,
};
use service_core::observability::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        store = ?config.store_backend,
        "Starting identity service"
    );

    let oauth_client = EntraTokenClient::from_config(&config.entra)?;
    let hasher = PasswordHasher::default();

    let state = match config.store_backend {
        StoreBackend::Postgres => {
            let pool = db::create_pool(&config.database)
                .await
                .map_err(|e| service_core::error::AppError::DatabaseError(e.into()))?;
            db::run_migrations(&pool)
                .await
                .map_err(|e| service_core::error::AppError::DatabaseError(e.into()))?;

            let store = Arc::new(PgStore::new(pool));
            spawn_refresh_token_purge(store.clone());
            AppState::new(config.clone(), store, oauth_client, hasher)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; state is lost on restart");
            let store = Arc::new(InMemoryStore::new());
            spawn_refresh_token_purge(store.clone());
            AppState::new(config.clone(), store, oauth_client, hasher)
        }
    };

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

/// Expired refresh tokens are already rejected on lookup; this only reclaims storage.
fn spawn_refresh_token_purge(store: Arc<dyn TokenStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(PURGE_INTERVAL);
        loop {
            interval.tick().await;
            match store.purge_expired_refresh_tokens(chrono::Utc::now()).await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Purged expired refresh tokens"),
                Err(e) => tracing::error!(error = %e, "Refresh token purge failed"),
            }
        }
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
