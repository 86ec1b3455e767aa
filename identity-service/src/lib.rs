pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    body::Body,
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use chrono::Duration;
use service_core::error::AppError;
use service_core::middleware::{
    make_request_span, request_id_middleware, security_headers_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::IdentityConfig;
use crate::services::{
    AuthService, CredentialStore, DelegatedTokenBroker, EntraTokenClient, JwtService,
    OAuthClientCredentials, RefreshTokenManager, TokenStore,
};
use crate::utils::PasswordHasher;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<IdentityConfig>,
    pub jwt: JwtService,
    pub auth_service: AuthService,
    pub broker: DelegatedTokenBroker,
    pub oauth_client: EntraTokenClient,
    pub credentials: Arc<dyn CredentialStore>,
}

impl AppState {
    /// Wire the services over one backing store.
    pub fn new<S>(
        config: IdentityConfig,
        store: Arc<S>,
        oauth_client: EntraTokenClient,
        hasher: PasswordHasher,
    ) -> Self
    where
        S: CredentialStore + TokenStore + 'static,
    {
        let credentials: Arc<dyn CredentialStore> = store.clone();
        let tokens: Arc<dyn TokenStore> = store;

        let jwt = JwtService::new(&config.jwt);
        let refresh_tokens = RefreshTokenManager::new(
            tokens.clone(),
            Duration::days(config.jwt.refresh_token_expiry_days),
        );
        let auth_service = AuthService::new(
            credentials.clone(),
            refresh_tokens,
            jwt.clone(),
            hasher,
            config.lockout.policy(),
        );
        let broker = DelegatedTokenBroker::new(
            tokens,
            Arc::new(oauth_client.clone()),
            OAuthClientCredentials::from(&config.entra),
            Duration::days(config.entra.provider_refresh_token_expiry_days),
        );

        Self {
            config: Arc::new(config),
            jwt,
            auth_service,
            broker,
            oauth_client,
            credentials,
        }
    }
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .map(|origin| {
            origin.parse::<HeaderValue>().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("Invalid CORS origin {}: {}", origin, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    let timeout = std::time::Duration::from_secs(state.config.security.request_timeout_seconds);

    let protected = Router::new()
        .route("/api/auth/revoke", post(handlers::auth::revoke))
        .route("/api/oauth/callback", get(handlers::oauth::callback))
        .route("/api/oauth/:provider/connect", get(handlers::oauth::connect))
        .route("/api/oauth/:provider/refresh", post(handlers::oauth::refresh))
        .route("/api/oauth/:provider/token", get(handlers::oauth::token))
        .route(
            "/api/oauth/:provider/personal-access-token",
            put(handlers::oauth::store_personal_access_token),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login))
        .route("/api/auth/refresh-token", post(handlers::auth::refresh))
        .merge(protected)
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(cors)
        .layer(from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<Body>))
        .layer(from_fn(request_id_middleware));

    Ok(app)
}
