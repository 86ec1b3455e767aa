#![allow(dead_code)]

use identity_service::{
    config::{
        DatabaseConfig, EntraConfig, Environment, IdentityConfig, JwtConfig, LockoutConfig,
        SecurityConfig, StoreBackend,
    },
    dtos::auth::{LoginRequest, RegisterRequest},
    services::{EntraTokenClient, InMemoryStore},
    utils::PasswordHasher,
    AppState,
};
use secrecy::SecretString;
use std::sync::Arc;
use std::time::Duration;

pub const PASSWORD: &str = "Secret1!";

pub fn test_config(entra_authority: &str) -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        store_backend: StoreBackend::Memory,
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout_seconds: 1,
        },
        jwt: JwtConfig {
            signing_key: SecretString::new("integration-test-signing-key-0123456789".to_string()),
            issuer: "identity-service".to_string(),
            audience: "identity-platform".to_string(),
            access_token_expiry_minutes: 60,
            refresh_token_expiry_days: 7,
        },
        lockout: LockoutConfig {
            max_failed_attempts: 5,
            duration_minutes: 15,
        },
        entra: EntraConfig {
            authority: entra_authority.to_string(),
            tenant_id: "tenant-1".to_string(),
            client_id: "client-1".to_string(),
            client_secret: SecretString::new("client-secret".to_string()),
            redirect_uri: "http://localhost:8080/api/oauth/callback".to_string(),
            scope: "499b84ac-1321-427f-aa17-267ca6975798/.default".to_string(),
            http_timeout_seconds: 5,
            provider_refresh_token_expiry_days: 90,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            request_timeout_seconds: 30,
        },
    }
}

/// Argon2 at minimum cost so tests stay fast.
pub fn fast_hasher() -> PasswordHasher {
    PasswordHasher::with_cost(1024, 1, 1).unwrap()
}

pub struct TestContext {
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
}

pub fn context_with(config: IdentityConfig) -> TestContext {
    let store = Arc::new(InMemoryStore::new());
    let oauth_client = EntraTokenClient::new(
        &config.entra.authority,
        &config.entra.scope,
        Duration::from_secs(config.entra.http_timeout_seconds),
    )
    .unwrap();
    let state = AppState::new(config, store.clone(), oauth_client, fast_hasher());
    TestContext { state, store }
}

pub fn context() -> TestContext {
    context_with(test_config("http://127.0.0.1:9"))
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        password: PASSWORD.to_string(),
        confirm_password: PASSWORD.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        organization_name: "Analytical Engines".to_string(),
        time_zone: Some("Europe/London".to_string()),
    }
}

pub fn login_request(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}
