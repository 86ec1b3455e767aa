//! Services layer: credential and token lifecycle.

pub mod auth;
pub mod broker;
pub mod database;
pub mod error;
pub mod jwt;
pub mod memory;
pub mod oauth_client;
pub mod refresh_tokens;
pub mod store;

pub use auth::AuthService;
pub use broker::DelegatedTokenBroker;
pub use database::PgStore;
pub use error::ServiceError;
pub use jwt::{AccessTokenClaims, IssuedAccessToken, JwtService};
pub use memory::InMemoryStore;
pub use oauth_client::{
    EntraTokenClient, OAuthClientCredentials, OAuthExchangeClient, ProviderTokenResponse,
    UpstreamError,
};
pub use refresh_tokens::{IssuedRefreshToken, RefreshTokenManager};
pub use store::{CredentialStore, NewAccount, StoreError, TokenStore};
