//! Delegated provider credentials: OAuth callback completion, refresh, and
//! lookup for downstream integrations.

use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::dtos::oauth::{ProviderConnection, ProviderToken};
use crate::models::{Provider, StoredToken, TokenKind};
use crate::services::error::ServiceError;
use crate::services::oauth_client::{
    OAuthClientCredentials, OAuthExchangeClient, ProviderTokenResponse, UpstreamError,
};
use crate::services::store::TokenStore;

#[derive(Clone)]
pub struct DelegatedTokenBroker {
    store: Arc<dyn TokenStore>,
    client: Arc<dyn OAuthExchangeClient>,
    credentials: OAuthClientCredentials,
    provider_refresh_expiry: Duration,
}

impl DelegatedTokenBroker {
    pub fn new(
        store: Arc<dyn TokenStore>,
        client: Arc<dyn OAuthExchangeClient>,
        credentials: OAuthClientCredentials,
        provider_refresh_expiry: Duration,
    ) -> Self {
        Self {
            store,
            client,
            credentials,
            provider_refresh_expiry,
        }
    }

    pub fn credentials(&self) -> &OAuthClientCredentials {
        &self.credentials
    }

    /// Exchange `code` and store the resulting credentials for `identity_id`.
    #[tracing::instrument(skip(self, code), fields(user_id = %identity_id, provider = %provider))]
    pub async fn complete_oauth_callback(
        &self,
        identity_id: Uuid,
        provider: Provider,
        code: &str,
    ) -> Result<ProviderConnection, ServiceError> {
        let tokens = self
            .client
            .exchange_code(code, &self.credentials)
            .await
            .map_err(ServiceError::ExchangeFailed)?;

        let connection = self.store_exchange_result(identity_id, provider, &tokens).await?;

        tracing::info!(
            refresh_token_stored = connection.refresh_token_stored,
            "Provider connected"
        );
        Ok(connection)
    }

    /// Re-exchange the stored provider refresh token for a new access token.
    #[tracing::instrument(skip(self), fields(user_id = %identity_id, provider = %provider))]
    pub async fn refresh_delegated_token(
        &self,
        identity_id: Uuid,
        provider: Provider,
    ) -> Result<ProviderConnection, ServiceError> {
        let stored = self
            .store
            .find_token_for_identity(identity_id, TokenKind::ProviderRefresh(provider))
            .await?
            .filter(|t| t.is_live(Utc::now()))
            .ok_or(ServiceError::NotFound)?;

        let tokens = self
            .client
            .refresh(&stored.token_value, &self.credentials)
            .await
            .map_err(ServiceError::ExchangeFailed)?;

        self.store_exchange_result(identity_id, provider, &tokens).await
    }

    /// Live access credential for `provider`. Falls back to a live personal
    /// access token when no OAuth credential is usable.
    #[tracing::instrument(skip(self), fields(user_id = %identity_id, provider = %provider))]
    pub async fn get_provider_token(
        &self,
        identity_id: Uuid,
        provider: Provider,
    ) -> Result<ProviderToken, ServiceError> {
        let now = Utc::now();

        let access = self
            .store
            .find_token_for_identity(identity_id, TokenKind::ProviderAccess(provider))
            .await?;

        if let Some(token) = access.as_ref().filter(|t| t.is_live(now)) {
            return Ok(ProviderToken::from_stored(provider, token));
        }

        let pat = self
            .store
            .find_token_for_identity(identity_id, TokenKind::PersonalAccessToken(provider))
            .await?;

        if let Some(token) = pat.as_ref().filter(|t| t.is_live(now)) {
            return Ok(ProviderToken::from_stored(provider, token));
        }

        match (access, pat) {
            (None, None) => Err(ServiceError::NotFound),
            _ => Err(ServiceError::NoValidToken),
        }
    }

    /// Store a user-supplied personal access token for `provider`.
    #[tracing::instrument(skip(self, token), fields(user_id = %identity_id, provider = %provider))]
    pub async fn store_personal_access_token(
        &self,
        identity_id: Uuid,
        provider: Provider,
        token: &str,
    ) -> Result<ProviderToken, ServiceError> {
        let stored = self
            .store
            .upsert_token(&StoredToken::new(
                identity_id,
                TokenKind::PersonalAccessToken(provider),
                token.to_string(),
                self.provider_refresh_expiry,
            ))
            .await?;

        Ok(ProviderToken::from_stored(provider, &stored))
    }

    /// Written only after a complete upstream response was parsed.
    async fn store_exchange_result(
        &self,
        identity_id: Uuid,
        provider: Provider,
        tokens: &ProviderTokenResponse,
    ) -> Result<ProviderConnection, ServiceError> {
        let access = StoredToken::expiring_in_seconds(
            identity_id,
            TokenKind::ProviderAccess(provider),
            tokens.access_token.clone(),
            tokens.expires_in,
        )
        .ok_or_else(|| {
            ServiceError::ExchangeFailed(UpstreamError::Malformed(format!(
                "expires_in out of range: {}",
                tokens.expires_in
            )))
        })?;
        let access = self.store.upsert_token(&access).await?;

        let refresh_token = tokens.refresh_token.as_deref().filter(|t| !t.is_empty());
        if let Some(refresh_token) = refresh_token {
            self.store
                .upsert_token(&StoredToken::new(
                    identity_id,
                    TokenKind::ProviderRefresh(provider),
                    refresh_token.to_string(),
                    self.provider_refresh_expiry,
                ))
                .await?;
        }

        Ok(ProviderConnection {
            provider,
            access_expires_at: access.expires_utc,
            refresh_token_stored: refresh_token.is_some(),
        })
    }
}
