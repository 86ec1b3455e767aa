use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Provider, StoredToken, TokenKind};

/// Query string the provider appends when redirecting back.
#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub provider: Provider,
    pub authorize_url: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PersonalAccessTokenRequest {
    #[validate(length(min = 1, max = 4096, message = "Token is required"))]
    pub token: String,
}

/// Delegated credential returned to callers. `kind` says whether it came
/// from the OAuth flow or a personal access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderToken {
    pub provider: Provider,
    pub kind: ProviderTokenKind,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderTokenKind {
    #[serde(rename = "oauth")]
    OAuth,
    PersonalAccessToken,
}

impl ProviderToken {
    pub fn from_stored(provider: Provider, token: &StoredToken) -> Self {
        let kind = match token.token_kind {
            TokenKind::PersonalAccessToken(_) => ProviderTokenKind::PersonalAccessToken,
            _ => ProviderTokenKind::OAuth,
        };
        Self {
            provider,
            kind,
            access_token: token.token_value.clone(),
            expires_at: token.expires_utc,
        }
    }
}

/// Outcome of a completed callback or refresh. Token values are not echoed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub provider: Provider,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_token_stored: bool,
}
