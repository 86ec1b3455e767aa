//! Server-side tokens: session refresh tokens and provider credentials.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// External platforms whose credentials are brokered on a user's behalf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    AzureDevOps,
    Azure,
}

#[derive(Debug, Error)]
#[error("Unknown provider: {0}")]
pub struct UnknownProvider(pub String);

impl Provider {
    pub const ALL: [Provider; 2] = [Provider::AzureDevOps, Provider::Azure];

    /// Numeric id used by API callers.
    pub fn id(&self) -> i32 {
        match self {
            Provider::AzureDevOps => 1,
            Provider::Azure => 2,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Provider::AzureDevOps => "azure-devops",
            Provider::Azure => "azure",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl TryFrom<i32> for Provider {
    type Error = UnknownProvider;

    fn try_from(id: i32) -> Result<Self, Self::Error> {
        Provider::ALL
            .into_iter()
            .find(|p| p.id() == id)
            .ok_or_else(|| UnknownProvider(id.to_string()))
    }
}

/// Accepts either the slug or the numeric id.
impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(id) = s.parse::<i32>() {
            return Provider::try_from(id);
        }
        Provider::ALL
            .into_iter()
            .find(|p| p.slug() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

/// Closed classification of stored tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Our own refresh token; the stored value is a SHA-256 digest.
    SessionRefresh,
    ProviderAccess(Provider),
    ProviderRefresh(Provider),
    PersonalAccessToken(Provider),
}

#[derive(Debug, Error)]
#[error("Unknown token kind: {0}")]
pub struct UnknownTokenKind(pub String);

impl TokenKind {
    /// Storage discriminator.
    pub fn tag(&self) -> String {
        match self {
            TokenKind::SessionRefresh => "refresh".to_string(),
            TokenKind::ProviderAccess(p) => format!("provider-access:{}", p.slug()),
            TokenKind::ProviderRefresh(p) => format!("provider-refresh:{}", p.slug()),
            TokenKind::PersonalAccessToken(p) => format!("pat:{}", p.slug()),
        }
    }

}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

impl FromStr for TokenKind {
    type Err = UnknownTokenKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "refresh" {
            return Ok(TokenKind::SessionRefresh);
        }
        let unknown = || UnknownTokenKind(s.to_string());
        let (family, provider) = s.split_once(':').ok_or_else(unknown)?;
        let provider = Provider::ALL
            .into_iter()
            .find(|p| p.slug() == provider)
            .ok_or_else(unknown)?;
        match family {
            "provider-access" => Ok(TokenKind::ProviderAccess(provider)),
            "provider-refresh" => Ok(TokenKind::ProviderRefresh(provider)),
            "pat" => Ok(TokenKind::PersonalAccessToken(provider)),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for TokenKind {
    type Error = UnknownTokenKind;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A token row owned by one identity.
#[derive(Debug, Clone, FromRow)]
pub struct StoredToken {
    pub token_id: Uuid,
    pub identity_id: Uuid,
    #[sqlx(try_from = "String")]
    pub token_kind: TokenKind,
    pub token_value: String,
    pub expires_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl StoredToken {
    /// Expiry saturates at the latest representable instant.
    pub fn new(identity_id: Uuid, token_kind: TokenKind, token_value: String, ttl: Duration) -> Self {
        let now = Utc::now();
        let expires_utc = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        Self::with_expiry(identity_id, token_kind, token_value, now, expires_utc)
    }

    /// For lifetimes reported by a remote party. `None` when the expiry
    /// cannot be represented.
    pub fn expiring_in_seconds(
        identity_id: Uuid,
        token_kind: TokenKind,
        token_value: String,
        seconds: i64,
    ) -> Option<Self> {
        let now = Utc::now();
        let expires_utc = now.checked_add_signed(Duration::try_seconds(seconds)?)?;
        Some(Self::with_expiry(identity_id, token_kind, token_value, now, expires_utc))
    }

    fn with_expiry(
        identity_id: Uuid,
        token_kind: TokenKind,
        token_value: String,
        now: DateTime<Utc>,
        expires_utc: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id: Uuid::new_v4(),
            identity_id,
            token_kind,
            token_value,
            expires_utc,
            created_utc: now,
            updated_utc: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_utc
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now) && !self.token_value.is_empty()
    }
}
