//! Opaque session refresh tokens.
//!
//! The caller holds the random value; the store only ever sees its SHA-256
//! digest, so a leaked table cannot be replayed.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{StoredToken, TokenKind};
use crate::services::store::{StoreError, TokenStore};

const TOKEN_BYTES: usize = 64;

/// A refresh token as handed to the client, with the row that backs it.
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub value: String,
    pub record: StoredToken,
}

#[derive(Clone)]
pub struct RefreshTokenManager {
    store: Arc<dyn TokenStore>,
    expiry: Duration,
}

impl RefreshTokenManager {
    pub fn new(store: Arc<dyn TokenStore>, expiry: Duration) -> Self {
        Self { store, expiry }
    }

    /// SHA-256 hex digest used as the stored value.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    fn generate_value() -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Build a new token without persisting it.
    pub fn mint(&self, identity_id: Uuid) -> IssuedRefreshToken {
        let value = Self::generate_value();
        let record = StoredToken::new(
            identity_id,
            TokenKind::SessionRefresh,
            Self::hash_token(&value),
            self.expiry,
        );
        IssuedRefreshToken { value, record }
    }

    pub async fn issue(&self, identity_id: Uuid) -> Result<IssuedRefreshToken, StoreError> {
        let issued = self.mint(identity_id);
        self.store.insert_token(&issued.record).await?;
        Ok(issued)
    }

    /// Expired rows are reported as absent.
    pub async fn lookup(&self, value: &str) -> Result<Option<StoredToken>, StoreError> {
        let found = self
            .store
            .find_token(TokenKind::SessionRefresh, &Self::hash_token(value))
            .await?;
        Ok(found.filter(|t| !t.is_expired(Utc::now())))
    }

    /// Idempotent: revoking an unknown token succeeds.
    pub async fn revoke(&self, value: &str) -> Result<(), StoreError> {
        let deleted = self
            .store
            .delete_token(TokenKind::SessionRefresh, &Self::hash_token(value))
            .await?;
        if !deleted {
            tracing::debug!("Revoke requested for unknown refresh token");
        }
        Ok(())
    }

    /// Swap `old_value` for a fresh token in one store operation. Returns
    /// `None` if `old_value` was already consumed.
    pub async fn rotate(
        &self,
        old_value: &str,
        identity_id: Uuid,
    ) -> Result<Option<IssuedRefreshToken>, StoreError> {
        let issued = self.mint(identity_id);
        let replaced = self
            .store
            .replace_token(
                TokenKind::SessionRefresh,
                &Self::hash_token(old_value),
                &issued.record,
            )
            .await?;
        Ok(replaced.then_some(issued))
    }
}
