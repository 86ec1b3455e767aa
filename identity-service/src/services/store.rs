//! Persistence boundary for identities and tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Identity, LockoutPolicy, Organization, OrganizationMember, StoredToken, TokenKind,
};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Rows written together when an account is registered.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub identity: Identity,
    pub organization: Organization,
    pub membership: OrganizationMember,
    pub refresh_token: StoredToken,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Case-sensitive match on the stored email.
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError>;

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError>;

    async fn save_identity(&self, identity: &Identity) -> Result<(), StoreError>;

    /// Atomically count one failed attempt, locking the identity when the
    /// policy threshold is reached. Returns the updated record.
    async fn record_failed_login(
        &self,
        identity_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError>;

    async fn find_current_membership(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<OrganizationMember>, StoreError>;

    /// Insert every row of `account` or none of them.
    /// Fails with `Duplicate` if the email is already taken.
    async fn create_account(&self, account: &NewAccount) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert_token(&self, token: &StoredToken) -> Result<(), StoreError>;

    async fn find_token(
        &self,
        kind: TokenKind,
        value: &str,
    ) -> Result<Option<StoredToken>, StoreError>;

    /// Returns whether a row was deleted.
    async fn delete_token(&self, kind: TokenKind, value: &str) -> Result<bool, StoreError>;

    /// Delete `old_value` and insert `replacement` in one unit. If no row
    /// matched `old_value` nothing is inserted and `false` is returned.
    async fn replace_token(
        &self,
        kind: TokenKind,
        old_value: &str,
        replacement: &StoredToken,
    ) -> Result<bool, StoreError>;

    /// Insert or update the single row for `(identity_id, token_kind)`.
    async fn upsert_token(&self, token: &StoredToken) -> Result<StoredToken, StoreError>;

    async fn find_token_for_identity(
        &self,
        identity_id: Uuid,
        kind: TokenKind,
    ) -> Result<Option<StoredToken>, StoreError>;

    /// Delete expired session refresh tokens. Provider credentials are kept.
    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}
