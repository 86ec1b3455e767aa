//! In-process store used by tests and `STORE_BACKEND=memory`.
//!
//! Every operation runs under a single mutex, so multi-row writes
//! (registration, rotation) are atomic and failed-login counting cannot lose
//! updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::models::{
    Identity, LockoutPolicy, Organization, OrganizationMember, StoredToken, TokenKind,
};
use crate::services::store::{CredentialStore, NewAccount, StoreError, TokenStore};

#[derive(Default)]
struct State {
    identities: HashMap<Uuid, Identity>,
    organizations: HashMap<Uuid, Organization>,
    memberships: Vec<OrganizationMember>,
    tokens: Vec<StoredToken>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("In-memory store mutex poisoned: {}", e)))
    }

    /// Number of stored tokens of `kind` owned by `identity_id`.
    pub fn token_count(&self, identity_id: Uuid, kind: TokenKind) -> Result<usize, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .iter()
            .filter(|t| t.identity_id == identity_id && t.token_kind == kind)
            .count())
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn find_identity_by_email(&self, email: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self
            .lock()?
            .identities
            .values()
            .find(|i| i.email == email)
            .cloned())
    }

    async fn find_identity_by_id(&self, identity_id: Uuid) -> Result<Option<Identity>, StoreError> {
        Ok(self.lock()?.identities.get(&identity_id).cloned())
    }

    async fn save_identity(&self, identity: &Identity) -> Result<(), StoreError> {
        self.lock()?
            .identities
            .insert(identity.identity_id, identity.clone());
        Ok(())
    }

    async fn record_failed_login(
        &self,
        identity_id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Option<Identity>, StoreError> {
        let mut state = self.lock()?;
        Ok(state.identities.get_mut(&identity_id).map(|identity| {
            identity.record_failed_login(policy, now);
            identity.clone()
        }))
    }

    async fn find_current_membership(
        &self,
        identity_id: Uuid,
    ) -> Result<Option<OrganizationMember>, StoreError> {
        Ok(self
            .lock()?
            .memberships
            .iter()
            .filter(|m| m.identity_id == identity_id)
            .min_by_key(|m| m.created_utc)
            .cloned())
    }

    async fn create_account(&self, account: &NewAccount) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state
            .identities
            .values()
            .any(|i| i.email == account.identity.email)
        {
            return Err(StoreError::Duplicate(format!(
                "identity with email {}",
                account.identity.email
            )));
        }

        state
            .identities
            .insert(account.identity.identity_id, account.identity.clone());
        state.organizations.insert(
            account.organization.organization_id,
            account.organization.clone(),
        );
        state.memberships.push(account.membership.clone());
        state.tokens.push(account.refresh_token.clone());
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.lock().map(|_| ())
    }
}

#[async_trait]
impl TokenStore for InMemoryStore {
    async fn insert_token(&self, token: &StoredToken) -> Result<(), StoreError> {
        self.lock()?.tokens.push(token.clone());
        Ok(())
    }

    async fn find_token(
        &self,
        kind: TokenKind,
        value: &str,
    ) -> Result<Option<StoredToken>, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .iter()
            .find(|t| t.token_kind == kind && t.token_value == value)
            .cloned())
    }

    async fn delete_token(&self, kind: TokenKind, value: &str) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let before = state.tokens.len();
        state
            .tokens
            .retain(|t| !(t.token_kind == kind && t.token_value == value));
        Ok(state.tokens.len() != before)
    }

    async fn replace_token(
        &self,
        kind: TokenKind,
        old_value: &str,
        replacement: &StoredToken,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock()?;
        let Some(index) = state
            .tokens
            .iter()
            .position(|t| t.token_kind == kind && t.token_value == old_value)
        else {
            return Ok(false);
        };
        state.tokens.remove(index);
        state.tokens.push(replacement.clone());
        Ok(true)
    }

    async fn upsert_token(&self, token: &StoredToken) -> Result<StoredToken, StoreError> {
        let mut state = self.lock()?;
        let existing = state
            .tokens
            .iter_mut()
            .find(|t| t.identity_id == token.identity_id && t.token_kind == token.token_kind);

        match existing {
            Some(row) => {
                row.token_value = token.token_value.clone();
                row.expires_utc = token.expires_utc;
                row.updated_utc = token.updated_utc;
                Ok(row.clone())
            }
            None => {
                state.tokens.push(token.clone());
                Ok(token.clone())
            }
        }
    }

    async fn find_token_for_identity(
        &self,
        identity_id: Uuid,
        kind: TokenKind,
    ) -> Result<Option<StoredToken>, StoreError> {
        Ok(self
            .lock()?
            .tokens
            .iter()
            .find(|t| t.identity_id == identity_id && t.token_kind == kind)
            .cloned())
    }

    async fn purge_expired_refresh_tokens(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.lock()?;
        let before = state.tokens.len();
        state
            .tokens
            .retain(|t| !(t.token_kind == TokenKind::SessionRefresh && t.is_expired(now)));
        Ok((before - state.tokens.len()) as u64)
    }
}
