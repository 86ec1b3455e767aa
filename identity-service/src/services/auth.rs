use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    dtos::auth::{AuthResponse, LoginRequest, RefreshRequest, RegisterRequest},
    models::{Identity, LockState, LockoutPolicy, Organization, OrganizationMember},
    services::{
        jwt::IssuedAccessToken,
        refresh_tokens::IssuedRefreshToken,
        store::{CredentialStore, NewAccount, StoreError},
        JwtService, RefreshTokenManager, ServiceError,
    },
    utils::{Password, PasswordHasher},
};

/// Salt used to burn one hash computation when the email is unknown, so
/// response time does not reveal whether an account exists.
const UNKNOWN_ACCOUNT_SALT: &str = "unknown-account-timing-salt";

#[derive(Clone)]
pub struct AuthService {
    credentials: Arc<dyn CredentialStore>,
    refresh_tokens: RefreshTokenManager,
    jwt: JwtService,
    hasher: PasswordHasher,
    lockout: LockoutPolicy,
}

impl AuthService {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        refresh_tokens: RefreshTokenManager,
        jwt: JwtService,
        hasher: PasswordHasher,
        lockout: LockoutPolicy,
    ) -> Self {
        Self {
            credentials,
            refresh_tokens,
            jwt,
            hasher,
            lockout,
        }
    }

    /// Create identity, organization, owner membership and first refresh
    /// token in one unit, then hand back a signed session.
    #[tracing::instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        if self
            .credentials
            .find_identity_by_email(&req.email)
            .await?
            .is_some()
        {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let salt = self.hasher.generate_salt();
        let password_hash = self.hasher.hash(&Password::new(req.password), &salt)?;

        let identity = Identity::new(
            req.email,
            password_hash,
            salt,
            req.first_name,
            req.last_name,
            req.time_zone,
        );
        let organization = Organization::new(req.organization_name, identity.identity_id);
        let membership =
            OrganizationMember::owner(organization.organization_id, identity.identity_id);

        let refresh_token = self.refresh_tokens.mint(identity.identity_id);
        let access_token = self.jwt.issue_access_token(
            &identity,
            organization.organization_id,
            &membership.roles(),
        )?;

        let account = NewAccount {
            identity,
            organization,
            membership,
            refresh_token: refresh_token.record.clone(),
        };

        match self.credentials.create_account(&account).await {
            Ok(()) => {}
            Err(StoreError::Duplicate(_)) => return Err(ServiceError::EmailAlreadyRegistered),
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            user_id = %account.identity.identity_id,
            organization_id = %account.organization.organization_id,
            "User registered"
        );

        Ok(session_response(
            &account.identity,
            account.organization.organization_id,
            access_token,
            refresh_token,
        ))
    }

    #[tracing::instrument(skip(self, req), fields(email = %req.email))]
    pub async fn login(&self, req: LoginRequest) -> Result<AuthResponse, ServiceError> {
        let password = Password::new(req.password);
        let now = Utc::now();

        let Some(mut identity) = self.credentials.find_identity_by_email(&req.email).await? else {
            let _ = self.hasher.verify(&password, UNKNOWN_ACCOUNT_SALT, "")?;
            tracing::warn!("Login attempt for unknown email");
            return Err(ServiceError::InvalidCredentials);
        };

        if let LockState::Locked { until } = identity.lock_state(now) {
            tracing::warn!(user_id = %identity.identity_id, locked_until = %until, "Login attempt on locked account");
            return Err(ServiceError::AccountLocked);
        }

        if identity.lockout_elapsed(now) {
            identity.clear_lockout(now);
            self.credentials.save_identity(&identity).await?;
            tracing::info!(user_id = %identity.identity_id, "Lockout window elapsed, counter reset");
        }

        let matches =
            self.hasher
                .verify(&password, &identity.password_salt, &identity.password_hash)?;

        if !matches {
            let updated = self
                .credentials
                .record_failed_login(identity.identity_id, &self.lockout, now)
                .await?;

            match updated {
                Some(updated) if updated.lock_state(now) != LockState::Active => {
                    tracing::warn!(
                        user_id = %identity.identity_id,
                        failed_attempts = updated.failed_password_attempts,
                        "Account locked after repeated failed logins"
                    );
                }
                Some(updated) => {
                    tracing::warn!(
                        user_id = %identity.identity_id,
                        failed_attempts = updated.failed_password_attempts,
                        "Failed login"
                    );
                }
                None => {}
            }
            return Err(ServiceError::InvalidCredentials);
        }

        if !identity.is_activated {
            tracing::warn!(user_id = %identity.identity_id, "Login attempt on inactive account");
            return Err(ServiceError::InvalidCredentials);
        }

        identity.record_successful_login(now);
        self.credentials.save_identity(&identity).await?;

        let membership = self
            .credentials
            .find_current_membership(identity.identity_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(user_id = %identity.identity_id, "Identity has no organization");
                ServiceError::NoOrganization
            })?;

        let refresh_token = self.refresh_tokens.issue(identity.identity_id).await?;
        let access_token = self.jwt.issue_access_token(
            &identity,
            membership.organization_id,
            &membership.roles(),
        )?;

        tracing::info!(user_id = %identity.identity_id, "User logged in");

        Ok(session_response(
            &identity,
            membership.organization_id,
            access_token,
            refresh_token,
        ))
    }

    /// Exchange a refresh token for a new session. The access token may be
    /// expired but must carry our signature and name the token's owner.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, req: RefreshRequest) -> Result<AuthResponse, ServiceError> {
        let claims = self
            .jwt
            .parse_expired_token(&req.access_token)
            .map_err(|_| ServiceError::InvalidToken)?;
        let identity_id = claims.identity_id().ok_or(ServiceError::InvalidToken)?;

        let stored = self
            .refresh_tokens
            .lookup(&req.refresh_token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if stored.identity_id != identity_id {
            tracing::warn!(
                user_id = %identity_id,
                token_owner = %stored.identity_id,
                "Refresh token presented with another user's access token"
            );
            return Err(ServiceError::InvalidToken);
        }

        let identity = self
            .credentials
            .find_identity_by_id(identity_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        let membership = self
            .credentials
            .find_current_membership(identity_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(user_id = %identity_id, "Identity has no organization");
                ServiceError::NoOrganization
            })?;

        let access_token = self.jwt.issue_access_token(
            &identity,
            membership.organization_id,
            &membership.roles(),
        )?;

        let refresh_token = self
            .refresh_tokens
            .rotate(&req.refresh_token, identity_id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = %identity_id, "Refresh token already rotated by a concurrent request");
                ServiceError::InvalidToken
            })?;

        tracing::info!(user_id = %identity_id, "Session refreshed");

        Ok(session_response(
            &identity,
            membership.organization_id,
            access_token,
            refresh_token,
        ))
    }

    /// Always succeeds for unknown tokens.
    #[tracing::instrument(skip_all)]
    pub async fn revoke(&self, refresh_token: &str) -> Result<(), ServiceError> {
        self.refresh_tokens.revoke(refresh_token).await?;
        Ok(())
    }
}

fn session_response(
    identity: &Identity,
    organization_id: Uuid,
    access_token: IssuedAccessToken,
    refresh_token: IssuedRefreshToken,
) -> AuthResponse {
    AuthResponse {
        user_id: identity.identity_id,
        organization_id,
        email: identity.email.clone(),
        first_name: identity.first_name.clone(),
        last_name: identity.last_name.clone(),
        access_token: access_token.token,
        refresh_token: refresh_token.value,
        token_type: "Bearer".to_string(),
        expires_at: access_token.expires_at,
    }
}
