use service_core::error::AppError;
use thiserror::Error;

use crate::models::UnknownProvider;
use crate::services::oauth_client::UpstreamError;
use crate::services::store::StoreError;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    /// Unknown email, wrong password, or a lockout triggered by this attempt.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is locked. Try again later.")]
    AccountLocked,

    #[error("Invalid token")]
    InvalidToken,

    #[error("User is not associated with any organization")]
    NoOrganization,

    #[error("Token not found")]
    NotFound,

    #[error("No valid token")]
    NoValidToken,

    #[error("Token exchange failed: {0}")]
    ExchangeFailed(UpstreamError),

    #[error("Token type not found: {0}")]
    TokenTypeMissing(String),
}

impl From<UnknownProvider> for ServiceError {
    fn from(err: UnknownProvider) -> Self {
        ServiceError::TokenTypeMissing(err.to_string())
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Store(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("User with this email already exists"))
            }
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid email or password"))
            }
            ServiceError::AccountLocked => {
                AppError::Locked(anyhow::anyhow!("Account is locked. Try again later."))
            }
            ServiceError::InvalidToken => AppError::Unauthorized(anyhow::anyhow!("Invalid token")),
            ServiceError::NoOrganization => AppError::InternalError(anyhow::anyhow!(
                "User is not associated with any organization"
            )),
            ServiceError::NotFound => AppError::NotFound(anyhow::anyhow!("Token not found")),
            ServiceError::NoValidToken => {
                AppError::NotFound(anyhow::anyhow!("No valid token; refresh required"))
            }
            ServiceError::ExchangeFailed(e) => {
                tracing::warn!(error = %e, "Provider token exchange failed");
                AppError::BadGateway("Provider token exchange failed".to_string())
            }
            ServiceError::TokenTypeMissing(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_kinds_stay_distinct_at_boundary() {
        let cases = [
            (ServiceError::EmailAlreadyRegistered, StatusCode::CONFLICT),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (ServiceError::AccountLocked, StatusCode::LOCKED),
            (ServiceError::InvalidToken, StatusCode::UNAUTHORIZED),
            (ServiceError::NoOrganization, StatusCode::INTERNAL_SERVER_ERROR),
            (ServiceError::NotFound, StatusCode::NOT_FOUND),
            (ServiceError::NoValidToken, StatusCode::NOT_FOUND),
            (
                ServiceError::ExchangeFailed(UpstreamError::Malformed("x".to_string())),
                StatusCode::BAD_GATEWAY,
            ),
            (
                ServiceError::TokenTypeMissing("gitlab".to_string()),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status_code(), status);
        }
    }
}
