use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{LoginRequest, RefreshRequest, RegisterRequest, RevokeRequest},
    middleware::AuthUser,
    utils::ValidatedJson,
    AppState,
};

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.register(req).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.login(req).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// POST /api/auth/refresh-token
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<impl IntoResponse, AppError> {
    let res = state.auth_service.refresh(req).await?;
    Ok((StatusCode::OK, Json(res)))
}

/// POST /api/auth/revoke
pub async fn revoke(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(req): ValidatedJson<RevokeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.auth_service.revoke(&req.refresh_token).await?;
    tracing::info!(user_id = %user.0.sub, "Refresh token revoked");
    Ok(StatusCode::NO_CONTENT)
}
