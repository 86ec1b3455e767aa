//! Delegated provider access: connect, callback, refresh and lookup.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

use crate::{
    dtos::oauth::{ConnectResponse, OAuthCallbackQuery, PersonalAccessTokenRequest},
    middleware::AuthUser,
    models::Provider,
    services::ServiceError,
    utils::ValidatedJson,
    AppState,
};

fn parse_provider(raw: &str) -> Result<Provider, AppError> {
    raw.parse::<Provider>()
        .map_err(|e| AppError::from(ServiceError::from(e)))
}

/// GET /api/oauth/:provider/connect
///
/// The provider slug travels through the consent screen as `state`.
pub async fn connect(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let authorize_url = state
        .oauth_client
        .authorize_url(state.broker.credentials(), provider.slug());

    Ok(Json(ConnectResponse {
        provider,
        authorize_url,
    }))
}

/// GET /api/oauth/callback?code&state
#[tracing::instrument(skip_all)]
pub async fn callback(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<OAuthCallbackQuery>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(error) = query.error {
        tracing::warn!(
            error = %error,
            description = ?query.error_description,
            "Provider returned an OAuth error"
        );
        return Err(AppError::BadRequest(anyhow::anyhow!(
            "Authorization was not granted: {}",
            error
        )));
    }

    let code = query
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing authorization code")))?;
    let provider = query
        .state
        .ok_or_else(|| AppError::BadRequest(anyhow::anyhow!("Missing state parameter")))?;
    let provider = parse_provider(&provider)?;

    let connection = state
        .broker
        .complete_oauth_callback(user.identity_id()?, provider, &code)
        .await?;

    Ok((StatusCode::OK, Json(connection)))
}

/// POST /api/oauth/:provider/refresh
pub async fn refresh(
    State(state): State<AppState>,
    user: AuthUser,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let connection = state
        .broker
        .refresh_delegated_token(user.identity_id()?, provider)
        .await?;
    Ok((StatusCode::OK, Json(connection)))
}

/// GET /api/oauth/:provider/token
pub async fn token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(provider): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let token = state
        .broker
        .get_provider_token(user.identity_id()?, provider)
        .await?;
    Ok((StatusCode::OK, Json(token)))
}

/// PUT /api/oauth/:provider/personal-access-token
pub async fn store_personal_access_token(
    State(state): State<AppState>,
    user: AuthUser,
    Path(provider): Path<String>,
    ValidatedJson(req): ValidatedJson<PersonalAccessTokenRequest>,
) -> Result<impl IntoResponse, AppError> {
    let provider = parse_provider(&provider)?;
    let stored = state
        .broker
        .store_personal_access_token(user.identity_id()?, provider, &req.token)
        .await?;
    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "provider": stored.provider,
            "expires_at": stored.expires_at,
        })),
    ))
}
