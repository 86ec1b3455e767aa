mod common;

use chrono::{Duration, Utc};
use common::{context_with, register_request, test_config};
use identity_service::models::{Provider, TokenKind};
use identity_service::services::{ServiceError, TokenStore, UpstreamError};
use serde_json::json;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN_PATH: &str = "/tenant-1/oauth2/v2.0/token";
const PROVIDER: Provider = Provider::AzureDevOps;

async fn mock_code_exchange(server: &MockServer, access: &str, refresh: Option<&str>) {
    let mut body = json!({
        "access_token": access,
        "expires_in": 3600,
        "token_type": "Bearer"
    });
    if let Some(refresh) = refresh {
        body["refresh_token"] = json!(refresh);
    }

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_callback_then_get_provider_token_returns_exchanged_token() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "provider-at-1", Some("provider-rt-1")).await;

    let ctx = context_with(test_config(&server.uri()));
    let user = ctx
        .state
        .auth_service
        .register(register_request("a@x.com"))
        .await
        .unwrap();

    ctx.state
        .broker
        .complete_oauth_callback(user.user_id, PROVIDER, "auth-code")
        .await
        .unwrap();

    let token = ctx
        .state
        .broker
        .get_provider_token(user.user_id, PROVIDER)
        .await
        .unwrap();
    assert_eq!(token.access_token, "provider-at-1");
    assert!(token.expires_at <= Utc::now() + Duration::seconds(3600));
}

#[tokio::test]
async fn test_expired_provider_token_requires_refresh() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "provider-at-1", Some("provider-rt-1")).await;

    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=provider-rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-at-2",
            "refresh_token": "provider-rt-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let ctx = context_with(test_config(&server.uri()));
    let user = ctx
        .state
        .auth_service
        .register(register_request("a@x.com"))
        .await
        .unwrap();
    let broker = &ctx.state.broker;

    broker
        .complete_oauth_callback(user.user_id, PROVIDER, "auth-code")
        .await
        .unwrap();

    // Let the provider access token lapse.
    let mut access = ctx
        .store
        .find_token_for_identity(user.user_id, TokenKind::ProviderAccess(PROVIDER))
        .await
        .unwrap()
        .unwrap();
    access.expires_utc = Utc::now() - Duration::seconds(1);
    ctx.store.upsert_token(&access).await.unwrap();

    let err = broker
        .get_provider_token(user.user_id, PROVIDER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NoValidToken));

    broker
        .refresh_delegated_token(user.user_id, PROVIDER)
        .await
        .unwrap();

    let token = broker.get_provider_token(user.user_id, PROVIDER).await.unwrap();
    assert_eq!(token.access_token, "provider-at-2");

    let refresh = ctx
        .store
        .find_token_for_identity(user.user_id, TokenKind::ProviderRefresh(PROVIDER))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(refresh.token_value, "provider-rt-2");
}

#[tokio::test]
async fn test_upstream_rejection_is_exchange_failed_and_stores_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS70008: The provided authorization code has expired."
        })))
        .mount(&server)
        .await;

    let ctx = context_with(test_config(&server.uri()));
    let user = ctx
        .state
        .auth_service
        .register(register_request("a@x.com"))
        .await
        .unwrap();

    let err = ctx
        .state
        .broker
        .complete_oauth_callback(user.user_id, PROVIDER, "stale-code")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::ExchangeFailed(UpstreamError::Status { .. })
    ));

    let err = ctx
        .state
        .broker
        .get_provider_token(user.user_id, PROVIDER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound));
}

#[tokio::test]
async fn test_refresh_upstream_failure_keeps_stored_credentials() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "provider-at-1", Some("provider-rt-1")).await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let ctx = context_with(test_config(&server.uri()));
    let user = ctx
        .state
        .auth_service
        .register(register_request("a@x.com"))
        .await
        .unwrap();
    let broker = &ctx.state.broker;

    broker
        .complete_oauth_callback(user.user_id, PROVIDER, "auth-code")
        .await
        .unwrap();

    let err = broker
        .refresh_delegated_token(user.user_id, PROVIDER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ExchangeFailed(_)));

    let token = broker.get_provider_token(user.user_id, PROVIDER).await.unwrap();
    assert_eq!(token.access_token, "provider-at-1");
}

#[tokio::test]
async fn test_refresh_without_provider_refresh_token_is_not_found() {
    let server = MockServer::start().await;
    mock_code_exchange(&server, "provider-at-1", None).await;

    let ctx = context_with(test_config(&server.uri()));
    let user = ctx
        .state
        .auth_service
        .register(register_request("a@x.com"))
        .await
        .unwrap();

    ctx.state
        .broker
        .complete_oauth_callback(user.user_id, PROVIDER, "auth-code")
        .await
        .unwrap();

    let err = ctx
        .state
        .broker
        .refresh_delegated_token(user.user_id, PROVIDER)
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound));
}
