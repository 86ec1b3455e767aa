mod common;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use common::{context, context_with, test_config, PASSWORD};
use identity_service::build_router;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn json_request(method: Method, uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn register_body(email: &str) -> Value {
    json!({
        "email": email,
        "password": PASSWORD,
        "confirm_password": PASSWORD,
        "first_name": "Ada",
        "last_name": "Lovelace",
        "organization_name": "Analytical Engines"
    })
}

async fn register(app: &Router, email: &str) -> Value {
    let (status, body) = send(
        app,
        json_request(Method::POST, "/api/auth/register", register_body(email), None),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn test_health() {
    let app = build_router(context().state).unwrap();
    let response = app.oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
}

#[tokio::test]
async fn test_register_login_refresh_over_http() {
    let app = build_router(context().state).unwrap();

    let registered = register(&app, "a@x.com").await;
    assert_eq!(registered["token_type"], "Bearer");
    assert_eq!(registered["email"], "a@x.com");

    let (status, session) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/login",
            json!({ "email": "a@x.com", "password": PASSWORD }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(session["organization_id"], registered["organization_id"]);

    let refresh_body = json!({
        "access_token": session["access_token"],
        "refresh_token": session["refresh_token"],
    });
    let (status, rotated) = send(
        &app,
        json_request(Method::POST, "/api/auth/refresh-token", refresh_body.clone(), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], session["refresh_token"]);

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/auth/refresh-token", refresh_body, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_duplicate_register_is_conflict() {
    let app = build_router(context().state).unwrap();
    register(&app, "a@x.com").await;

    let (status, body) = send(
        &app,
        json_request(Method::POST, "/api/auth/register", register_body("a@x.com"), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_register_validation() {
    let app = build_router(context().state).unwrap();
    let mut body = register_body("a@x.com");
    body["confirm_password"] = json!("something-else");

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/auth/register", body, None),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_locked_account_is_423() {
    let app = build_router(context().state).unwrap();
    register(&app, "a@x.com").await;

    for _ in 0..5 {
        let (status, _) = send(
            &app,
            json_request(
                Method::POST,
                "/api/auth/login",
                json!({ "email": "a@x.com", "password": "wrong-password" }),
                None,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, _) = send(
        &app,
        json_request(
            Method::POST,
            "/api/auth/login",
            json!({ "email": "a@x.com", "password": PASSWORD }),
            None,
        ),
    )
    .await;
    assert_eq!(status, StatusCode::LOCKED);
}

#[tokio::test]
async fn test_revoke_requires_bearer_and_is_idempotent() {
    let app = build_router(context().state).unwrap();
    let registered = register(&app, "a@x.com").await;
    let access_token = registered["access_token"].as_str().unwrap();
    let body = json!({ "refresh_token": registered["refresh_token"] });

    let (status, _) = send(
        &app,
        json_request(Method::POST, "/api/auth/revoke", body.clone(), None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    for _ in 0..2 {
        let (status, _) = send(
            &app,
            json_request(Method::POST, "/api/auth/revoke", body.clone(), Some(access_token)),
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}

#[tokio::test]
async fn test_oauth_connect_callback_and_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-at-1",
            "refresh_token": "provider-rt-1",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;

    let app = build_router(context_with(test_config(&server.uri())).state).unwrap();
    let registered = register(&app, "a@x.com").await;
    let access_token = registered["access_token"].as_str().unwrap();

    let (status, connect) = send(&app, get("/api/oauth/azure-devops/connect", Some(access_token))).await;
    assert_eq!(status, StatusCode::OK);
    let url = connect["authorize_url"].as_str().unwrap();
    assert!(url.contains("state=azure-devops"));

    let (status, _) = send(&app, get("/api/oauth/azure-devops/token", Some(access_token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, connection) = send(
        &app,
        get("/api/oauth/callback?code=abc&state=azure-devops", Some(access_token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connection["refresh_token_stored"], true);

    let (status, token) = send(&app, get("/api/oauth/1/token", Some(access_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(token["access_token"], "provider-at-1");
    assert_eq!(token["kind"], "oauth");
}

#[tokio::test]
async fn test_unknown_provider_is_bad_request() {
    let app = build_router(context().state).unwrap();
    let registered = register(&app, "a@x.com").await;
    let access_token = registered["access_token"].as_str().unwrap();

    let (status, _) = send(&app, get("/api/oauth/gitlab/token", Some(access_token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_failure_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"invalid_client\"}"))
        .mount(&server)
        .await;

    let app = build_router(context_with(test_config(&server.uri())).state).unwrap();
    let registered = register(&app, "a@x.com").await;
    let access_token = registered["access_token"].as_str().unwrap();

    let (status, body) = send(
        &app,
        get("/api/oauth/callback?code=abc&state=azure", Some(access_token)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(!body.to_string().contains("invalid_client"));
}

#[tokio::test]
async fn test_personal_access_token_round_trip() {
    let app = build_router(context().state).unwrap();
    let registered = register(&app, "a@x.com").await;
    let access_token = registered["access_token"].as_str().unwrap();

    let (status, _) = send(
        &app,
        json_request(
            Method::PUT,
            "/api/oauth/azure-devops/personal-access-token",
            json!({ "token": "my-pat" }),
            Some(access_token),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, token) = send(&app, get("/api/oauth/azure-devops/token", Some(access_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(token["access_token"], "my-pat");
    assert_eq!(token["kind"], "personal_access_token");
}
