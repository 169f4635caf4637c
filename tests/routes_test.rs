// ABOUTME: HTTP integration tests for the login and OAuth 2.0 routes
// ABOUTME: Drives the axum router in-process: cookies, redirects, form bodies and error shapes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;
mod helpers;

use axum::Router;
use common::{create_test_server, TestServer, TEST_OTP, TEST_REDIRECT_URI};
use gatekeeper::oauth2_server::OAuth2Routes;
use helpers::axum_test::{AxumTestRequest, AxumTestResponse};
use serde_json::{json, Value};
use url::Url;

fn router(fixture: &TestServer) -> Router {
    OAuth2Routes::routes(fixture.server.clone())
}

/// `name=value` part of a `Set-Cookie` header, ready for a `Cookie` header
fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_owned()
}

async fn http_login(fixture: &TestServer) -> AxumTestResponse {
    AxumTestRequest::post("/login")
        .json(&json!({
            "email": "http@example.com",
            "client_id": fixture.client.client_id,
            "redirect_uri": TEST_REDIRECT_URI,
            "state": "xyz"
        }))
        .send(router(fixture))
        .await
}

/// Log in and confirm over HTTP, returning the authorization code
async fn http_authorization_code(fixture: &TestServer) -> String {
    let login = http_login(fixture).await;
    assert_eq!(login.status(), 200);
    let cookie = cookie_pair(&login.cookie("XSRF-TOKEN").unwrap());
    let session: Value = login.json();

    let confirm = AxumTestRequest::post("/confirm")
        .header("cookie", &cookie)
        .json(&json!({
            "confirmationCode": TEST_OTP,
            "session": session["sessionId"]
        }))
        .send(router(fixture))
        .await;
    assert_eq!(confirm.status(), 200);
    let grant: Value = confirm.json();
    assert_eq!(grant["redirectUri"], TEST_REDIRECT_URI);
    assert_eq!(grant["state"], "xyz");
    grant["authorizationCode"].as_str().unwrap().to_owned()
}

async fn http_tokens(fixture: &TestServer) -> Value {
    let code = http_authorization_code(fixture).await;
    let response = AxumTestRequest::post("/oauth2/token")
        .basic_auth(&fixture.client.client_id, &fixture.client.client_secret)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", TEST_REDIRECT_URI),
        ])
        .send(router(fixture))
        .await;
    assert_eq!(response.status(), 200);
    assert_eq!(response.header("cache-control").as_deref(), Some("no-store"));
    assert_eq!(response.header("pragma").as_deref(), Some("no-cache"));
    response.json()
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = create_test_server().await;
    let response = AxumTestRequest::get("/health").send(router(&fixture)).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json();
    assert_eq!(body["status"], "ok");
    assert!(chrono::DateTime::parse_from_rfc3339(body["timestamp"].as_str().unwrap()).is_ok());
}

#[tokio::test]
async fn test_login_sets_xsrf_cookie() {
    let fixture = create_test_server().await;
    let response = http_login(&fixture).await;
    assert_eq!(response.status(), 200);

    let cookie = response.cookie("XSRF-TOKEN").unwrap();
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("SameSite=Strict"));
    assert!(cookie.contains("Path=/"));
    // Plain-http issuer
    assert!(!cookie.contains("Secure"));

    let body: Value = response.json();
    assert!(body["sessionId"].as_str().is_some_and(|id| !id.is_empty()));
}

#[tokio::test]
async fn test_confirm_without_cookie_is_forbidden() {
    let fixture = create_test_server().await;
    let login = http_login(&fixture).await;
    let session: Value = login.json();

    let response = AxumTestRequest::post("/confirm")
        .json(&json!({
            "confirmationCode": TEST_OTP,
            "session": session["sessionId"]
        }))
        .send(router(&fixture))
        .await;
    assert_eq!(response.status(), 403);
    let body: Value = response.json();
    assert_eq!(body["error"], "access_denied");
}

#[tokio::test]
async fn test_wrong_code_has_opaque_error_body() {
    let fixture = create_test_server().await;
    let login = http_login(&fixture).await;
    let cookie = cookie_pair(&login.cookie("XSRF-TOKEN").unwrap());
    let session: Value = login.json();

    let wrong = AxumTestRequest::post("/confirm")
        .header("cookie", &cookie)
        .json(&json!({"confirmationCode": "000000", "session": session["sessionId"]}))
        .send(router(&fixture))
        .await;
    assert_eq!(wrong.status(), 400);
    let wrong: Value = wrong.json();

    let burned = AxumTestRequest::post("/confirm")
        .header("cookie", &cookie)
        .json(&json!({"confirmationCode": TEST_OTP, "session": session["sessionId"]}))
        .send(router(&fixture))
        .await;
    assert_eq!(burned.status(), 400);
    let burned: Value = burned.json();

    assert_eq!(wrong, burned);
    assert_eq!(wrong["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_redirects_to_login_page() {
    let fixture = create_test_server().await;
    let uri = format!(
        "/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}&state=abc",
        fixture.client.client_id,
        urlencode(TEST_REDIRECT_URI)
    );
    let response = AxumTestRequest::get(&uri).send(router(&fixture)).await;
    assert_eq!(response.status(), 302);

    let location = Url::parse(&response.header("location").unwrap()).unwrap();
    assert_eq!(location.path(), "/login");
    let params: Vec<(String, String)> = location.query_pairs().into_owned().collect();
    assert!(params.contains(&("client_id".to_owned(), fixture.client.client_id.clone())));
    assert!(params.contains(&("state".to_owned(), "abc".to_owned())));
}

#[tokio::test]
async fn test_authorize_rejects_unregistered_redirect() {
    let fixture = create_test_server().await;
    let uri = format!(
        "/oauth2/authorize?response_type=code&client_id={}&redirect_uri={}",
        fixture.client.client_id,
        urlencode("https://evil.example.com/cb")
    );
    let response = AxumTestRequest::get(&uri).send(router(&fixture)).await;
    assert_eq!(response.status(), 400);
    assert!(response.header("location").is_none());
}

#[tokio::test]
async fn test_token_exchange_and_refresh_over_http() {
    let fixture = create_test_server().await;
    let tokens = http_tokens(&fixture).await;
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 3600);

    let refreshed = AxumTestRequest::post("/oauth2/token")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens["refresh_token"].as_str().unwrap()),
            ("client_id", fixture.client.client_id.as_str()),
            ("client_secret", fixture.client.client_secret.as_str()),
        ])
        .send(router(&fixture))
        .await;
    assert_eq!(refreshed.status(), 200);
}

#[tokio::test]
async fn test_token_with_bad_client_is_unauthorized() {
    let fixture = create_test_server().await;
    let response = AxumTestRequest::post("/oauth2/token")
        .basic_auth(&fixture.client.client_id, "wrong")
        .form(&[("grant_type", "refresh_token"), ("refresh_token", "whatever")])
        .send(router(&fixture))
        .await;
    assert_eq!(response.status(), 401);
    assert!(response.header("www-authenticate").is_some());
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_client");
    assert!(body["error_description"].is_string());
}

#[tokio::test]
async fn test_revoke_returns_ok_even_for_unknown_tokens() {
    let fixture = create_test_server().await;
    let tokens = http_tokens(&fixture).await;

    for token in [tokens["refresh_token"].as_str().unwrap(), "unknown-token"] {
        let response = AxumTestRequest::post("/oauth2/revoke")
            .form(&[
                ("client_id", fixture.client.client_id.as_str()),
                ("token", token),
            ])
            .send(router(&fixture))
            .await;
        assert_eq!(response.status(), 200);
    }

    let reuse = AxumTestRequest::post("/oauth2/token")
        .basic_auth(&fixture.client.client_id, &fixture.client.client_secret)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", tokens["refresh_token"].as_str().unwrap()),
        ])
        .send(router(&fixture))
        .await;
    assert_eq!(reuse.status(), 400);
    let body: Value = reuse.json();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_create_and_delete_client() {
    let fixture = create_test_server().await;
    let created = AxumTestRequest::post("/oauth2/clients")
        .json(&json!({
            "name": "Route App",
            "redirectUri": "https://route.example.com/cb",
            "scopes": "openid email"
        }))
        .send(router(&fixture))
        .await;
    assert_eq!(created.status(), 200);
    let credentials: Value = created.json();
    let client_id = credentials["clientId"].as_str().unwrap().to_owned();
    let secret = credentials["clientSecret"].as_str().unwrap().to_owned();
    let path = format!("/oauth2/clients/{client_id}");

    let missing_secret = AxumTestRequest::delete(&path).send(router(&fixture)).await;
    assert_eq!(missing_secret.status(), 403);

    let deleted = AxumTestRequest::delete(&path)
        .header("secret", &secret)
        .send(router(&fixture))
        .await;
    assert_eq!(deleted.status(), 200);

    let again = AxumTestRequest::delete(&path)
        .header("secret", &secret)
        .send(router(&fixture))
        .await;
    assert_eq!(again.status(), 404);
}

#[tokio::test]
async fn test_create_client_rejects_bad_redirect() {
    let fixture = create_test_server().await;
    let response = AxumTestRequest::post("/oauth2/clients")
        .json(&json!({"name": "Bad", "redirectUri": "nope", "scopes": ["openid"]}))
        .send(router(&fixture))
        .await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

fn urlencode(value: &str) -> String {
    serde_urlencoded::to_string([("v", value)])
        .unwrap()
        .trim_start_matches("v=")
        .to_owned()
}
