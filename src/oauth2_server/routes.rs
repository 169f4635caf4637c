// ABOUTME: OAuth 2.0 and login HTTP route handlers for the axum web framework
// ABOUTME: Maps login, confirm, authorize, complete, token, revoke and client endpoints onto the server
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

//! ## Endpoints
//!
//! - `POST /login` - Start a passwordless login, sets the `XSRF-TOKEN` cookie
//! - `POST /confirm` - Confirm the OTP code, returns the authorization code
//! - `GET /oauth2/authorize` - Redirect to the login page or an external provider
//! - `GET /oauth2/complete` - Provider callback, redirects to the client with a code
//! - `POST /oauth2/token` - Code exchange and refresh
//! - `POST /oauth2/revoke` - Token revocation
//! - `POST /oauth2/clients` - Client registration
//! - `DELETE /oauth2/clients/:id` - Client deletion
//! - `GET /health` - Liveness

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{CACHE_CONTROL, LOCATION, PRAGMA};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Form, Json, Router};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use axum_extra::headers::authorization::Basic;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use gatekeeper_core::constants::http::{CLIENT_SECRET_HEADER, XSRF_COOKIE};
use gatekeeper_core::errors::AppError;
use serde_json::json;
use tower_http::trace::TraceLayer;

use super::endpoints::{AuthorizationServer, BasicCredentials};
use super::models::{
    AuthorizeRequest, CompleteExternalRequest, ConfirmRequest, CreateClientRequest, LoginRequest,
    LoginResponse, RevokeRequest, TokenRequest,
};

/// HTTP routes of the authorization server
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all routes, traced through `tower-http`
    pub fn routes(server: Arc<AuthorizationServer>) -> Router {
        Router::new()
            .route("/login", post(Self::handle_login))
            .route("/confirm", post(Self::handle_confirm))
            .route("/oauth2/authorize", get(Self::handle_authorize))
            .route("/oauth2/complete", get(Self::handle_complete))
            .route("/oauth2/token", post(Self::handle_token))
            .route("/oauth2/revoke", post(Self::handle_revoke))
            .route("/oauth2/clients", post(Self::handle_create_client))
            .route("/oauth2/clients/:client_id", delete(Self::handle_delete_client))
            .route("/health", get(Self::handle_health))
            .layer(TraceLayer::new_for_http())
            .with_state(server)
    }

    fn found(location: &str) -> Response {
        (StatusCode::FOUND, [(LOCATION, location.to_owned())]).into_response()
    }

    async fn handle_login(
        State(server): State<Arc<AuthorizationServer>>,
        jar: CookieJar,
        Json(request): Json<LoginRequest>,
    ) -> Result<Response, AppError> {
        let ticket = server.login(request).await?;

        let cookie = Cookie::build((XSRF_COOKIE, ticket.csrf_token))
            .path("/")
            .http_only(true)
            .secure(server.secure_cookies())
            .same_site(SameSite::Strict);

        Ok((
            jar.add(cookie),
            Json(LoginResponse {
                session_id: ticket.session_id,
            }),
        )
            .into_response())
    }

    async fn handle_confirm(
        State(server): State<Arc<AuthorizationServer>>,
        jar: CookieJar,
        Json(request): Json<ConfirmRequest>,
    ) -> Result<Response, AppError> {
        let csrf_token = jar.get(XSRF_COOKIE).map(Cookie::value);
        let grant = server.confirm(&request, csrf_token).await?;
        let spent = Cookie::build((XSRF_COOKIE, "")).path("/");
        Ok((jar.remove(spent), Json(grant)).into_response())
    }

    async fn handle_authorize(
        State(server): State<Arc<AuthorizationServer>>,
        Query(request): Query<AuthorizeRequest>,
    ) -> Result<Response, AppError> {
        let location = server.authorize(request).await?;
        Ok(Self::found(&location))
    }

    async fn handle_complete(
        State(server): State<Arc<AuthorizationServer>>,
        Query(request): Query<CompleteExternalRequest>,
    ) -> Result<Response, AppError> {
        let grant = server.complete_external(request).await?;
        match AuthorizationServer::grant_redirect_url(&grant)? {
            Some(location) => Ok(Self::found(&location)),
            None => Ok(Json(grant).into_response()),
        }
    }

    async fn handle_token(
        State(server): State<Arc<AuthorizationServer>>,
        basic: Option<TypedHeader<Authorization<Basic>>>,
        Form(request): Form<TokenRequest>,
    ) -> Result<Response, AppError> {
        let basic = basic.map(|TypedHeader(Authorization(credentials))| BasicCredentials {
            client_id: credentials.username().to_owned(),
            client_secret: credentials.password().to_owned(),
        });
        let response = server.token(request, basic).await?;
        Ok((
            [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")],
            Json(response),
        )
            .into_response())
    }

    async fn handle_revoke(
        State(server): State<Arc<AuthorizationServer>>,
        Form(request): Form<RevokeRequest>,
    ) -> Result<StatusCode, AppError> {
        server.revoke(&request).await?;
        Ok(StatusCode::OK)
    }

    async fn handle_create_client(
        State(server): State<Arc<AuthorizationServer>>,
        Json(request): Json<CreateClientRequest>,
    ) -> Result<Response, AppError> {
        let credentials = server.create_client(request).await?;
        Ok(Json(credentials).into_response())
    }

    async fn handle_delete_client(
        State(server): State<Arc<AuthorizationServer>>,
        Path(client_id): Path<String>,
        headers: HeaderMap,
    ) -> Result<StatusCode, AppError> {
        let secret = headers
            .get(CLIENT_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::forbidden("Client secret header is required"))?;
        server.delete_client(&client_id, secret).await?;
        Ok(StatusCode::OK)
    }

    async fn handle_health() -> Json<serde_json::Value> {
        Json(json!({
            "status": "ok",
            "timestamp": Utc::now().to_rfc3339()
        }))
    }
}
