// ABOUTME: OAuth 2.0 request and response structures for the authorization server surface
// ABOUTME: Login, confirmation, authorize, token, revocation, and client management payloads
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Client registration with any number of redirect URIs
#[derive(Debug, Clone, Deserialize)]
pub struct ClientRegistrationRequest {
    /// Display name
    pub name: String,
    /// Redirect URIs for the authorization code flow
    pub redirect_uris: Vec<String>,
    /// Scopes the client can request
    pub scopes: Vec<String>,
}

/// Body of `POST /oauth2/clients`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClientRequest {
    /// Display name
    pub name: String,
    /// The single redirect URI
    pub redirect_uri: String,
    /// Scopes, as a list or a space-separated string
    #[serde(deserialize_with = "scopes::deserialize")]
    pub scopes: Vec<String>,
}

/// Freshly issued client credentials; the secret is shown only here
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientCredentials {
    /// Unique client identifier
    pub client_id: String,
    /// Client secret for authentication
    pub client_secret: String,
}

/// OAuth 2.0 Authorization Request
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthorizeRequest {
    /// Response type; only `code` is supported
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for response
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// State parameter echoed back to the client
    pub state: Option<String>,
    /// Federated login through `google` or `slack`
    pub external_provider: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method; only `S256`
    pub code_challenge_method: Option<String>,
}

/// Body of `POST /login`
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoginRequest {
    /// Email address (exclusive with `phone`)
    pub email: Option<String>,
    /// Phone number (exclusive with `email`)
    pub phone: Option<String>,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI the code will be delivered to
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE code challenge method
    pub code_challenge_method: Option<String>,
    /// OAuth state echoed back to the client
    pub state: Option<String>,
}

/// Result of a successful login initiation
#[derive(Debug, Clone)]
pub struct LoginTicket {
    /// Session identifier for the confirm step
    pub session_id: String,
    /// CSRF token the confirm step must present
    pub csrf_token: String,
}

/// Response body of `POST /login`; the CSRF token travels in a cookie
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Session identifier
    pub session_id: String,
}

/// Body of `POST /confirm`
#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    /// OTP code the user received
    pub confirmation_code: String,
    /// Session identifier from the login step
    pub session: String,
    /// Client identifier, checked against the session
    pub client_id: Option<String>,
    /// Redirect URI, checked against the session
    pub redirect_uri: Option<String>,
}

/// An authorization code ready to be delivered to the client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationGrant {
    /// The single-use code
    pub authorization_code: String,
    /// Where to deliver it
    pub redirect_uri: String,
    /// OAuth state from the authorize request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Query of `GET /oauth2/complete`
#[derive(Debug, Deserialize)]
pub struct CompleteExternalRequest {
    /// Provider authorization code
    pub code: Option<String>,
    /// State nonce we sent to the provider
    pub state: Option<String>,
    /// Provider-reported error (user denied consent)
    pub error: Option<String>,
}

/// OAuth 2.0 Token Request (form body of `POST /oauth2/token`)
#[derive(Debug, Deserialize, Default, Clone)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    pub grant_type: String,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI (must match the one bound to the code)
    pub redirect_uri: Option<String>,
    /// Client ID (may instead come from HTTP Basic)
    pub client_id: Option<String>,
    /// Client secret (may instead come from HTTP Basic)
    pub client_secret: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// PKCE code verifier (RFC 7636, for `authorization_code` grant)
    pub code_verifier: Option<String>,
}

/// Result of a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangedCode {
    /// Internal subject
    pub subject_id: String,
    /// Granted scopes
    pub scope: String,
}

/// Tokens minted by the token service
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Signed JWT
    pub access_token: String,
    /// Opaque refresh token
    pub refresh_token: String,
    /// Access token expiry
    pub expires_at: DateTime<Utc>,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Granted scopes
    pub scope: String,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Access token (JWT)
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expires in seconds
    pub expires_in: i64,
    /// Scopes granted
    pub scope: String,
    /// Refresh token
    pub refresh_token: String,
}

/// Body of `POST /oauth2/revoke`
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// Client that owns the token
    pub client_id: String,
    /// Access or refresh token
    pub token: String,
    /// Optional RFC 7009 hint; ignored beyond ordering of checks
    pub token_type_hint: Option<String>,
}

/// Claims of an access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessClaims {
    /// Internal subject
    pub sub: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scope: String,
    /// Token id, the deny-list key
    pub jti: String,
    /// Issued at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
}

/// Accept scopes either as a JSON list or as one space-separated string
mod scopes {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scopes {
        List(Vec<String>),
        Joined(String),
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Ok(match Scopes::deserialize(deserializer)? {
            Scopes::List(list) => list,
            Scopes::Joined(joined) => joined.split_whitespace().map(str::to_owned).collect(),
        })
    }
}
