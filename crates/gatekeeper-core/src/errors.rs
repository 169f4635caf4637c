// ABOUTME: Unified error handling with the authorization error taxonomy
// ABOUTME: Maps every failure kind to an HTTP status and an RFC 6749 error code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

//! # Unified Error Handling
//!
//! Every component returns [`AppResult`]. The [`ErrorCode`] carries the failure
//! kind; the HTTP layer turns it into a status and an RFC 6749 Section 5.2
//! error body. Failures on ephemeral state (sessions, OTP codes, provider
//! state) share one public description so callers cannot tell which check
//! rejected them.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Public description shared by all ephemeral-state failures
const GENERIC_VERIFICATION_FAILURE: &str = "The login attempt could not be verified";

/// Failure kinds produced by the authorization core
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Malformed input rejected before any state was touched
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
    /// Unknown client or failed client authentication
    #[serde(rename = "INVALID_CLIENT")]
    InvalidClient,
    /// Redirect URI not registered for the client
    #[serde(rename = "INVALID_REDIRECT")]
    InvalidRedirect,
    /// Login session missing, expired, or already settled
    #[serde(rename = "SESSION_NOT_FOUND")]
    SessionNotFound,
    /// OTP code did not match
    #[serde(rename = "INVALID_CODE")]
    InvalidCode,
    /// External provider state missing, expired, or replayed
    #[serde(rename = "INVALID_STATE")]
    InvalidState,
    /// CSRF token or client secret mismatch
    #[serde(rename = "FORBIDDEN")]
    Forbidden,
    /// Authorization code or refresh token replay, expiry, or binding mismatch
    #[serde(rename = "INVALID_GRANT")]
    InvalidGrant,
    /// Token endpoint called with a grant type the server does not implement
    #[serde(rename = "UNSUPPORTED_GRANT_TYPE")]
    UnsupportedGrantType,
    /// Upstream identity provider failure
    #[serde(rename = "EXTERNAL_PROVIDER_ERROR")]
    ExternalProvider,
    /// Credential store timeout or unavailability
    #[serde(rename = "TRANSIENT_STORE_ERROR")]
    TransientStore,
    /// Requested resource does not exist
    #[serde(rename = "RESOURCE_NOT_FOUND")]
    ResourceNotFound,
    /// Unexpected internal failure
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    /// Missing or invalid configuration
    #[serde(rename = "CONFIG_ERROR")]
    ConfigError,
}

impl ErrorCode {
    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(self) -> u16 {
        match self {
            Self::ValidationError
            | Self::InvalidRedirect
            | Self::SessionNotFound
            | Self::InvalidCode
            | Self::InvalidState
            | Self::InvalidGrant
            | Self::UnsupportedGrantType => 400,
            Self::InvalidClient => 401,
            Self::Forbidden => 403,
            Self::ResourceNotFound => 404,
            Self::ExternalProvider => 502,
            Self::TransientStore => 503,
            Self::InternalError | Self::ConfigError => 500,
        }
    }

    /// RFC 6749 Section 5.2 error code
    #[must_use]
    pub const fn oauth_error(self) -> &'static str {
        match self {
            Self::ValidationError
            | Self::InvalidRedirect
            | Self::SessionNotFound
            | Self::InvalidCode
            | Self::InvalidState => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::Forbidden => "access_denied",
            Self::InvalidGrant => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::ResourceNotFound => "not_found",
            Self::TransientStore | Self::ExternalProvider => "temporarily_unavailable",
            Self::InternalError | Self::ConfigError => "server_error",
        }
    }

    /// Only store unavailability may be retried with the same inputs
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::TransientStore)
    }

    /// Whether the public description must hide which check failed
    #[must_use]
    pub const fn is_opaque(self) -> bool {
        matches!(
            self,
            Self::SessionNotFound | Self::InvalidCode | Self::InvalidState
        )
    }

    /// Human-readable description of the failure kind
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::ValidationError => "The request is malformed",
            Self::InvalidClient => "Client authentication failed",
            Self::InvalidRedirect => "The redirect URI is not registered for this client",
            Self::SessionNotFound => "The login session does not exist or has expired",
            Self::InvalidCode => "The confirmation code is invalid",
            Self::InvalidState => "The provider state is invalid or has expired",
            Self::Forbidden => "The request is not permitted",
            Self::InvalidGrant => "The grant is invalid, expired, or already used",
            Self::UnsupportedGrantType => "The grant type is not supported",
            Self::ExternalProvider => "The identity provider request failed",
            Self::TransientStore => "The credential store is temporarily unavailable",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::InternalError => "An internal server error occurred",
            Self::ConfigError => "Configuration error encountered",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Unified error type for the application
#[derive(Debug, Error)]
pub struct AppError {
    /// Failure kind
    pub code: ErrorCode,
    /// Internal message (logged, not always exposed)
    pub message: String,
    /// Source error for error chaining
    #[source]
    pub source: Option<Box<dyn StdError + Send + Sync>>,
}

impl AppError {
    /// Create a new error with the given code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            source: None,
        }
    }

    /// Attach a source error for error chaining
    #[must_use]
    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// HTTP status code for this error
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        self.code.http_status()
    }

    /// Description safe to return to the caller
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.code.is_opaque() {
            return GENERIC_VERIFICATION_FAILURE.to_owned();
        }
        match self.code {
            ErrorCode::InternalError | ErrorCode::ConfigError | ErrorCode::TransientStore => {
                self.code.description().to_owned()
            }
            _ => self.message.clone(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// RFC 6749 Section 5.2 error body
#[derive(Debug, Serialize, Deserialize)]
pub struct OAuth2ErrorResponse {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl From<&AppError> for OAuth2ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self {
            error: error.code.oauth_error().to_owned(),
            error_description: Some(error.public_message()),
        }
    }
}

/// Convenience constructors for each failure kind
impl AppError {
    /// Malformed input
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Unknown client or failed client authentication
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidClient, message)
    }

    /// Redirect URI not registered for the client
    pub fn invalid_redirect(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRedirect, message)
    }

    /// Session missing or expired
    pub fn session_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SessionNotFound, message)
    }

    /// OTP code mismatch
    pub fn invalid_code(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidCode, message)
    }

    /// Provider state missing or expired
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidState, message)
    }

    /// CSRF or secret mismatch
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Code or token replay, expiry, or binding mismatch
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidGrant, message)
    }

    /// Grant type not implemented
    pub fn unsupported_grant_type(grant_type: &str) -> Self {
        Self::new(
            ErrorCode::UnsupportedGrantType,
            format!("Unsupported grant_type: {grant_type}"),
        )
    }

    /// Upstream identity provider failure
    pub fn external_provider(provider: impl fmt::Display, message: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ExternalProvider,
            format!("{provider}: {}", message.into()),
        )
    }

    /// Store timeout or unavailability
    pub fn transient_store(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransientStore, message)
    }

    /// Resource not found
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Internal server error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        Self::internal(format!("Record serialization failed: {error}")).with_source(error)
    }
}

#[cfg(feature = "http-response")]
mod http_response {
    use super::{AppError, OAuth2ErrorResponse};
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use http::header::WWW_AUTHENTICATE;
    use http::{HeaderValue, StatusCode};

    impl IntoResponse for AppError {
        fn into_response(self) -> Response {
            let status =
                StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                tracing::error!(code = ?self.code, "{}", self.message);
            } else {
                tracing::debug!(code = ?self.code, "{}", self.message);
            }
            let body = OAuth2ErrorResponse::from(&self);
            let mut response = (status, Json(body)).into_response();
            if status == StatusCode::UNAUTHORIZED {
                response.headers_mut().insert(
                    WWW_AUTHENTICATE,
                    HeaderValue::from_static("Basic realm=\"gatekeeper\""),
                );
            }
            response
        }
    }
}
