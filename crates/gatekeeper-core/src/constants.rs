// ABOUTME: Protocol constants, default lifetimes, and credential store key prefixes
// ABOUTME: Shared by the services, the configuration loader, and the HTTP layer
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

/// OAuth 2.0 and PKCE protocol values
pub mod oauth {
    /// Random bytes in an authorization code (base64url encoded on the wire)
    pub const AUTH_CODE_BYTES: usize = 32;
    /// Random bytes in a refresh token
    pub const REFRESH_TOKEN_BYTES: usize = 32;
    /// Random bytes in a client secret
    pub const CLIENT_SECRET_BYTES: usize = 32;
    /// Random bytes in a CSRF token or provider state nonce
    pub const NONCE_BYTES: usize = 32;
    /// Minimum PKCE verifier length (RFC 7636 Section 4.1)
    pub const PKCE_VERIFIER_MIN_LEN: usize = 43;
    /// Maximum PKCE verifier length (RFC 7636 Section 4.1)
    pub const PKCE_VERIFIER_MAX_LEN: usize = 128;
    /// The only accepted PKCE transformation
    pub const PKCE_METHOD_S256: &str = "S256";
    /// Token type returned from the token endpoint
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
    /// Supported `grant_type` values
    pub const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
    /// Refresh grant
    pub const GRANT_REFRESH_TOKEN: &str = "refresh_token";
    /// Audience embedded in access tokens
    pub const ACCESS_TOKEN_AUDIENCE: &str = "gatekeeper";
    /// Out-of-band redirect URI for native apps (RFC 8252)
    pub const OOB_REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";
}

/// Default lifetimes used when the environment does not override them
pub mod lifetimes {
    /// OTP codes are valid for five minutes
    pub const DEFAULT_OTP_TTL_SECS: i64 = 300;
    /// Number of digits in an OTP code
    pub const DEFAULT_OTP_DIGITS: u32 = 6;
    /// A login session lives for fifteen minutes
    pub const DEFAULT_SESSION_TTL_SECS: i64 = 900;
    /// Authorization codes expire after ten minutes
    pub const DEFAULT_AUTH_CODE_TTL_SECS: i64 = 600;
    /// Access tokens are valid for one hour
    pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 3600;
    /// Refresh tokens are valid for thirty days
    pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 30;
    /// External provider state nonces expire after ten minutes
    pub const DEFAULT_PROVIDER_STATE_TTL_SECS: i64 = 600;
    /// Upper bound on a single credential store call
    pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;
}

/// Key prefixes for records in the credential store
pub mod store_keys {
    /// Registered OAuth clients
    pub const CLIENT: &str = "client";
    /// Login sessions
    pub const SESSION: &str = "session";
    /// Authorization codes (keyed by fingerprint)
    pub const AUTH_CODE: &str = "auth_code";
    /// External provider state nonces
    pub const PROVIDER_STATE: &str = "provider_state";
    /// Refresh tokens (keyed by fingerprint)
    pub const REFRESH_TOKEN: &str = "refresh_token";
    /// Revoked access token ids
    pub const REVOKED_ACCESS_TOKEN: &str = "revoked_jti";
    /// Identity to subject links
    pub const SUBJECT_LINK: &str = "subject";
}

/// HTTP surface names
pub mod http {
    /// Cookie carrying the CSRF token bound to a login session
    pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
    /// Header carrying the client secret on client deletion
    pub const CLIENT_SECRET_HEADER: &str = "secret";
}

/// Service identity for logs and token issuer defaults
pub mod service_names {
    /// Service name reported in structured logs
    pub const GATEKEEPER: &str = "gatekeeper";
}
