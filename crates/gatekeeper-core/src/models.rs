// ABOUTME: Records persisted in the credential store and the typed values they carry
// ABOUTME: Clients, login sessions, authorization codes, provider state, refresh tokens, subject links
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::oauth::{PKCE_METHOD_S256, PKCE_VERIFIER_MAX_LEN, PKCE_VERIFIER_MIN_LEN};
use crate::errors::{AppError, AppResult};

/// Minimum digits in a phone number (E.164 short national numbers)
const PHONE_MIN_DIGITS: usize = 7;
/// Maximum digits in a phone number (E.164)
const PHONE_MAX_DIGITS: usize = 15;

/// The identity a user types on the login page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum SubjectHint {
    /// Lowercased email address
    Email(String),
    /// Phone number, digits only with an optional leading `+`
    Phone(String),
}

impl SubjectHint {
    /// Parse and normalize an email address
    ///
    /// # Errors
    ///
    /// Returns a validation error if the address is not `local@domain.tld`
    pub fn email(raw: &str) -> AppResult<Self> {
        let email = raw.trim().to_lowercase();
        let Some((local, domain)) = email.split_once('@') else {
            return Err(AppError::validation("email must contain '@'"));
        };
        if local.is_empty()
            || domain.is_empty()
            || domain.contains('@')
            || !domain.contains('.')
            || domain.starts_with('.')
            || domain.ends_with('.')
            || email.chars().any(char::is_whitespace)
        {
            return Err(AppError::validation("email address is malformed"));
        }
        Ok(Self::Email(email))
    }

    /// Parse and normalize a phone number
    ///
    /// Spaces, dashes, dots and parentheses are stripped.
    ///
    /// # Errors
    ///
    /// Returns a validation error for non-digit content or an out-of-range length
    pub fn phone(raw: &str) -> AppResult<Self> {
        let trimmed = raw.trim();
        let (plus, rest) = trimmed
            .strip_prefix('+')
            .map_or((false, trimmed), |rest| (true, rest));
        let mut digits = String::with_capacity(rest.len());
        for ch in rest.chars() {
            match ch {
                '0'..='9' => digits.push(ch),
                ' ' | '-' | '.' | '(' | ')' => {}
                _ => return Err(AppError::validation("phone number contains invalid characters")),
            }
        }
        if !(PHONE_MIN_DIGITS..=PHONE_MAX_DIGITS).contains(&digits.len()) {
            return Err(AppError::validation("phone number has an invalid length"));
        }
        Ok(Self::Phone(if plus { format!("+{digits}") } else { digits }))
    }

    /// Build a hint from optional login form fields; exactly one must be present
    ///
    /// # Errors
    ///
    /// Returns a validation error when both or neither are supplied, or when parsing fails
    pub fn from_parts(email: Option<&str>, phone: Option<&str>) -> AppResult<Self> {
        let email = email.filter(|value| !value.trim().is_empty());
        let phone = phone.filter(|value| !value.trim().is_empty());
        match (email, phone) {
            (Some(email), None) => Self::email(email),
            (None, Some(phone)) => Self::phone(phone),
            (Some(_), Some(_)) => Err(AppError::validation(
                "provide either an email or a phone number, not both",
            )),
            (None, None) => Err(AppError::validation("an email or a phone number is required")),
        }
    }

    /// Where the OTP code is delivered
    #[must_use]
    pub fn destination(&self) -> &str {
        match self {
            Self::Email(value) | Self::Phone(value) => value,
        }
    }

    /// Key under which the owning subject is linked
    #[must_use]
    pub fn link_key(&self) -> String {
        match self {
            Self::Email(email) => format!("email:{email}"),
            Self::Phone(phone) => format!("phone:{}", phone.trim_start_matches('+')),
        }
    }
}

/// A registered OAuth client
///
/// Immutable after registration; only deletion changes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Opaque unique identifier
    pub client_id: String,
    /// Argon2id PHC string of the client secret
    pub secret_hash: String,
    /// Display name
    pub name: String,
    /// Exact-match set of allowed redirect URIs
    pub redirect_uris: Vec<String>,
    /// Scopes the client may request
    pub scopes: Vec<String>,
    /// Registration time
    pub created_at: DateTime<Utc>,
}

impl Client {
    /// Exact string comparison against the registered set
    #[must_use]
    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// Resolve a requested scope string against the registered scopes
    ///
    /// An absent or blank request grants every registered scope.
    ///
    /// # Errors
    ///
    /// Returns a validation error if any requested scope is not registered
    pub fn resolve_scope(&self, requested: Option<&str>) -> AppResult<String> {
        let requested = requested.map(str::trim).filter(|scope| !scope.is_empty());
        let Some(requested) = requested else {
            return Ok(self.scopes.join(" "));
        };

        let mut granted: Vec<&str> = Vec::new();
        for scope in requested.split_whitespace() {
            if !self.scopes.iter().any(|registered| registered == scope) {
                return Err(AppError::validation(format!(
                    "scope '{scope}' is not registered for this client"
                )));
            }
            if !granted.contains(&scope) {
                granted.push(scope);
            }
        }
        Ok(granted.join(" "))
    }
}

/// Login session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    /// Waiting for the OTP code
    Pending,
    /// Identity confirmed; an authorization code may be minted
    Confirmed,
    /// Timed out or a failed attempt burned the code
    Expired,
}

/// A login attempt bound to one client, redirect URI and CSRF token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier returned to the login page
    pub session_id: String,
    /// Email or phone for direct logins; `None` for federated sessions
    pub subject: Option<SubjectHint>,
    /// Lifecycle state
    pub state: SessionState,
    /// SHA-256 fingerprint of the outstanding OTP code
    pub otp_fingerprint: Option<String>,
    /// When the outstanding OTP code stops verifying
    pub otp_expires_at: Option<DateTime<Utc>>,
    /// Token the login page echoes back through the `XSRF-TOKEN` cookie
    pub csrf_token: String,
    /// Client that started the flow
    pub client_id: String,
    /// Redirect URI validated at login
    pub redirect_uri: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// PKCE challenge from the authorize request
    pub code_challenge: Option<PkceChallenge>,
    /// OAuth `state` echoed back to the client
    pub client_state: Option<String>,
    /// Internal subject; set once the identity is known
    pub subject_id: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Hard expiry of the whole session
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the session lifetime has elapsed at `now`
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Expired || now >= self.expires_at
    }

    /// Whether an OTP attempt may still be made at `now`
    #[must_use]
    pub fn accepts_code_at(&self, now: DateTime<Utc>) -> bool {
        self.state == SessionState::Pending
            && !self.is_expired_at(now)
            && self.otp_fingerprint.is_some()
            && self.otp_expires_at.is_some_and(|expires| now < expires)
    }
}

/// PKCE transformation (RFC 7636 Section 4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// `BASE64URL(SHA256(verifier))`
    S256,
}

impl CodeChallengeMethod {
    /// Wire name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::S256 => PKCE_METHOD_S256,
        }
    }
}

impl FromStr for CodeChallengeMethod {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            PKCE_METHOD_S256 => Ok(Self::S256),
            "plain" => Err(AppError::validation(
                "code_challenge_method 'plain' is not supported, use 'S256'",
            )),
            other => Err(AppError::validation(format!(
                "unknown code_challenge_method '{other}'"
            ))),
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A PKCE challenge recorded at authorization time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PkceChallenge {
    /// The challenge string sent by the client
    pub challenge: String,
    /// The transformation applied to the verifier
    pub method: CodeChallengeMethod,
}

impl PkceChallenge {
    /// Parse the `code_challenge` and `code_challenge_method` request parameters
    ///
    /// A missing method defaults to `S256`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a method without a challenge, a
    /// malformed challenge, or an unsupported method
    pub fn parse(challenge: Option<&str>, method: Option<&str>) -> AppResult<Option<Self>> {
        let challenge = challenge.filter(|value| !value.is_empty());
        let method = method.filter(|value| !value.is_empty());
        match (challenge, method) {
            (None, None) => Ok(None),
            (None, Some(_)) => Err(AppError::validation(
                "code_challenge_method given without code_challenge",
            )),
            (Some(challenge), method) => {
                let method = method.map_or(Ok(CodeChallengeMethod::S256), str::parse)?;
                if !is_pkce_string(challenge) {
                    return Err(AppError::validation(
                        "code_challenge must be 43-128 unreserved characters",
                    ));
                }
                Ok(Some(Self {
                    challenge: challenge.to_owned(),
                    method,
                }))
            }
        }
    }
}

/// Whether `value` is 43-128 characters of `[A-Za-z0-9-._~]` (RFC 7636 Section 4.1)
#[must_use]
pub fn is_pkce_string(value: &str) -> bool {
    (PKCE_VERIFIER_MIN_LEN..=PKCE_VERIFIER_MAX_LEN).contains(&value.len())
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b'_' | b'~'))
}

/// A single-use authorization code, stored under the fingerprint of its value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// SHA-256 fingerprint of the code handed to the client
    pub code_fingerprint: String,
    /// Client the code was minted for
    pub client_id: String,
    /// Redirect URI the code was minted for
    pub redirect_uri: String,
    /// Internal subject
    pub subject_id: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// PKCE challenge to verify at exchange
    pub code_challenge: Option<PkceChallenge>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Set by the exchange that consumed the code
    pub used: bool,
}

/// External identity providers supported for federated login
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalProvider {
    /// Google (OpenID Connect)
    Google,
    /// Slack (Sign in with Slack, OpenID Connect)
    Slack,
}

impl ExternalProvider {
    /// Lowercase identifier used on the wire and in link keys
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Slack => "slack",
        }
    }
}

impl FromStr for ExternalProvider {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "slack" => Ok(Self::Slack),
            _ => Err(AppError::validation(format!(
                "unsupported external_provider '{s}'"
            ))),
        }
    }
}

impl fmt::Display for ExternalProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Round-trip state for a federated login, keyed by the nonce sent to the provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalProviderState {
    /// Random nonce embedded in the provider URL
    pub state: String,
    /// Provider the user was sent to
    pub provider: ExternalProvider,
    /// Internal client that started the flow
    pub client_id: String,
    /// Internal client's redirect URI
    pub redirect_uri: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// PKCE challenge from the authorize request
    pub code_challenge: Option<PkceChallenge>,
    /// OAuth `state` echoed back to the internal client
    pub client_state: Option<String>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
}

/// A stored refresh token, keyed by the fingerprint of its value
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// SHA-256 fingerprint of the token
    pub token_fingerprint: String,
    /// Internal subject
    pub subject_id: String,
    /// Owning client
    pub client_id: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Expiry
    pub expires_at: DateTime<Utc>,
    /// Set by rotation or revocation
    pub revoked: bool,
}

/// Deny-list entry for a revoked access token; lives until the token would expire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedAccessToken {
    /// JWT id
    pub jti: String,
    /// Client that revoked it
    pub client_id: String,
    /// Revocation time
    pub revoked_at: DateTime<Utc>,
    /// Original token expiry
    pub expires_at: DateTime<Utc>,
}

/// Maps a normalized identity key to an internal subject id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubjectLink {
    /// `email:<addr>`, `phone:<digits>`, or `federated:<provider>:<sub>`
    pub identity_key: String,
    /// Stable internal subject id
    pub subject_id: String,
    /// Link creation time
    pub created_at: DateTime<Utc>,
}

/// Identity asserted by an external provider after a successful code exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedIdentity {
    /// Provider that asserted the identity
    pub provider: ExternalProvider,
    /// Provider's stable subject identifier (`sub` claim)
    pub provider_subject: String,
    /// Email, if the provider returned one
    pub email: Option<String>,
    /// Whether the provider vouches for the email
    pub email_verified: bool,
    /// Display name
    pub name: Option<String>,
}

impl FederatedIdentity {
    /// Key under which the owning subject is linked
    #[must_use]
    pub fn link_key(&self) -> String {
        format!("federated:{}:{}", self.provider, self.provider_subject)
    }
}
