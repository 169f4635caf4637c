// ABOUTME: OAuth configuration types for external identity provider login
// ABOUTME: Loads Google and Slack client credentials and OpenID endpoints from the environment
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use std::env;
use std::fmt;

use gatekeeper_core::models::ExternalProvider;
use sha2::{Digest, Sha256};
use tracing::{info, warn};

/// Google OpenID Connect endpoints
const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

/// Sign in with Slack (OpenID Connect) endpoints
const SLACK_AUTH_URL: &str = "https://slack.com/openid/connect/authorize";
const SLACK_TOKEN_URL: &str = "https://slack.com/api/openid.connect.token";
const SLACK_USERINFO_URL: &str = "https://slack.com/api/openid.connect.userInfo";

/// Scopes requested from every provider
const DEFAULT_SCOPES: &str = "openid,email,profile";

/// Configured external identity providers; `None` means the provider is disabled
#[derive(Debug, Clone, Default)]
pub struct ProvidersConfig {
    /// Google login
    pub google: Option<ProviderConfig>,
    /// Slack login
    pub slack: Option<ProviderConfig>,
}

impl ProvidersConfig {
    /// Load every provider whose client credentials are present
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            google: ProviderConfig::load(ExternalProvider::Google),
            slack: ProviderConfig::load(ExternalProvider::Slack),
        }
    }

    /// Configuration for one provider
    #[must_use]
    pub const fn get(&self, provider: ExternalProvider) -> Option<&ProviderConfig> {
        match provider {
            ExternalProvider::Google => self.google.as_ref(),
            ExternalProvider::Slack => self.slack.as_ref(),
        }
    }

    /// Log a diagnostic line per provider
    pub fn validate_and_log(&self) {
        for provider in [ExternalProvider::Google, ExternalProvider::Slack] {
            match self.get(provider) {
                Some(config) => config.log_credential_diagnostics(),
                None => info!("External provider {provider} is disabled"),
            }
        }
    }
}

/// Client credentials and endpoints for one OpenID Connect provider
#[derive(Clone)]
pub struct ProviderConfig {
    /// Which provider this is
    pub provider: ExternalProvider,
    /// Our client id at the provider
    pub client_id: String,
    /// Our client secret at the provider
    pub client_secret: String,
    /// Where the provider sends the user back (our `/oauth2/complete`)
    pub redirect_uri: String,
    /// Provider authorization endpoint
    pub authorization_endpoint: String,
    /// Provider token endpoint
    pub token_endpoint: String,
    /// Provider `OpenID` userinfo endpoint
    pub userinfo_endpoint: String,
    /// Requested scopes
    pub scopes: Vec<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("userinfo_endpoint", &self.userinfo_endpoint)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ProviderConfig {
    /// Google defaults for the given credentials
    #[must_use]
    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            provider: ExternalProvider::Google,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorization_endpoint: GOOGLE_AUTH_URL.to_owned(),
            token_endpoint: GOOGLE_TOKEN_URL.to_owned(),
            userinfo_endpoint: GOOGLE_USERINFO_URL.to_owned(),
            scopes: parse_scopes(DEFAULT_SCOPES),
        }
    }

    /// Slack defaults for the given credentials
    #[must_use]
    pub fn slack(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            provider: ExternalProvider::Slack,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            authorization_endpoint: SLACK_AUTH_URL.to_owned(),
            token_endpoint: SLACK_TOKEN_URL.to_owned(),
            userinfo_endpoint: SLACK_USERINFO_URL.to_owned(),
            scopes: parse_scopes(DEFAULT_SCOPES),
        }
    }

    /// Load `<PROVIDER>_CLIENT_ID`, `_CLIENT_SECRET`, `_REDIRECT_URI` and optional
    /// endpoint overrides (`_AUTH_URL`, `_TOKEN_URL`, `_USERINFO_URL`, `_SCOPES`)
    #[must_use]
    pub fn load(provider: ExternalProvider) -> Option<Self> {
        let prefix = provider.as_str().to_uppercase();
        let var = |suffix: &str| {
            env::var(format!("{prefix}_{suffix}"))
                .ok()
                .filter(|value| !value.trim().is_empty())
        };

        let (Some(client_id), Some(client_secret), Some(redirect_uri)) =
            (var("CLIENT_ID"), var("CLIENT_SECRET"), var("REDIRECT_URI"))
        else {
            if var("CLIENT_ID").is_some() {
                warn!("External provider {provider}: CLIENT_SECRET or REDIRECT_URI missing");
            }
            return None;
        };

        let mut config = match provider {
            ExternalProvider::Google => Self::google(client_id, client_secret, redirect_uri),
            ExternalProvider::Slack => Self::slack(client_id, client_secret, redirect_uri),
        };
        if let Some(url) = var("AUTH_URL") {
            config.authorization_endpoint = url;
        }
        if let Some(url) = var("TOKEN_URL") {
            config.token_endpoint = url;
        }
        if let Some(url) = var("USERINFO_URL") {
            config.userinfo_endpoint = url;
        }
        if let Some(scopes) = var("SCOPES") {
            config.scopes = parse_scopes(&scopes);
        }
        Some(config)
    }

    /// First 8 hex chars of the SHA-256 of the client secret, for log correlation
    #[must_use]
    pub fn secret_fingerprint(&self) -> String {
        let digest = Sha256::digest(self.client_secret.as_bytes());
        format!("{digest:x}").chars().take(8).collect()
    }

    /// Log credential diagnostics without the secret itself
    fn log_credential_diagnostics(&self) {
        info!(
            "External provider {}: enabled=true, client_id={}, secret_fingerprint={}",
            self.provider,
            self.client_id,
            self.secret_fingerprint()
        );
    }
}

/// Parse comma- or space-separated scopes
fn parse_scopes(scopes: &str) -> Vec<String> {
    scopes
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}
