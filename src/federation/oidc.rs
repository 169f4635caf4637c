// ABOUTME: OpenID Connect identity provider client used for Google and Slack login
// ABOUTME: Builds authorization URLs, exchanges codes, and reads the userinfo endpoint
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use std::time::Duration;

use async_trait::async_trait;
use gatekeeper_core::constants::oauth::GRANT_AUTHORIZATION_CODE;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{ExternalProvider, FederatedIdentity};
use reqwest::Response;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use super::IdentityProvider;
use crate::config::ProviderConfig;

/// Upper bound on each provider HTTP call
const PROVIDER_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Token endpoint response; Slack adds `ok` and `error`
#[derive(Debug, Deserialize)]
struct ProviderTokenResponse {
    ok: Option<bool>,
    error: Option<String>,
    access_token: Option<String>,
}

/// `OpenID` userinfo response; Slack adds `ok` and `error`
#[derive(Debug, Deserialize)]
struct UserInfoResponse {
    ok: Option<bool>,
    error: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<EmailVerified>,
    name: Option<String>,
}

/// Some providers send `email_verified` as a string
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum EmailVerified {
    Bool(bool),
    Text(String),
}

impl EmailVerified {
    fn as_bool(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Text(value) => value.eq_ignore_ascii_case("true"),
        }
    }
}

/// Authorization-code client for one `OpenID` Connect provider
pub struct OidcIdentityProvider {
    config: ProviderConfig,
    client: reqwest::Client,
}

impl OidcIdentityProvider {
    /// Create a client for the configured provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if an endpoint is not a valid URL or the
    /// HTTP client cannot be built
    pub fn new(config: ProviderConfig) -> AppResult<Self> {
        for endpoint in [
            &config.authorization_endpoint,
            &config.token_endpoint,
            &config.userinfo_endpoint,
        ] {
            Url::parse(endpoint).map_err(|e| {
                AppError::config(format!("{} endpoint {endpoint} is invalid", config.provider))
                    .with_source(e)
            })?;
        }

        let client = reqwest::Client::builder()
            .timeout(PROVIDER_HTTP_TIMEOUT)
            .build()
            .map_err(|e| AppError::config("Failed to build provider HTTP client").with_source(e))?;

        Ok(Self { config, client })
    }

    fn failure(&self, message: impl Into<String>) -> AppError {
        AppError::external_provider(self.config.provider, message)
    }

    /// Read a JSON body, rejecting non-2xx statuses and malformed payloads
    async fn read_json<T: DeserializeOwned>(&self, response: Response, step: &str) -> AppResult<T> {
        let status = response.status();
        if !status.is_success() {
            error!(
                provider = %self.config.provider,
                status = status.as_u16(),
                "Provider {step} request failed"
            );
            return Err(self.failure(format!("{step} returned HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.failure(format!("{step} response unreadable")).with_source(e))?;
        serde_json::from_str(&body).map_err(|e| {
            error!(provider = %self.config.provider, "Provider {step} response is malformed: {e}");
            self.failure(format!("{step} response is malformed")).with_source(e)
        })
    }

    fn reject_not_ok(&self, ok: Option<bool>, error: Option<&str>, step: &str) -> AppResult<()> {
        if ok == Some(false) {
            let reason = error.unwrap_or("unknown_error");
            error!(provider = %self.config.provider, reason, "Provider {step} reported failure");
            return Err(self.failure(format!("{step} failed: {reason}")));
        }
        Ok(())
    }

    async fn fetch_access_token(&self, code: &str) -> AppResult<String> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code),
            ("grant_type", GRANT_AUTHORIZATION_CODE),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let response = self
            .client
            .post(&self.config.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.failure("token request could not be sent").with_source(e))?;

        let token: ProviderTokenResponse = self.read_json(response, "token").await?;
        self.reject_not_ok(token.ok, token.error.as_deref(), "token")?;
        token
            .access_token
            .filter(|value| !value.is_empty())
            .ok_or_else(|| self.failure("token response has no access_token"))
    }

    async fn fetch_user_info(&self, access_token: &str) -> AppResult<FederatedIdentity> {
        let response = self
            .client
            .get(&self.config.userinfo_endpoint)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| self.failure("userinfo request could not be sent").with_source(e))?;

        let info: UserInfoResponse = self.read_json(response, "userinfo").await?;
        self.reject_not_ok(info.ok, info.error.as_deref(), "userinfo")?;

        let provider_subject = info
            .sub
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| self.failure("userinfo response has no subject"))?;

        Ok(FederatedIdentity {
            provider: self.config.provider,
            provider_subject,
            email: info.email,
            email_verified: info.email_verified.as_ref().is_some_and(EmailVerified::as_bool),
            name: info.name,
        })
    }
}

#[async_trait]
impl IdentityProvider for OidcIdentityProvider {
    fn provider(&self) -> ExternalProvider {
        self.config.provider
    }

    fn authorization_url(&self, state: &str) -> AppResult<String> {
        let mut url = Url::parse(&self.config.authorization_endpoint).map_err(|e| {
            AppError::config(format!("{} authorization endpoint is invalid", self.config.provider))
                .with_source(e)
        })?;

        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scopes.join(" "))
            .append_pair("state", state);

        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> AppResult<FederatedIdentity> {
        let access_token = self.fetch_access_token(code).await?;
        let identity = self.fetch_user_info(&access_token).await?;
        debug!(
            provider = %identity.provider,
            email_verified = identity.email_verified,
            "Provider asserted identity"
        );
        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_url_carries_state() {
        let provider = OidcIdentityProvider::new(ProviderConfig::google(
            "google-client",
            "google-secret",
            "https://auth.example.com/oauth2/complete",
        ))
        .unwrap();

        let url = Url::parse(&provider.authorization_url("nonce-123").unwrap()).unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("state".to_owned(), "nonce-123".to_owned())));
        assert!(pairs.contains(&("client_id".to_owned(), "google-client".to_owned())));
        assert!(pairs.contains(&("scope".to_owned(), "openid email profile".to_owned())));
    }

    #[test]
    fn test_email_verified_accepts_string() {
        let info: UserInfoResponse =
            serde_json::from_str(r#"{"sub":"U1","email_verified":"true"}"#).unwrap();
        assert!(info.email_verified.unwrap().as_bool());
        let info: UserInfoResponse = serde_json::from_str(r#"{"sub":"U1"}"#).unwrap();
        assert!(info.email_verified.is_none());
    }

    #[test]
    fn test_invalid_endpoint_is_config_error() {
        let mut config = ProviderConfig::slack("id", "secret", "https://auth.example.com/cb");
        config.token_endpoint = "not a url".to_owned();
        assert!(OidcIdentityProvider::new(config).is_err());
    }
}
