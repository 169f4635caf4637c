// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Loads listener, token lifetime, and signing settings from environment variables
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

//! Environment-based configuration management for production deployment

use std::env;
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use anyhow::{bail, Context, Result};
use chrono::Duration;
use gatekeeper_core::constants::{lifetimes, service_names};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;

use super::oauth::ProvidersConfig;
use crate::crypto;

/// Default listener address
const DEFAULT_HOST: &str = "127.0.0.1";
/// Default HTTP port
const DEFAULT_HTTP_PORT: u16 = 8080;
/// Minimum accepted length of a configured signing secret
const MIN_JWT_SECRET_LEN: usize = 32;

/// Environment type for security and other configurations
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development
    #[default]
    Development,
    /// Production deployment
    Production,
    /// Automated tests
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Top-level server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listener host
    pub host: String,
    /// HTTP API port
    pub http_port: u16,
    /// Deployment environment
    pub environment: Environment,
    /// Token issuance and login settings
    pub auth: AuthConfig,
    /// External identity providers
    pub providers: ProvidersConfig,
    /// Upper bound on a single credential store call
    pub store_timeout: StdDuration,
}

/// Token issuance, login flow, and lifetime settings
#[derive(Clone)]
pub struct AuthConfig {
    /// `iss` claim of access tokens
    pub issuer: String,
    /// HS256 signing secret for access tokens
    pub jwt_secret: String,
    /// Login page that `/oauth2/authorize` redirects direct logins to
    pub login_page_url: String,
    /// Number of digits in OTP codes
    pub otp_digits: u32,
    /// OTP code lifetime
    pub otp_ttl: Duration,
    /// Login session lifetime
    pub session_ttl: Duration,
    /// Authorization code lifetime
    pub auth_code_ttl: Duration,
    /// Access token lifetime
    pub access_token_ttl: Duration,
    /// Refresh token lifetime
    pub refresh_token_ttl: Duration,
    /// External provider state lifetime
    pub provider_state_ttl: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("issuer", &self.issuer)
            .field("jwt_secret", &"[REDACTED]")
            .field("login_page_url", &self.login_page_url)
            .field("otp_digits", &self.otp_digits)
            .field("otp_ttl", &self.otp_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("auth_code_ttl", &self.auth_code_ttl)
            .field("access_token_ttl", &self.access_token_ttl)
            .field("refresh_token_ttl", &self.refresh_token_ttl)
            .field("provider_state_ttl", &self.provider_state_ttl)
            .finish()
    }
}

impl AuthConfig {
    /// Defaults for the given issuer and signing secret
    #[must_use]
    pub fn new(issuer: impl Into<String>, jwt_secret: impl Into<String>) -> Self {
        let issuer = issuer.into();
        Self {
            login_page_url: format!("{}/login", issuer.trim_end_matches('/')),
            issuer,
            jwt_secret: jwt_secret.into(),
            otp_digits: lifetimes::DEFAULT_OTP_DIGITS,
            otp_ttl: Duration::seconds(lifetimes::DEFAULT_OTP_TTL_SECS),
            session_ttl: Duration::seconds(lifetimes::DEFAULT_SESSION_TTL_SECS),
            auth_code_ttl: Duration::seconds(lifetimes::DEFAULT_AUTH_CODE_TTL_SECS),
            access_token_ttl: Duration::seconds(lifetimes::DEFAULT_ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: Duration::days(lifetimes::DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            provider_state_ttl: Duration::seconds(lifetimes::DEFAULT_PROVIDER_STATE_TTL_SECS),
        }
    }
}

impl ServerConfig {
    /// Configuration with defaults and no external providers
    #[must_use]
    pub fn new(auth: AuthConfig) -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            http_port: DEFAULT_HTTP_PORT,
            environment: Environment::Development,
            auth,
            providers: ProvidersConfig::default(),
            store_timeout: StdDuration::from_millis(lifetimes::DEFAULT_STORE_TIMEOUT_MS),
        }
    }

    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric variable does not parse, a lifetime is not
    /// positive, or production runs without `GATEKEEPER_JWT_SECRET`
    pub fn from_env() -> Result<Self> {
        info!("Loading configuration from environment variables");

        let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_owned());
        let http_port = env_parse("HTTP_PORT", DEFAULT_HTTP_PORT)?;
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_owned()),
        );

        let issuer = env::var("GATEKEEPER_ISSUER")
            .unwrap_or_else(|_| format!("http://{host}:{http_port}"));
        let jwt_secret = load_jwt_secret(environment)?;

        let mut auth = AuthConfig::new(issuer, jwt_secret);
        if let Ok(login_page_url) = env::var("LOGIN_PAGE_URL") {
            auth.login_page_url = login_page_url;
        }
        auth.otp_digits = env_parse("OTP_DIGITS", lifetimes::DEFAULT_OTP_DIGITS)?;
        auth.otp_ttl = env_seconds("OTP_TTL_SECS", lifetimes::DEFAULT_OTP_TTL_SECS)?;
        auth.session_ttl = env_seconds("SESSION_TTL_SECS", lifetimes::DEFAULT_SESSION_TTL_SECS)?;
        auth.auth_code_ttl =
            env_seconds("AUTH_CODE_TTL_SECS", lifetimes::DEFAULT_AUTH_CODE_TTL_SECS)?;
        auth.access_token_ttl = env_seconds(
            "ACCESS_TOKEN_TTL_SECS",
            lifetimes::DEFAULT_ACCESS_TOKEN_TTL_SECS,
        )?;
        auth.refresh_token_ttl = Duration::days(env_parse(
            "REFRESH_TOKEN_TTL_DAYS",
            lifetimes::DEFAULT_REFRESH_TOKEN_TTL_DAYS,
        )?);
        auth.provider_state_ttl = env_seconds(
            "PROVIDER_STATE_TTL_SECS",
            lifetimes::DEFAULT_PROVIDER_STATE_TTL_SECS,
        )?;

        let config = Self {
            host,
            http_port,
            environment,
            auth,
            providers: ProvidersConfig::from_env(),
            store_timeout: StdDuration::from_millis(env_parse(
                "STORE_TIMEOUT_MS",
                lifetimes::DEFAULT_STORE_TIMEOUT_MS,
            )?),
        };

        config.validate()?;
        info!("Configuration loaded successfully");
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns an error describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if !(4..=10).contains(&self.auth.otp_digits) {
            bail!("OTP_DIGITS must be between 4 and 10");
        }
        let lifetimes = [
            ("OTP_TTL_SECS", self.auth.otp_ttl),
            ("SESSION_TTL_SECS", self.auth.session_ttl),
            ("AUTH_CODE_TTL_SECS", self.auth.auth_code_ttl),
            ("ACCESS_TOKEN_TTL_SECS", self.auth.access_token_ttl),
            ("REFRESH_TOKEN_TTL_DAYS", self.auth.refresh_token_ttl),
            ("PROVIDER_STATE_TTL_SECS", self.auth.provider_state_ttl),
        ];
        if let Some((name, _)) = lifetimes.iter().find(|(_, ttl)| *ttl <= Duration::zero()) {
            bail!("{name} must be positive");
        }
        if self.auth.otp_ttl > self.auth.session_ttl {
            warn!("OTP_TTL_SECS exceeds SESSION_TTL_SECS; codes will die with their session");
        }
        if self.store_timeout.is_zero() {
            bail!("STORE_TIMEOUT_MS must be positive");
        }
        Url::parse(&self.auth.login_page_url).context("Invalid LOGIN_PAGE_URL")?;
        self.providers.validate_and_log();
        Ok(())
    }

    /// Summary of the configuration for logging (without secrets)
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} configuration:\n\
             - Listener: {}:{}\n\
             - Environment: {}\n\
             - Issuer: {}\n\
             - Login page: {}\n\
             - Google login: {}\n\
             - Slack login: {}",
            service_names::GATEKEEPER,
            self.host,
            self.http_port,
            self.environment,
            self.auth.issuer,
            self.auth.login_page_url,
            if self.providers.google.is_some() {
                "Enabled"
            } else {
                "Disabled"
            },
            if self.providers.slack.is_some() {
                "Enabled"
            } else {
                "Disabled"
            },
        )
    }
}

/// Use the configured secret, or a per-process random one outside production
fn load_jwt_secret(environment: Environment) -> Result<String> {
    match env::var("GATEKEEPER_JWT_SECRET") {
        Ok(secret) if secret.len() >= MIN_JWT_SECRET_LEN => Ok(secret),
        Ok(_) => bail!("GATEKEEPER_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} bytes"),
        Err(_) if environment.is_production() => {
            bail!("GATEKEEPER_JWT_SECRET is required in production")
        }
        Err(_) => {
            warn!("GATEKEEPER_JWT_SECRET not set; access tokens will not survive a restart");
            crypto::random_token(MIN_JWT_SECRET_LEN).context("Failed to generate JWT secret")
        }
    }
}

/// Parse an environment variable, falling back to `default` when unset
fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: StdError + Send + Sync + 'static,
{
    env::var(key).map_or(Ok(default), |value| {
        value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key} value: {value}"))
    })
}

/// Parse a lifetime in seconds
fn env_seconds(key: &str, default: i64) -> Result<Duration> {
    env_parse(key, default).map(Duration::seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parsing() {
        assert_eq!(
            Environment::from_str_or_default("prod"),
            Environment::Production
        );
        assert_eq!(
            Environment::from_str_or_default("TEST"),
            Environment::Testing
        );
        assert_eq!(
            Environment::from_str_or_default("staging"),
            Environment::Development
        );
    }

    #[test]
    fn test_auth_config_defaults() {
        let auth = AuthConfig::new("https://auth.example.com/", "s".repeat(32));
        assert_eq!(auth.login_page_url, "https://auth.example.com/login");
        assert_eq!(auth.otp_digits, 6);
        assert_eq!(auth.auth_code_ttl, Duration::minutes(10));
        assert_eq!(auth.refresh_token_ttl, Duration::days(30));
        assert!(!format!("{auth:?}").contains("ssss"));
    }

    #[test]
    fn test_validate_rejects_non_positive_lifetime() {
        let mut config = ServerConfig::new(AuthConfig::new("http://localhost", "s".repeat(32)));
        assert!(config.validate().is_ok());

        config.auth.auth_code_ttl = Duration::zero();
        let error = config.validate().unwrap_err();
        assert!(error.to_string().contains("AUTH_CODE_TTL_SECS"));
    }
}
