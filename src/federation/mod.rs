// ABOUTME: Federated login through external identity providers (Google, Slack)
// ABOUTME: Persists single-use round-trip state and exchanges provider codes for identities
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

//! # External Provider Bridge
//!
//! The authorize endpoint sends the user to a provider with a random `state`
//! nonce. The nonce keys an [`ExternalProviderState`] that remembers which
//! internal client, redirect URI, scope and PKCE challenge started the flow.
//! When the provider redirects back, the state is removed from the store in
//! the same call that reads it, so each nonce completes at most one login.

/// `OpenID` Connect provider client
pub mod oidc;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gatekeeper_core::constants::oauth::NONCE_BYTES;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{
    ExternalProvider, ExternalProviderState, FederatedIdentity, PkceChallenge,
};
use tracing::{info, warn};

pub use oidc::OidcIdentityProvider;

use crate::config::ProvidersConfig;
use crate::crypto;
use crate::oauth2_server::client_registration::ClientRegistry;
use crate::store::RecordStore;

/// An external identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Which provider this is
    fn provider(&self) -> ExternalProvider;

    /// URL that starts the provider's consent flow with `state` embedded
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the provider endpoint is invalid
    fn authorization_url(&self, state: &str) -> AppResult<String>;

    /// Exchange a provider authorization code for the asserted identity
    ///
    /// # Errors
    ///
    /// Returns an external-provider error on transport failure, a non-2xx
    /// status, a provider-reported failure, or a malformed response
    async fn exchange_code(&self, code: &str) -> AppResult<FederatedIdentity>;
}

/// What the internal client asked for when it chose federated login
#[derive(Debug, Clone)]
pub struct ProviderLoginRequest<'a> {
    /// Internal client
    pub client_id: &'a str,
    /// Internal client's redirect URI
    pub redirect_uri: &'a str,
    /// Requested scope; defaults to every registered scope
    pub scope: Option<&'a str>,
    /// PKCE challenge to carry through the round trip
    pub code_challenge: Option<PkceChallenge>,
    /// OAuth `state` to echo back to the internal client
    pub client_state: Option<&'a str>,
}

/// Provider URL plus the nonce embedded in it
#[derive(Debug, Clone)]
pub struct ProviderRedirect {
    /// Where to send the user
    pub url: String,
    /// The single-use state nonce
    pub state: String,
}

/// Routes federated logins to the configured providers
#[derive(Clone)]
pub struct ProviderBridge {
    store: RecordStore,
    clients: ClientRegistry,
    providers: HashMap<ExternalProvider, Arc<dyn IdentityProvider>>,
    state_ttl: Duration,
}

impl ProviderBridge {
    /// Bridge with no providers
    #[must_use]
    pub fn new(store: RecordStore, clients: ClientRegistry, state_ttl: Duration) -> Self {
        Self {
            store,
            clients,
            providers: HashMap::new(),
            state_ttl,
        }
    }

    /// Bridge with an `OpenID` Connect client for every configured provider
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a provider client cannot be built
    pub fn from_config(
        store: RecordStore,
        clients: ClientRegistry,
        providers: &ProvidersConfig,
        state_ttl: Duration,
    ) -> AppResult<Self> {
        let mut bridge = Self::new(store, clients, state_ttl);
        for config in [providers.google.as_ref(), providers.slack.as_ref()]
            .into_iter()
            .flatten()
        {
            bridge = bridge.with_provider(Arc::new(OidcIdentityProvider::new(config.clone())?));
        }
        Ok(bridge)
    }

    /// Register or replace a provider
    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers.insert(provider.provider(), provider);
        self
    }

    fn provider(&self, provider: ExternalProvider) -> AppResult<&Arc<dyn IdentityProvider>> {
        self.providers.get(&provider).ok_or_else(|| {
            warn!(provider = %provider, "Federated login requested for an unconfigured provider");
            AppError::external_provider(provider, "provider is not configured")
        })
    }

    /// Validate the internal client, persist round-trip state, and build the provider URL
    ///
    /// # Errors
    ///
    /// Returns invalid-client or invalid-redirect for a bad binding, an
    /// external-provider error for an unconfigured provider, or a store error
    pub async fn build_authorization_url(
        &self,
        provider: ExternalProvider,
        request: ProviderLoginRequest<'_>,
    ) -> AppResult<ProviderRedirect> {
        let scope = self
            .clients
            .resolve_binding(request.client_id, request.redirect_uri, request.scope)
            .await?;
        let identity_provider = self.provider(provider)?;

        let state = crypto::random_token(NONCE_BYTES)?;
        let now = Utc::now();
        let record = ExternalProviderState {
            state: state.clone(),
            provider,
            client_id: request.client_id.to_owned(),
            redirect_uri: request.redirect_uri.to_owned(),
            scope,
            code_challenge: request.code_challenge,
            client_state: request.client_state.map(str::to_owned),
            created_at: now,
            expires_at: now + self.state_ttl,
        };

        let url = identity_provider.authorization_url(&state)?;
        if !self.store.put_if_absent(&record).await? {
            return Err(AppError::internal("Provider state nonce collided"));
        }

        info!(provider = %provider, client_id = %request.client_id, "Redirecting to external provider");
        Ok(ProviderRedirect { url, state })
    }

    /// Take the round-trip state out of the store
    ///
    /// # Errors
    ///
    /// Returns invalid-state if the nonce is unknown, expired, or already used
    pub async fn consume_state(&self, state: &str) -> AppResult<ExternalProviderState> {
        let record = self
            .store
            .remove::<ExternalProviderState>(state)
            .await?
            .ok_or_else(|| {
                warn!("Unknown or reused provider state");
                AppError::invalid_state("Provider state not found")
            })?;

        if Utc::now() >= record.expires_at {
            return Err(AppError::invalid_state("Provider state expired"));
        }
        Ok(record)
    }

    /// Exchange a provider code for the asserted identity; never retried
    ///
    /// # Errors
    ///
    /// Returns an external-provider error if the provider is unconfigured or the exchange fails
    pub async fn exchange_provider_code(
        &self,
        provider: ExternalProvider,
        provider_code: &str,
    ) -> AppResult<FederatedIdentity> {
        let identity = self.provider(provider)?.exchange_code(provider_code).await?;
        if identity.provider != provider {
            return Err(AppError::external_provider(
                provider,
                "identity asserted by a different provider",
            ));
        }
        Ok(identity)
    }
}
