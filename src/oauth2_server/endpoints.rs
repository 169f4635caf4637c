// ABOUTME: Authorization server facade wiring clients, login sessions, codes, tokens and federation
// ABOUTME: Implements the authorize, login, confirm, complete, token, revoke and client operations
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

use std::sync::Arc;

use gatekeeper_core::constants::oauth::{
    GRANT_AUTHORIZATION_CODE, GRANT_REFRESH_TOKEN, OOB_REDIRECT_URI, TOKEN_TYPE_BEARER,
};
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{ExternalProvider, PkceChallenge};
use tracing::{debug, info, warn};
use url::Url;

use super::client_registration::ClientRegistry;
use super::codes::AuthorizationCodeEngine;
use super::models::{
    AccessClaims, AuthorizationGrant, AuthorizeRequest, ClientCredentials, CompleteExternalRequest,
    ConfirmRequest, CreateClientRequest, IssuedTokens, LoginRequest, LoginTicket, RevokeRequest,
    TokenRequest, TokenResponse,
};
use super::tokens::TokenService;
use crate::config::ServerConfig;
use crate::federation::{IdentityProvider, ProviderBridge, ProviderLoginRequest};
use crate::login::{
    CodeGenerator, OtpIssuer, OtpSender, RandomCodeGenerator, SessionManager, TracingOtpSender,
};
use crate::store::{CredentialStore, RecordStore};
use crate::subjects::SubjectDirectory;

/// Client credentials presented through HTTP Basic authentication
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    /// Client identifier
    pub client_id: String,
    /// Client secret
    pub client_secret: String,
}

/// Assembles an [`AuthorizationServer`] with optional overrides for its seams
pub struct AuthorizationServerBuilder {
    config: ServerConfig,
    backend: Arc<dyn CredentialStore>,
    sender: Arc<dyn OtpSender>,
    generator: Arc<dyn CodeGenerator>,
    identity_providers: Vec<Arc<dyn IdentityProvider>>,
}

impl AuthorizationServerBuilder {
    /// Deliver OTP codes through `sender`
    #[must_use]
    pub fn otp_sender(mut self, sender: Arc<dyn OtpSender>) -> Self {
        self.sender = sender;
        self
    }

    /// Generate OTP codes with `generator`
    #[must_use]
    pub fn code_generator(mut self, generator: Arc<dyn CodeGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use `provider` instead of the configured client for its provider
    #[must_use]
    pub fn identity_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity_providers.push(provider);
        self
    }

    /// Wire every service
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a setting is out of range or a
    /// configured provider cannot be set up
    pub fn build(self) -> AppResult<AuthorizationServer> {
        self.config
            .validate()
            .map_err(|e| AppError::config(format!("{e:#}")))?;
        let auth = &self.config.auth;
        let store = RecordStore::new(self.backend, self.config.store_timeout);

        let clients = ClientRegistry::new(store.clone());
        let codes = AuthorizationCodeEngine::new(store.clone(), auth.auth_code_ttl);
        let subjects = SubjectDirectory::new(store.clone());
        let tokens = TokenService::new(store.clone(), clients.clone(), auth);
        let otp = OtpIssuer::new(
            store.clone(),
            self.sender,
            self.generator,
            auth.otp_digits,
            auth.otp_ttl,
        );

        let mut bridge = ProviderBridge::from_config(
            store.clone(),
            clients.clone(),
            &self.config.providers,
            auth.provider_state_ttl,
        )?;
        for provider in self.identity_providers {
            bridge = bridge.with_provider(provider);
        }

        let sessions = SessionManager::new(
            store,
            clients.clone(),
            otp,
            codes.clone(),
            subjects,
            bridge.clone(),
            auth.session_ttl,
        );

        Ok(AuthorizationServer {
            login_page_url: auth.login_page_url.clone(),
            secure_cookies: auth.issuer.starts_with("https://"),
            clients,
            sessions,
            codes,
            tokens,
            bridge,
        })
    }
}

/// OAuth 2.0 authorization server
#[derive(Clone)]
pub struct AuthorizationServer {
    login_page_url: String,
    secure_cookies: bool,
    clients: ClientRegistry,
    sessions: SessionManager,
    codes: AuthorizationCodeEngine,
    tokens: TokenService,
    bridge: ProviderBridge,
}

impl AuthorizationServer {
    /// Start building a server over `backend` with the development OTP sender
    /// and random codes
    #[must_use]
    pub fn builder(config: ServerConfig, backend: Arc<dyn CredentialStore>) -> AuthorizationServerBuilder {
        AuthorizationServerBuilder {
            config,
            backend,
            sender: Arc::new(TracingOtpSender),
            generator: Arc::new(RandomCodeGenerator),
            identity_providers: Vec::new(),
        }
    }

    /// Handle authorization request (GET /oauth2/authorize)
    ///
    /// Returns the URL to redirect the user agent to: the login page for a
    /// direct login or the provider's consent page for a federated one.
    ///
    /// # Errors
    ///
    /// Returns invalid-client, invalid-redirect or a validation error for a
    /// bad request and an external-provider error for an unconfigured provider
    pub async fn authorize(&self, request: AuthorizeRequest) -> AppResult<String> {
        if request.response_type != "code" {
            return Err(AppError::validation(format!(
                "unsupported response_type '{}'",
                request.response_type
            )));
        }
        let code_challenge = PkceChallenge::parse(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;

        if let Some(provider) = request
            .external_provider
            .as_deref()
            .filter(|value| !value.is_empty())
        {
            let provider: ExternalProvider = provider.parse()?;
            let redirect = self
                .bridge
                .build_authorization_url(
                    provider,
                    ProviderLoginRequest {
                        client_id: &request.client_id,
                        redirect_uri: &request.redirect_uri,
                        scope: request.scope.as_deref(),
                        code_challenge,
                        client_state: request.state.as_deref(),
                    },
                )
                .await?;
            return Ok(redirect.url);
        }

        let scope = self
            .clients
            .resolve_binding(
                &request.client_id,
                &request.redirect_uri,
                request.scope.as_deref(),
            )
            .await?;
        self.login_page_redirect(&request, &scope, code_challenge.as_ref())
    }

    /// Login page URL carrying the authorize parameters
    fn login_page_redirect(
        &self,
        request: &AuthorizeRequest,
        scope: &str,
        code_challenge: Option<&PkceChallenge>,
    ) -> AppResult<String> {
        let mut url = Url::parse(&self.login_page_url).map_err(|e| {
            AppError::config(format!("login page URL {} is invalid", self.login_page_url))
                .with_source(e)
        })?;

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &request.client_id)
                .append_pair("redirect_uri", &request.redirect_uri)
                .append_pair("scope", scope);
            if let Some(state) = request.state.as_deref() {
                query.append_pair("state", state);
            }
            if let Some(challenge) = code_challenge {
                query
                    .append_pair("code_challenge", &challenge.challenge)
                    .append_pair("code_challenge_method", challenge.method.as_str());
            }
        }

        debug!(client_id = %request.client_id, "Redirecting to login page");
        Ok(url.to_string())
    }

    /// Start a passwordless login (POST /login)
    ///
    /// # Errors
    ///
    /// See [`SessionManager::initiate_login`]
    pub async fn login(&self, request: LoginRequest) -> AppResult<LoginTicket> {
        self.sessions.initiate_login(request).await
    }

    /// Confirm a login with its OTP code (POST /confirm)
    ///
    /// # Errors
    ///
    /// See [`SessionManager::confirm_request`]
    pub async fn confirm(
        &self,
        request: &ConfirmRequest,
        csrf_token: Option<&str>,
    ) -> AppResult<AuthorizationGrant> {
        self.sessions.confirm_request(request, csrf_token).await
    }

    /// Finish a federated login (GET /oauth2/complete)
    ///
    /// # Errors
    ///
    /// Returns invalid-state for a missing or spent state, and an
    /// external-provider error when the provider reported an error or the
    /// exchange failed
    pub async fn complete_external(
        &self,
        request: CompleteExternalRequest,
    ) -> AppResult<AuthorizationGrant> {
        let state = request
            .state
            .as_deref()
            .filter(|state| !state.is_empty())
            .ok_or_else(|| AppError::invalid_state("Provider callback has no state"))?;

        if let Some(error) = request.error.as_deref() {
            // Spend the state so the round trip cannot be resumed
            let provider_state = self.bridge.consume_state(state).await?;
            warn!(provider = %provider_state.provider, error, "Provider reported an error");
            return Err(AppError::external_provider(
                provider_state.provider,
                format!("provider returned error '{error}'"),
            ));
        }

        let code = request
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AppError::invalid_state("Provider callback has no code"))?;
        self.sessions
            .complete_external_provider_flow(code, state)
            .await
    }

    /// Where to send the user agent with a freshly minted code
    ///
    /// `None` for the out-of-band redirect URI, whose grant is shown instead.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the stored redirect URI no longer parses
    pub fn grant_redirect_url(grant: &AuthorizationGrant) -> AppResult<Option<String>> {
        if grant.redirect_uri == OOB_REDIRECT_URI {
            return Ok(None);
        }
        let mut url = Url::parse(&grant.redirect_uri)
            .map_err(|e| AppError::internal("Stored redirect URI is invalid").with_source(e))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("code", &grant.authorization_code);
            if let Some(state) = grant.state.as_deref() {
                query.append_pair("state", state);
            }
        }
        Ok(Some(url.to_string()))
    }

    /// Handle token request (POST /oauth2/token)
    ///
    /// Client credentials come from HTTP Basic when present, otherwise from
    /// the form.
    ///
    /// # Errors
    ///
    /// Returns invalid-client for missing or wrong client credentials,
    /// invalid-grant for a bad code or refresh token, and
    /// unsupported-grant-type for anything else
    pub async fn token(
        &self,
        request: TokenRequest,
        basic: Option<BasicCredentials>,
    ) -> AppResult<TokenResponse> {
        let (client_id, client_secret) = Self::client_credentials(&request, basic)?;

        let issued = match request.grant_type.as_str() {
            GRANT_AUTHORIZATION_CODE => {
                self.handle_authorization_code_grant(&request, &client_id, &client_secret)
                    .await?
            }
            GRANT_REFRESH_TOKEN => {
                let refresh_token = request
                    .refresh_token
                    .as_deref()
                    .filter(|token| !token.is_empty())
                    .ok_or_else(|| AppError::validation("refresh_token is required"))?;
                self.tokens
                    .refresh(refresh_token, &client_id, &client_secret)
                    .await?
            }
            other => return Err(AppError::unsupported_grant_type(other)),
        };

        Ok(Self::token_response(issued))
    }

    async fn handle_authorization_code_grant(
        &self,
        request: &TokenRequest,
        client_id: &str,
        client_secret: &str,
    ) -> AppResult<IssuedTokens> {
        self.clients.authenticate(client_id, client_secret).await?;

        let code = request
            .code
            .as_deref()
            .filter(|code| !code.is_empty())
            .ok_or_else(|| AppError::validation("code is required"))?;
        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .ok_or_else(|| AppError::validation("redirect_uri is required"))?;

        let exchanged = self
            .codes
            .exchange(code, client_id, redirect_uri, request.code_verifier.as_deref())
            .await?;
        match self
            .tokens
            .issue_tokens(&exchanged.subject_id, client_id, &exchanged.scope)
            .await
        {
            Ok(issued) => Ok(issued),
            Err(e) => {
                self.codes.release(code).await;
                Err(e)
            }
        }
    }

    fn client_credentials(
        request: &TokenRequest,
        basic: Option<BasicCredentials>,
    ) -> AppResult<(String, String)> {
        if let Some(basic) = basic {
            if request
                .client_id
                .as_deref()
                .is_some_and(|form_id| form_id != basic.client_id)
            {
                return Err(AppError::invalid_client(
                    "client_id in the form differs from HTTP Basic credentials",
                ));
            }
            return Ok((basic.client_id, basic.client_secret));
        }

        match (request.client_id.as_deref(), request.client_secret.as_deref()) {
            (Some(id), Some(secret)) if !id.is_empty() => Ok((id.to_owned(), secret.to_owned())),
            _ => Err(AppError::invalid_client("Client authentication is required")),
        }
    }

    fn token_response(issued: IssuedTokens) -> TokenResponse {
        TokenResponse {
            access_token: issued.access_token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in: issued.expires_in,
            scope: issued.scope,
            refresh_token: issued.refresh_token,
        }
    }

    /// Revoke a token (POST /oauth2/revoke); always succeeds for well-formed requests
    ///
    /// # Errors
    ///
    /// Returns only store errors
    pub async fn revoke(&self, request: &RevokeRequest) -> AppResult<()> {
        if let Some(hint) = request.token_type_hint.as_deref() {
            debug!(client_id = %request.client_id, hint, "Revocation requested");
        }
        self.tokens.revoke(&request.client_id, &request.token).await
    }

    /// Register a client (POST /oauth2/clients)
    ///
    /// # Errors
    ///
    /// See [`ClientRegistry::create_client`]
    pub async fn create_client(&self, request: CreateClientRequest) -> AppResult<ClientCredentials> {
        let credentials = self
            .clients
            .create_client(&request.name, &request.redirect_uri, request.scopes)
            .await?;
        info!(client_id = %credentials.client_id, "Client created through the API");
        Ok(credentials)
    }

    /// Delete a client (DELETE /oauth2/clients/{id})
    ///
    /// # Errors
    ///
    /// See [`ClientRegistry::delete_client`]
    pub async fn delete_client(&self, client_id: &str, secret: &str) -> AppResult<()> {
        self.clients.delete_client(client_id, secret).await
    }

    /// Validate an access token
    ///
    /// # Errors
    ///
    /// See [`TokenService::validate_access_token`]
    pub async fn validate_access_token(&self, token: &str) -> AppResult<AccessClaims> {
        self.tokens.validate_access_token(token).await
    }

    /// Whether cookies must carry the `Secure` attribute (HTTPS issuer)
    #[must_use]
    pub const fn secure_cookies(&self) -> bool {
        self.secure_cookies
    }

    /// The client registry
    #[must_use]
    pub const fn clients(&self) -> &ClientRegistry {
        &self.clients
    }
}
