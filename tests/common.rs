// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Provides quiet logging, deterministic OTP codes, a capturing sender and server fixtures
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate,
    clippy::unwrap_used,
    clippy::expect_used
)]
//! Shared test utilities for `gatekeeper`

use std::env;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use gatekeeper::config::{AuthConfig, ServerConfig};
use gatekeeper::errors::{AppError, AppResult};
use gatekeeper::login::{CodeGenerator, OtpSender};
use gatekeeper::models::SubjectHint;
use gatekeeper::oauth2_server::models::{
    AuthorizationGrant, ClientCredentials, ConfirmRequest, LoginRequest, TokenRequest,
    TokenResponse,
};
use gatekeeper::oauth2_server::{AuthorizationServer, AuthorizationServerBuilder};
use gatekeeper::store::{CredentialStore, InMemoryStore};
use tracing::Level;

static INIT_LOGGER: Once = Once::new();

/// Code every fixture server sends
pub const TEST_OTP: &str = "123456";
/// Redirect URI registered for the fixture client
pub const TEST_REDIRECT_URI: &str = "https://app.example.com/callback";
/// Issuer of the fixture configuration
pub const TEST_ISSUER: &str = "http://localhost:8080";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => Level::TRACE,
            Ok("DEBUG") => Level::DEBUG,
            Ok("INFO") => Level::INFO,
            _ => Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Always produces the same code
pub struct FixedCodeGenerator(pub &'static str);

impl CodeGenerator for FixedCodeGenerator {
    fn generate(&self, _digits: u32) -> String {
        self.0.to_owned()
    }
}

/// Records every delivered code
#[derive(Default)]
pub struct CapturingSender {
    sent: Mutex<Vec<(SubjectHint, String)>>,
}

impl CapturingSender {
    /// Codes delivered so far, oldest first
    pub fn deliveries(&self) -> Vec<(SubjectHint, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl OtpSender for CapturingSender {
    async fn send_code(&self, subject: &SubjectHint, code: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((subject.clone(), code.to_owned()));
        Ok(())
    }
}

/// Carrier that rejects every message
pub struct FailingSender;

#[async_trait]
impl OtpSender for FailingSender {
    async fn send_code(&self, _subject: &SubjectHint, _code: &str) -> AppResult<()> {
        Err(AppError::internal("SMS carrier unavailable"))
    }
}

/// Configuration with a fixed signing secret and default lifetimes
pub fn test_config() -> ServerConfig {
    ServerConfig::new(AuthConfig::new(
        TEST_ISSUER,
        "test-signing-secret-0123456789abcdef",
    ))
}

/// An authorization server with one registered client
pub struct TestServer {
    pub server: Arc<AuthorizationServer>,
    pub sender: Arc<CapturingSender>,
    pub store: InMemoryStore,
    pub client: ClientCredentials,
}

impl TestServer {
    /// Login request for the fixture client
    pub fn login_request(&self, email: &str) -> LoginRequest {
        LoginRequest {
            email: Some(email.to_owned()),
            client_id: self.client.client_id.clone(),
            redirect_uri: TEST_REDIRECT_URI.to_owned(),
            state: Some("client-state".to_owned()),
            ..LoginRequest::default()
        }
    }

    /// Log in with the fixed OTP and return the authorization grant
    pub async fn login_and_confirm(&self, request: LoginRequest) -> AuthorizationGrant {
        let ticket = self.server.login(request).await.unwrap();
        self.server
            .confirm(
                &ConfirmRequest {
                    confirmation_code: TEST_OTP.to_owned(),
                    session: ticket.session_id,
                    client_id: None,
                    redirect_uri: None,
                },
                Some(&ticket.csrf_token),
            )
            .await
            .unwrap()
    }
}

impl TestServer {
    /// Exchange a grant for tokens with the fixture client's credentials
    pub async fn exchange(&self, grant: &AuthorizationGrant) -> AppResult<TokenResponse> {
        self.server
            .token(
                TokenRequest {
                    grant_type: "authorization_code".to_owned(),
                    code: Some(grant.authorization_code.clone()),
                    redirect_uri: Some(grant.redirect_uri.clone()),
                    client_id: Some(self.client.client_id.clone()),
                    client_secret: Some(self.client.client_secret.clone()),
                    ..TokenRequest::default()
                },
                None,
            )
            .await
    }

    /// Rotate a refresh token with the fixture client's credentials
    pub async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        self.server
            .token(
                TokenRequest {
                    grant_type: "refresh_token".to_owned(),
                    refresh_token: Some(refresh_token.to_owned()),
                    client_id: Some(self.client.client_id.clone()),
                    client_secret: Some(self.client.client_secret.clone()),
                    ..TokenRequest::default()
                },
                None,
            )
            .await
    }
}

/// Builder over a fresh in-memory store with deterministic OTP codes
pub fn test_builder(
    config: ServerConfig,
) -> (AuthorizationServerBuilder, InMemoryStore, Arc<CapturingSender>) {
    let store = InMemoryStore::new();
    let sender = Arc::new(CapturingSender::default());
    let builder = AuthorizationServer::builder(config, Arc::new(store.clone()))
        .otp_sender(sender.clone())
        .code_generator(Arc::new(FixedCodeGenerator(TEST_OTP)));
    (builder, store, sender)
}

/// Fixture server with a client registered for [`TEST_REDIRECT_URI`]
pub async fn create_test_server() -> TestServer {
    create_test_server_on(test_config(), |store| -> Arc<dyn CredentialStore> { Arc::new(store) }).await
}

/// Fixture server over `config` whose backend wraps a fresh in-memory store
pub async fn create_test_server_on(
    config: ServerConfig,
    backend: impl FnOnce(InMemoryStore) -> Arc<dyn CredentialStore>,
) -> TestServer {
    init_test_logging();
    let store = InMemoryStore::new();
    let sender = Arc::new(CapturingSender::default());
    let server = AuthorizationServer::builder(config, backend(store.clone()))
        .otp_sender(sender.clone())
        .code_generator(Arc::new(FixedCodeGenerator(TEST_OTP)))
        .build()
        .unwrap();
    let client = server
        .clients()
        .create_client(
            "Test App",
            TEST_REDIRECT_URI,
            vec!["openid".to_owned(), "profile".to_owned()],
        )
        .await
        .unwrap();

    TestServer {
        server: Arc::new(server),
        sender,
        store,
        client,
    }
}
