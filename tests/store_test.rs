// ABOUTME: Credential store failure behavior through the authorization server
// ABOUTME: Stalled or failing backends surface as retryable errors that leave no half-written state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{init_test_logging, test_config, FixedCodeGenerator, TEST_OTP, TEST_REDIRECT_URI};
use gatekeeper::errors::{AppError, AppResult, ErrorCode};
use gatekeeper::oauth2_server::models::{
    ClientCredentials, ConfirmRequest, LoginRequest, LoginTicket, TokenRequest, TokenResponse,
};
use gatekeeper::oauth2_server::AuthorizationServer;
use gatekeeper::store::{CredentialStore, InMemoryStore};
use tokio::time::sleep;

/// Backend that stalls every call while `stalled` is set
#[derive(Default)]
struct StallingStore {
    inner: InMemoryStore,
    stalled: AtomicBool,
}

impl StallingStore {
    async fn maybe_stall(&self) {
        if self.stalled.load(Ordering::SeqCst) {
            sleep(Duration::from_secs(5)).await;
        }
    }
}

#[async_trait]
impl CredentialStore for StallingStore {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        self.maybe_stall().await;
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AppResult<()> {
        self.maybe_stall().await;
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool> {
        self.maybe_stall().await;
        self.inner.put_if_absent(key, value, ttl).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool> {
        self.maybe_stall().await;
        self.inner.compare_and_swap(key, expected, value, ttl).await
    }

    async fn remove(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        self.maybe_stall().await;
        self.inner.remove(key).await
    }
}

#[tokio::test]
async fn test_stalled_store_yields_retryable_error() {
    init_test_logging();
    let backend = Arc::new(StallingStore::default());
    let mut config = test_config();
    config.store_timeout = Duration::from_millis(50);

    let server = AuthorizationServer::builder(config, backend.clone())
        .build()
        .unwrap();
    let client = server
        .clients()
        .create_client("Slow", TEST_REDIRECT_URI, vec!["openid".to_owned()])
        .await
        .unwrap();

    backend.stalled.store(true, Ordering::SeqCst);

    let login = server
        .login(LoginRequest {
            email: Some("slow@example.com".to_owned()),
            client_id: client.client_id.clone(),
            redirect_uri: TEST_REDIRECT_URI.to_owned(),
            ..LoginRequest::default()
        })
        .await
        .unwrap_err();
    assert_eq!(login.code, ErrorCode::TransientStore);
    assert!(login.code.is_retryable());

    let token = server
        .token(
            TokenRequest {
                grant_type: "refresh_token".to_owned(),
                refresh_token: Some("anything".to_owned()),
                client_id: Some(client.client_id.clone()),
                client_secret: Some(client.client_secret.clone()),
                ..TokenRequest::default()
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(token.code, ErrorCode::TransientStore);

    backend.stalled.store(false, Ordering::SeqCst);
    assert!(server.clients().get_client(&client.client_id).await.is_ok());
}

#[tokio::test]
async fn test_non_transient_errors_are_not_retryable() {
    for code in [
        ErrorCode::InvalidGrant,
        ErrorCode::InvalidClient,
        ErrorCode::SessionNotFound,
        ErrorCode::ExternalProvider,
    ] {
        assert!(!code.is_retryable(), "{code:?}");
    }
}

/// Backend whose writes fail for chosen operations on chosen key prefixes
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    failing: Mutex<Vec<(&'static str, &'static str)>>,
    created: Mutex<Vec<String>>,
}

impl FlakyStore {
    fn fail(&self, operation: &'static str, prefix: &'static str) {
        self.failing.lock().unwrap().push((operation, prefix));
    }

    fn recover(&self) {
        self.failing.lock().unwrap().clear();
    }

    /// Keys under `prefix` that were created and still exist
    async fn live(&self, prefix: &str) -> usize {
        let created = self.created.lock().unwrap().clone();
        let mut live = 0;
        for key in created.iter().filter(|key| key.starts_with(&format!("{prefix}:"))) {
            if self.inner.get(key).await.unwrap().is_some() {
                live += 1;
            }
        }
        live
    }

    fn check(&self, operation: &str, key: &str) -> AppResult<()> {
        let failing = self.failing.lock().unwrap();
        if failing
            .iter()
            .any(|(op, prefix)| *op == operation && key.starts_with(&format!("{prefix}:")))
        {
            return Err(AppError::transient_store(format!("{operation} failed for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AppResult<()> {
        self.check("put", key)?;
        self.inner.put(key, value, ttl).await
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool> {
        self.check("put_if_absent", key)?;
        let written = self.inner.put_if_absent(key, value, ttl).await?;
        if written {
            self.created.lock().unwrap().push(key.to_owned());
        }
        Ok(written)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool> {
        self.check("compare_and_swap", key)?;
        self.inner.compare_and_swap(key, expected, value, ttl).await
    }

    async fn remove(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        self.inner.remove(key).await
    }
}

struct FlakyFixture {
    backend: Arc<FlakyStore>,
    server: AuthorizationServer,
    client: ClientCredentials,
}

impl FlakyFixture {
    async fn new() -> Self {
        init_test_logging();
        let backend = Arc::new(FlakyStore::default());
        let server = AuthorizationServer::builder(test_config(), backend.clone())
            .code_generator(Arc::new(FixedCodeGenerator(TEST_OTP)))
            .build()
            .unwrap();
        let client = server
            .clients()
            .create_client("Flaky", TEST_REDIRECT_URI, vec!["openid".to_owned()])
            .await
            .unwrap();
        Self {
            backend,
            server,
            client,
        }
    }

    async fn login(&self) -> LoginTicket {
        self.server
            .login(LoginRequest {
                email: Some("flaky@example.com".to_owned()),
                client_id: self.client.client_id.clone(),
                redirect_uri: TEST_REDIRECT_URI.to_owned(),
                ..LoginRequest::default()
            })
            .await
            .unwrap()
    }

    async fn confirm(&self, ticket: &LoginTicket) -> AppResult<String> {
        self.server
            .confirm(
                &ConfirmRequest {
                    confirmation_code: TEST_OTP.to_owned(),
                    session: ticket.session_id.clone(),
                    client_id: None,
                    redirect_uri: None,
                },
                Some(&ticket.csrf_token),
            )
            .await
            .map(|grant| grant.authorization_code)
    }

    async fn exchange(&self, code: &str) -> AppResult<TokenResponse> {
        self.server
            .token(
                TokenRequest {
                    grant_type: "authorization_code".to_owned(),
                    code: Some(code.to_owned()),
                    redirect_uri: Some(TEST_REDIRECT_URI.to_owned()),
                    client_id: Some(self.client.client_id.clone()),
                    client_secret: Some(self.client.client_secret.clone()),
                    ..TokenRequest::default()
                },
                None,
            )
            .await
    }

    async fn refresh(&self, refresh_token: &str) -> AppResult<TokenResponse> {
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

    async fn tokens(&self) -> TokenResponse {
        let ticket = self.login().await;
        let code = self.confirm(&ticket).await.unwrap();
        self.exchange(&code).await.unwrap()
    }
}

#[tokio::test]
async fn test_refresh_retry_succeeds_after_failed_issue() {
    let fixture = FlakyFixture::new().await;
    let tokens = fixture.tokens().await;

    fixture.backend.fail("put_if_absent", "refresh_token");
    let err = fixture.refresh(&tokens.refresh_token).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransientStore);
    assert!(err.code.is_retryable());

    fixture.backend.recover();
    let rotated = fixture.refresh(&tokens.refresh_token).await.unwrap();
    assert_ne!(rotated.refresh_token, tokens.refresh_token);

    let replay = fixture.refresh(&tokens.refresh_token).await.unwrap_err();
    assert_eq!(replay.code, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_refresh_failed_rotation_leaves_no_usable_new_token() {
    let fixture = FlakyFixture::new().await;
    let tokens = fixture.tokens().await;

    fixture.backend.fail("compare_and_swap", "refresh_token");
    let err = fixture.refresh(&tokens.refresh_token).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransientStore);
    assert_eq!(fixture.backend.live("refresh_token").await, 1);

    fixture.backend.recover();
    let rotated = fixture.refresh(&tokens.refresh_token).await.unwrap();
    assert!(fixture.refresh(&rotated.refresh_token).await.is_ok());
}

#[tokio::test]
async fn test_exchange_retry_succeeds_after_failed_issue() {
    let fixture = FlakyFixture::new().await;
    let ticket = fixture.login().await;
    let code = fixture.confirm(&ticket).await.unwrap();

    fixture.backend.fail("put_if_absent", "refresh_token");
    let err = fixture.exchange(&code).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransientStore);

    fixture.backend.recover();
    let tokens = fixture.exchange(&code).await.unwrap();
    assert!(!tokens.access_token.is_empty());

    let replay = fixture.exchange(&code).await.unwrap_err();
    assert_eq!(replay.code, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_confirm_retry_succeeds_after_failed_code_mint() {
    let fixture = FlakyFixture::new().await;
    let ticket = fixture.login().await;

    fixture.backend.fail("put_if_absent", "auth_code");
    let err = fixture.confirm(&ticket).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransientStore);

    fixture.backend.recover();
    let code = fixture.confirm(&ticket).await.unwrap();
    assert!(fixture.exchange(&code).await.is_ok());
}

#[tokio::test]
async fn test_confirm_failed_swap_discards_minted_code() {
    let fixture = FlakyFixture::new().await;
    let ticket = fixture.login().await;

    fixture.backend.fail("compare_and_swap", "session");
    let err = fixture.confirm(&ticket).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::TransientStore);
    assert_eq!(fixture.backend.live("auth_code").await, 0);

    fixture.backend.recover();
    let code = fixture.confirm(&ticket).await.unwrap();
    assert!(fixture.exchange(&code).await.is_ok());
    assert_eq!(fixture.backend.live("auth_code").await, 1);
}
