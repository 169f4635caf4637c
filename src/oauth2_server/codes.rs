// ABOUTME: Single-use authorization codes bound to client, redirect URI, subject and PKCE challenge
// ABOUTME: Exchange marks a code used with one compare-and-swap before verifying PKCE
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

use chrono::{Duration, Utc};
use gatekeeper_core::constants::oauth::AUTH_CODE_BYTES;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{is_pkce_string, AuthorizationCode, CodeChallengeMethod, PkceChallenge};
use tracing::{debug, error, info, warn};

use super::models::ExchangedCode;
use crate::crypto;
use crate::store::RecordStore;

/// Everything a freshly minted code is bound to
#[derive(Debug, Clone)]
pub struct CodeRequest<'a> {
    /// Client the code is minted for
    pub client_id: &'a str,
    /// Redirect URI the code will be delivered to
    pub redirect_uri: &'a str,
    /// Internal subject
    pub subject_id: &'a str,
    /// Space-separated granted scopes
    pub scope: &'a str,
    /// PKCE challenge from the authorize request
    pub code_challenge: Option<&'a PkceChallenge>,
}

/// Issues and exchanges authorization codes
#[derive(Clone)]
pub struct AuthorizationCodeEngine {
    store: RecordStore,
    ttl: Duration,
}

impl AuthorizationCodeEngine {
    /// Creates a new code engine
    #[must_use]
    pub const fn new(store: RecordStore, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Mint a code; only its fingerprint is persisted
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG fails or the store is unavailable
    pub async fn issue(&self, request: &CodeRequest<'_>) -> AppResult<String> {
        let code = crypto::random_token(AUTH_CODE_BYTES)?;
        let now = Utc::now();
        let record = AuthorizationCode {
            code_fingerprint: crypto::fingerprint(&code),
            client_id: request.client_id.to_owned(),
            redirect_uri: request.redirect_uri.to_owned(),
            subject_id: request.subject_id.to_owned(),
            scope: request.scope.to_owned(),
            code_challenge: request.code_challenge.cloned(),
            created_at: now,
            expires_at: now + self.ttl,
            used: false,
        };

        if !self.store.put_if_absent(&record).await? {
            return Err(AppError::internal("Authorization code collided"));
        }
        info!(client_id = %request.client_id, "Issued authorization code");
        Ok(code)
    }

    /// Exchange a code for the subject and scope it was issued for
    ///
    /// A mismatched client or redirect URI leaves the code untouched. Once the
    /// binding checks pass the code is consumed, so a bad PKCE verifier still
    /// burns it.
    ///
    /// # Errors
    ///
    /// Returns invalid-grant for an unknown, expired, used, or mismatched code
    /// and for a failed PKCE verification
    pub async fn exchange(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> AppResult<ExchangedCode> {
        let fingerprint = crypto::fingerprint(code);
        let Some(loaded) = self.store.load::<AuthorizationCode>(&fingerprint).await? else {
            debug!(client_id = %client_id, "Authorization code not found");
            return Err(AppError::invalid_grant("Invalid authorization code"));
        };

        let stored = &loaded.record;
        if stored.used {
            warn!(client_id = %client_id, "Authorization code replay attempt");
            return Err(AppError::invalid_grant("Authorization code already used"));
        }
        if Utc::now() >= stored.expires_at {
            return Err(AppError::invalid_grant("Authorization code expired"));
        }
        if stored.client_id != client_id {
            warn!(client_id = %client_id, "Authorization code presented by another client");
            return Err(AppError::invalid_grant("Client ID mismatch"));
        }
        if stored.redirect_uri != redirect_uri {
            warn!(client_id = %client_id, "Authorization code presented with another redirect_uri");
            return Err(AppError::invalid_grant("Redirect URI mismatch"));
        }

        let mut consumed = stored.clone();
        consumed.used = true;
        if !self.store.compare_and_swap(&loaded, &consumed).await? {
            warn!(client_id = %client_id, "Concurrent exchange already consumed the code");
            return Err(AppError::invalid_grant("Authorization code already used"));
        }

        Self::verify_pkce(consumed.code_challenge.as_ref(), code_verifier, client_id)?;

        info!(client_id = %client_id, "Authorization code exchanged");
        Ok(ExchangedCode {
            subject_id: consumed.subject_id,
            scope: consumed.scope,
        })
    }

    /// Delete a code that was minted but never handed out; failure is only logged
    pub async fn discard(&self, code: &str) {
        let fingerprint = crypto::fingerprint(code);
        if let Err(e) = self.store.remove::<AuthorizationCode>(&fingerprint).await {
            warn!("Failed to discard unused authorization code: {e}");
        }
    }

    /// Return a consumed code to the unused state
    ///
    /// Used when the tokens for an exchanged code could not be issued, so the
    /// client can retry the same exchange. Failure is only logged.
    pub async fn release(&self, code: &str) {
        let fingerprint = crypto::fingerprint(code);
        let restored = match self.store.load::<AuthorizationCode>(&fingerprint).await {
            Ok(Some(loaded)) if loaded.record.used => {
                let mut unused = loaded.record.clone();
                unused.used = false;
                self.store.compare_and_swap(&loaded, &unused).await
            }
            Ok(_) => Ok(false),
            Err(e) => Err(e),
        };
        match restored {
            Ok(true) => debug!("Authorization code released for retry"),
            Ok(false) => {}
            Err(e) => error!("Failed to release authorization code: {e}"),
        }
    }

    fn verify_pkce(
        challenge: Option<&PkceChallenge>,
        code_verifier: Option<&str>,
        client_id: &str,
    ) -> AppResult<()> {
        match (challenge, code_verifier) {
            (None, None) => Ok(()),
            (None, Some(_)) => Err(AppError::invalid_grant(
                "code_verifier provided but no code_challenge was issued",
            )),
            (Some(_), None) => {
                warn!(client_id = %client_id, "Missing code_verifier for PKCE flow");
                Err(AppError::invalid_grant("code_verifier is required"))
            }
            (Some(challenge), Some(verifier)) => {
                if !is_pkce_string(verifier) {
                    return Err(AppError::invalid_grant(
                        "code_verifier must be 43-128 unreserved characters",
                    ));
                }
                let computed = match challenge.method {
                    CodeChallengeMethod::S256 => crypto::pkce_s256_challenge(verifier),
                };
                if crypto::constant_time_eq(&computed, &challenge.challenge) {
                    debug!(client_id = %client_id, "PKCE verification successful");
                    Ok(())
                } else {
                    warn!(client_id = %client_id, "PKCE code_verifier does not match code_challenge");
                    Err(AppError::invalid_grant("Invalid code_verifier"))
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    use gatekeeper_core::errors::ErrorCode;

    use super::*;
    use crate::store::InMemoryStore;

    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    fn engine() -> AuthorizationCodeEngine {
        let store = RecordStore::new(Arc::new(InMemoryStore::new()), StdDuration::from_secs(1));
        AuthorizationCodeEngine::new(store, Duration::minutes(10))
    }

    fn request<'a>(challenge: Option<&'a PkceChallenge>) -> CodeRequest<'a> {
        CodeRequest {
            client_id: "client-a",
            redirect_uri: "https://a.example/cb",
            subject_id: "subject-1",
            scope: "openid",
            code_challenge: challenge,
        }
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let engine = engine();
        let code = engine.issue(&request(None)).await.unwrap();

        let exchanged = engine
            .exchange(&code, "client-a", "https://a.example/cb", None)
            .await
            .unwrap();
        assert_eq!(exchanged.subject_id, "subject-1");

        let replay = engine
            .exchange(&code, "client-a", "https://a.example/cb", None)
            .await
            .unwrap_err();
        assert_eq!(replay.code, ErrorCode::InvalidGrant);
    }

    #[tokio::test]
    async fn test_released_code_can_be_exchanged_again() {
        let engine = engine();
        let code = engine.issue(&request(None)).await.unwrap();

        engine
            .exchange(&code, "client-a", "https://a.example/cb", None)
            .await
            .unwrap();
        engine.release(&code).await;
        assert!(engine
            .exchange(&code, "client-a", "https://a.example/cb", None)
            .await
            .is_ok());

        engine.discard(&code).await;
        engine.release(&code).await;
        let gone = engine
            .exchange(&code, "client-a", "https://a.example/cb", None)
            .await
            .unwrap_err();
        assert_eq!(gone.message, "Invalid authorization code");
    }

    #[tokio::test]
    async fn test_binding_mismatch_does_not_consume() {
        let engine = engine();
        let code = engine.issue(&request(None)).await.unwrap();

        let wrong_redirect = engine
            .exchange(&code, "client-a", "https://a.example/other", None)
            .await
            .unwrap_err();
        assert_eq!(wrong_redirect.code, ErrorCode::InvalidGrant);
        let wrong_client = engine
            .exchange(&code, "client-b", "https://a.example/cb", None)
            .await
            .unwrap_err();
        assert_eq!(wrong_client.code, ErrorCode::InvalidGrant);

        assert!(engine
            .exchange(&code, "client-a", "https://a.example/cb", None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_pkce_verifier_checked_after_consumption() {
        let engine = engine();
        let challenge = PkceChallenge::parse(Some(CHALLENGE), Some("S256"))
            .unwrap()
            .unwrap();

        let code = engine.issue(&request(Some(&challenge))).await.unwrap();
        let wrong = "x".repeat(43);
        assert!(engine
            .exchange(&code, "client-a", "https://a.example/cb", Some(&wrong))
            .await
            .is_err());
        // The failed verifier burned the code
        assert!(engine
            .exchange(&code, "client-a", "https://a.example/cb", Some(VERIFIER))
            .await
            .is_err());

        let code = engine.issue(&request(Some(&challenge))).await.unwrap();
        assert!(engine
            .exchange(&code, "client-a", "https://a.example/cb", Some(VERIFIER))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_verifier_without_challenge_is_rejected() {
        let engine = engine();
        let code = engine.issue(&request(None)).await.unwrap();
        let err = engine
            .exchange(&code, "client-a", "https://a.example/cb", Some(VERIFIER))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidGrant);
    }
}
