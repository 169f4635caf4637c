// ABOUTME: Access and refresh token issuance, rotation, revocation and validation
// ABOUTME: Access tokens are HS256 JWTs; refresh tokens are opaque and stored by fingerprint
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

use chrono::{DateTime, Duration, Utc};
use gatekeeper_core::constants::oauth::{ACCESS_TOKEN_AUDIENCE, REFRESH_TOKEN_BYTES};
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{RefreshTokenRecord, RevokedAccessToken};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::client_registration::ClientRegistry;
use super::models::{AccessClaims, IssuedTokens};
use crate::config::AuthConfig;
use crate::crypto;
use crate::store::RecordStore;

/// Token lifetimes and signing material
#[derive(Clone)]
struct TokenSettings {
    issuer: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

/// Issues, rotates and revokes tokens
#[derive(Clone)]
pub struct TokenService {
    store: RecordStore,
    clients: ClientRegistry,
    settings: TokenSettings,
}

impl TokenService {
    /// Creates a token service signing with the configured secret
    #[must_use]
    pub fn new(store: RecordStore, clients: ClientRegistry, auth: &AuthConfig) -> Self {
        Self {
            store,
            clients,
            settings: TokenSettings {
                issuer: auth.issuer.clone(),
                encoding_key: EncodingKey::from_secret(auth.jwt_secret.as_bytes()),
                decoding_key: DecodingKey::from_secret(auth.jwt_secret.as_bytes()),
                access_ttl: auth.access_token_ttl,
                refresh_ttl: auth.refresh_token_ttl,
            },
        }
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_audience(&[ACCESS_TOKEN_AUDIENCE]);
        validation.set_issuer(&[self.settings.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "sub", "aud", "iss"]);
        validation
    }

    /// Mint an access token and a stored refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if signing, the RNG, or the store fails
    pub async fn issue_tokens(
        &self,
        subject_id: &str,
        client_id: &str,
        scope: &str,
    ) -> AppResult<IssuedTokens> {
        let now = Utc::now();
        let expires_at = now + self.settings.access_ttl;
        let claims = AccessClaims {
            sub: subject_id.to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: self.settings.issuer.clone(),
            aud: ACCESS_TOKEN_AUDIENCE.to_owned(),
        };
        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.settings.encoding_key,
        )
        .map_err(|e| AppError::internal("Failed to sign access token").with_source(e))?;

        let refresh_token = crypto::random_token(REFRESH_TOKEN_BYTES)?;
        let record = RefreshTokenRecord {
            token_fingerprint: crypto::fingerprint(&refresh_token),
            subject_id: subject_id.to_owned(),
            client_id: client_id.to_owned(),
            scope: scope.to_owned(),
            created_at: now,
            expires_at: now + self.settings.refresh_ttl,
            revoked: false,
        };
        if !self.store.put_if_absent(&record).await? {
            return Err(AppError::internal("Refresh token collided"));
        }

        info!(client_id = %client_id, jti = %claims.jti, "Issued token pair");
        Ok(IssuedTokens {
            access_token,
            refresh_token,
            expires_at,
            expires_in: self.settings.access_ttl.num_seconds(),
            scope: scope.to_owned(),
        })
    }

    /// Rotate a refresh token: the old one is revoked and a new pair issued
    ///
    /// # Errors
    ///
    /// Returns invalid-client if client authentication fails and invalid-grant
    /// if the token is unknown, revoked, expired, or owned by another client
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: &str,
        client_secret: &str,
    ) -> AppResult<IssuedTokens> {
        self.clients.authenticate(client_id, client_secret).await?;

        let fingerprint = crypto::fingerprint(refresh_token);
        let Some(loaded) = self.store.load::<RefreshTokenRecord>(&fingerprint).await? else {
            return Err(AppError::invalid_grant("Invalid refresh token"));
        };

        let current = &loaded.record;
        if current.revoked {
            warn!(client_id = %client_id, "Revoked refresh token presented");
            return Err(AppError::invalid_grant("Refresh token revoked"));
        }
        if Utc::now() >= current.expires_at {
            return Err(AppError::invalid_grant("Refresh token expired"));
        }
        if current.client_id != client_id {
            warn!(client_id = %client_id, "Refresh token presented by another client");
            return Err(AppError::invalid_grant("Refresh token was issued to another client"));
        }

        // The new pair is persisted first so the revoking swap is the commit point
        let issued = self
            .issue_tokens(&current.subject_id, client_id, &current.scope)
            .await?;

        let mut revoked = current.clone();
        revoked.revoked = true;
        let swapped = self.store.compare_and_swap(&loaded, &revoked).await;
        if !matches!(swapped, Ok(true)) {
            self.discard_refresh_token(&issued.refresh_token).await;
        }
        if !swapped? {
            warn!(client_id = %client_id, "Concurrent refresh already rotated the token");
            return Err(AppError::invalid_grant("Refresh token already used"));
        }

        debug!(client_id = %client_id, "Rotated refresh token");
        Ok(issued)
    }

    /// Remove a refresh token that was minted but never handed out
    ///
    /// Failure is only logged; the record expires with its TTL anyway.
    pub async fn discard_refresh_token(&self, refresh_token: &str) {
        let fingerprint = crypto::fingerprint(refresh_token);
        if let Err(e) = self.store.remove::<RefreshTokenRecord>(&fingerprint).await {
            warn!("Failed to discard unused refresh token: {e}");
        }
    }

    /// Revoke an access or refresh token owned by `client_id`
    ///
    /// Unknown, foreign and already revoked tokens are accepted silently.
    ///
    /// # Errors
    ///
    /// Returns only store errors
    pub async fn revoke(&self, client_id: &str, token: &str) -> AppResult<()> {
        if self.revoke_refresh_token(client_id, token).await? {
            return Ok(());
        }
        self.revoke_access_token(client_id, token).await
    }

    /// `true` if `token` is a refresh token known to the store
    async fn revoke_refresh_token(&self, client_id: &str, token: &str) -> AppResult<bool> {
        let fingerprint = crypto::fingerprint(token);
        let Some(loaded) = self.store.load::<RefreshTokenRecord>(&fingerprint).await? else {
            return Ok(false);
        };
        if loaded.record.client_id != client_id {
            warn!(client_id = %client_id, "Ignoring revocation of another client's refresh token");
            return Ok(true);
        }
        if loaded.record.revoked {
            return Ok(true);
        }

        let mut revoked = loaded.record.clone();
        revoked.revoked = true;
        if self.store.compare_and_swap(&loaded, &revoked).await? {
            info!(client_id = %client_id, "Revoked refresh token");
        }
        Ok(true)
    }

    async fn revoke_access_token(&self, client_id: &str, token: &str) -> AppResult<()> {
        let claims = match decode::<AccessClaims>(token, &self.settings.decoding_key, &self.validation())
        {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(client_id = %client_id, "Revocation of unrecognized token ignored: {e}");
                return Ok(());
            }
        };
        if claims.client_id != client_id {
            warn!(client_id = %client_id, "Ignoring revocation of another client's access token");
            return Ok(());
        }

        let expires_at = DateTime::<Utc>::from_timestamp(claims.exp, 0)
            .unwrap_or_else(|| Utc::now() + self.settings.access_ttl);
        self.store
            .put(&RevokedAccessToken {
                jti: claims.jti.clone(),
                client_id: client_id.to_owned(),
                revoked_at: Utc::now(),
                expires_at,
            })
            .await?;
        info!(client_id = %client_id, jti = %claims.jti, "Revoked access token");
        Ok(())
    }

    /// Validate an access token's signature, expiry, audience, issuer and revocation
    ///
    /// # Errors
    ///
    /// Returns invalid-grant for a token that fails any check
    pub async fn validate_access_token(&self, token: &str) -> AppResult<AccessClaims> {
        let claims = decode::<AccessClaims>(token, &self.settings.decoding_key, &self.validation())
            .map_err(|e| {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "Access token expired",
                    ErrorKind::InvalidSignature => "Access token signature is invalid",
                    ErrorKind::InvalidAudience | ErrorKind::InvalidIssuer => {
                        "Access token was not issued for this service"
                    }
                    _ => "Access token is malformed",
                };
                AppError::invalid_grant(reason).with_source(e)
            })?
            .claims;

        if self.store.get::<RevokedAccessToken>(&claims.jti).await?.is_some() {
            return Err(AppError::invalid_grant("Access token revoked"));
        }
        Ok(claims)
    }
}
