// ABOUTME: Login session lifecycle from initiation through OTP confirmation or federated completion
// ABOUTME: Sessions are bound to a client, redirect URI and CSRF token and end in an authorization code
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use chrono::{Duration, Utc};
use gatekeeper_core::constants::oauth::NONCE_BYTES;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{PkceChallenge, Session, SessionState, SubjectHint};
use tracing::{info, warn};

use super::otp::OtpIssuer;
use crate::crypto;
use crate::federation::ProviderBridge;
use crate::logging::AppLogger;
use crate::oauth2_server::client_registration::ClientRegistry;
use crate::oauth2_server::codes::{AuthorizationCodeEngine, CodeRequest};
use crate::oauth2_server::models::{AuthorizationGrant, ConfirmRequest, LoginRequest, LoginTicket};
use crate::store::RecordStore;
use crate::subjects::SubjectDirectory;

/// Drives login sessions
#[derive(Clone)]
pub struct SessionManager {
    store: RecordStore,
    clients: ClientRegistry,
    otp: OtpIssuer,
    codes: AuthorizationCodeEngine,
    subjects: SubjectDirectory,
    bridge: ProviderBridge,
    session_ttl: Duration,
}

impl SessionManager {
    /// Creates a new session manager
    #[must_use]
    pub const fn new(
        store: RecordStore,
        clients: ClientRegistry,
        otp: OtpIssuer,
        codes: AuthorizationCodeEngine,
        subjects: SubjectDirectory,
        bridge: ProviderBridge,
        session_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clients,
            otp,
            codes,
            subjects,
            bridge,
            session_ttl,
        }
    }

    /// Start a passwordless login and send the OTP code
    ///
    /// # Errors
    ///
    /// Returns invalid-client for an unknown client, invalid-redirect for an
    /// unregistered redirect URI, a validation error for a bad scope, PKCE
    /// parameters or email/phone, and any delivery error from the sender
    pub async fn initiate_login(&self, request: LoginRequest) -> AppResult<LoginTicket> {
        let scope = self
            .clients
            .resolve_binding(
                &request.client_id,
                &request.redirect_uri,
                request.scope.as_deref(),
            )
            .await?;
        let code_challenge = PkceChallenge::parse(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )?;
        let subject = SubjectHint::from_parts(request.email.as_deref(), request.phone.as_deref())?;

        let now = Utc::now();
        let session = Session {
            session_id: crypto::random_token(NONCE_BYTES)?,
            subject: Some(subject),
            state: SessionState::Pending,
            otp_fingerprint: None,
            otp_expires_at: None,
            csrf_token: crypto::random_token(NONCE_BYTES)?,
            client_id: request.client_id,
            redirect_uri: request.redirect_uri,
            scope,
            code_challenge,
            client_state: request.state,
            subject_id: None,
            created_at: now,
            expires_at: now + self.session_ttl,
        };

        if !self.store.put_if_absent(&session).await? {
            return Err(AppError::internal("Session id collided"));
        }
        self.otp.issue_code(&session).await?;

        info!(
            session_id = %session.session_id,
            client_id = %session.client_id,
            "Login session started"
        );
        Ok(LoginTicket {
            session_id: session.session_id,
            csrf_token: session.csrf_token,
        })
    }

    /// Confirm a session with its OTP code and mint an authorization code
    ///
    /// # Errors
    ///
    /// Returns forbidden on a CSRF mismatch (the code attempt is not spent),
    /// session-not-found for a missing or settled session, and invalid-code on
    /// a wrong code, which also ends the session
    pub async fn confirm(
        &self,
        session_id: &str,
        presented_code: &str,
        csrf_token: Option<&str>,
    ) -> AppResult<AuthorizationGrant> {
        let session = self.load_for_confirm(session_id, csrf_token).await?;
        self.finish_confirmation(&session, presented_code).await
    }

    /// [`Self::confirm`] that also checks the client and redirect URI the
    /// caller believes the session belongs to
    ///
    /// # Errors
    ///
    /// As [`Self::confirm`], plus invalid-client or invalid-redirect when the
    /// supplied binding differs from the session's
    pub async fn confirm_request(
        &self,
        request: &ConfirmRequest,
        csrf_token: Option<&str>,
    ) -> AppResult<AuthorizationGrant> {
        let session = self.load_for_confirm(&request.session, csrf_token).await?;

        if let Some(client_id) = request.client_id.as_deref() {
            if client_id != session.client_id {
                warn!(session_id = %session.session_id, "Confirm presented another client_id");
                return Err(AppError::invalid_client("client_id does not match the session"));
            }
        }
        if let Some(redirect_uri) = request.redirect_uri.as_deref() {
            if redirect_uri != session.redirect_uri {
                warn!(session_id = %session.session_id, "Confirm presented another redirect_uri");
                return Err(AppError::invalid_redirect(
                    "redirect_uri does not match the session",
                ));
            }
        }

        self.finish_confirmation(&session, &request.confirmation_code)
            .await
    }

    async fn load_for_confirm(&self, session_id: &str, csrf_token: Option<&str>) -> AppResult<Session> {
        let session = self
            .store
            .get::<Session>(session_id)
            .await?
            .ok_or_else(|| AppError::session_not_found("Session not found"))?;

        let csrf_ok = csrf_token
            .is_some_and(|presented| crypto::constant_time_eq(presented, &session.csrf_token));
        if !csrf_ok {
            AppLogger::log_security_event(
                "csrf_mismatch",
                "confirm request CSRF token did not match the session",
                Some(&session.client_id),
            );
            return Err(AppError::forbidden("CSRF token mismatch"));
        }
        Ok(session)
    }

    async fn finish_confirmation(
        &self,
        session: &Session,
        presented_code: &str,
    ) -> AppResult<AuthorizationGrant> {
        // The grant is written before the OTP swap so the swap is the commit point
        let prepared = if session.accepts_code_at(Utc::now())
            && OtpIssuer::code_matches(session, presented_code)
        {
            Some(self.prepare_grant(session).await?)
        } else {
            None
        };

        let confirmed = match self.otp.verify_code(&session.session_id, presented_code).await {
            Ok(confirmed) => confirmed,
            Err(e) => {
                if let Some(grant) = prepared {
                    self.codes.discard(&grant.authorization_code).await;
                }
                AppLogger::log_auth_event(&session.client_id, "otp_confirm", false, Some(&e.message));
                return Err(e);
            }
        };

        let grant = match prepared {
            Some(grant) => grant,
            None => self.prepare_grant(&confirmed).await?,
        };
        AppLogger::log_auth_event(&confirmed.client_id, "otp_confirm", true, None);
        Ok(grant)
    }

    async fn prepare_grant(&self, session: &Session) -> AppResult<AuthorizationGrant> {
        let hint = session
            .subject
            .as_ref()
            .ok_or_else(|| AppError::internal("OTP session has no subject"))?;
        let subject_id = self.subjects.resolve_hint(hint).await?;
        self.mint_grant(session, &subject_id).await
    }

    /// Finish a federated login that returned from the provider
    ///
    /// # Errors
    ///
    /// Returns invalid-state for an unknown, expired or reused state, and an
    /// external-provider error if the provider exchange fails
    pub async fn complete_external_provider_flow(
        &self,
        provider_code: &str,
        state: &str,
    ) -> AppResult<AuthorizationGrant> {
        let provider_state = self.bridge.consume_state(state).await?;
        let identity = self
            .bridge
            .exchange_provider_code(provider_state.provider, provider_code)
            .await?;
        let subject_id = self.subjects.resolve_federated(&identity).await?;

        let now = Utc::now();
        let session = Session {
            session_id: crypto::fingerprint(&format!(
                "{}:{}:{state}",
                identity.provider, identity.provider_subject
            )),
            subject: None,
            state: SessionState::Confirmed,
            otp_fingerprint: None,
            otp_expires_at: None,
            csrf_token: crypto::random_token(NONCE_BYTES)?,
            client_id: provider_state.client_id,
            redirect_uri: provider_state.redirect_uri,
            scope: provider_state.scope,
            code_challenge: provider_state.code_challenge,
            client_state: provider_state.client_state,
            subject_id: Some(subject_id.clone()),
            created_at: now,
            expires_at: now + self.session_ttl,
        };
        if !self.store.put_if_absent(&session).await? {
            return Err(AppError::invalid_state("Federated login already completed"));
        }

        let grant = self.mint_grant(&session, &subject_id).await?;
        AppLogger::log_auth_event(
            &session.client_id,
            &format!("federated_login_{}", identity.provider),
            true,
            None,
        );
        Ok(grant)
    }

    async fn mint_grant(&self, session: &Session, subject_id: &str) -> AppResult<AuthorizationGrant> {
        let authorization_code = self
            .codes
            .issue(&CodeRequest {
                client_id: &session.client_id,
                redirect_uri: &session.redirect_uri,
                subject_id,
                scope: &session.scope,
                code_challenge: session.code_challenge.as_ref(),
            })
            .await?;

        Ok(AuthorizationGrant {
            authorization_code,
            redirect_uri: session.redirect_uri.clone(),
            state: session.client_state.clone(),
        })
    }
}
