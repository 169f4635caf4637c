// ABOUTME: One-time login codes bound to a session and delivered out of band
// ABOUTME: Codes are stored as fingerprints and burned by the first verification attempt
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{Session, SessionState, SubjectHint};
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{error, info, warn};

use crate::crypto;
use crate::store::RecordStore;

/// Delivers OTP codes over email or SMS
#[async_trait]
pub trait OtpSender: Send + Sync {
    /// Send `code` to the destination named by `subject`
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be handed to the carrier
    async fn send_code(&self, subject: &SubjectHint, code: &str) -> AppResult<()>;
}

/// Widest code whose range still fits in a `u64`
const MAX_OTP_DIGITS: u32 = 19;

/// Produces OTP codes
pub trait CodeGenerator: Send + Sync {
    /// A code of exactly `digits` decimal digits
    fn generate(&self, digits: u32) -> String;
}

/// Uniform codes from the operating system CSPRNG
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, digits: u32) -> String {
        let digits = digits.clamp(1, MAX_OTP_DIGITS);
        let code = OsRng.gen_range(0..10_u64.pow(digits));
        format!("{code:0width$}", width = digits as usize)
    }
}

/// Development sender that records the delivery in the log without the code
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingOtpSender;

#[async_trait]
impl OtpSender for TracingOtpSender {
    async fn send_code(&self, subject: &SubjectHint, _code: &str) -> AppResult<()> {
        let channel = match subject {
            SubjectHint::Email(_) => "email",
            SubjectHint::Phone(_) => "sms",
        };
        info!(
            channel,
            destination = %mask_destination(subject),
            "OTP code dispatched"
        );
        Ok(())
    }
}

/// `al***@example.com` or `***2030`
#[must_use]
pub fn mask_destination(subject: &SubjectHint) -> String {
    match subject {
        SubjectHint::Email(email) => email.split_once('@').map_or_else(
            || "***".to_owned(),
            |(local, domain)| {
                let visible: String = local.chars().take(2).collect();
                format!("{visible}***@{domain}")
            },
        ),
        SubjectHint::Phone(phone) => {
            let digits: Vec<char> = phone.chars().collect();
            let tail: String = digits[digits.len().saturating_sub(4)..].iter().collect();
            format!("***{tail}")
        }
    }
}

/// Issues and verifies OTP codes on login sessions
#[derive(Clone)]
pub struct OtpIssuer {
    store: RecordStore,
    sender: Arc<dyn OtpSender>,
    generator: Arc<dyn CodeGenerator>,
    digits: u32,
    ttl: Duration,
}

impl OtpIssuer {
    /// Creates a new OTP issuer
    #[must_use]
    pub fn new(
        store: RecordStore,
        sender: Arc<dyn OtpSender>,
        generator: Arc<dyn CodeGenerator>,
        digits: u32,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            sender,
            generator,
            digits,
            ttl,
        }
    }

    /// Attach a fresh code to a pending session, persist it, and send the code
    ///
    /// The code is never returned. If delivery fails the session is removed.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a session without an email or phone,
    /// a store error, or the sender's error
    pub async fn issue_code(&self, session: &Session) -> AppResult<()> {
        let Some(subject) = session.subject.as_ref() else {
            return Err(AppError::validation(
                "OTP codes can only be issued to email or phone sessions",
            ));
        };
        if session.state != SessionState::Pending {
            return Err(AppError::session_not_found("Session is not pending"));
        }

        let code = self.generator.generate(self.digits);
        let mut updated = session.clone();
        updated.otp_fingerprint = Some(crypto::fingerprint(&code));
        updated.otp_expires_at = Some((Utc::now() + self.ttl).min(session.expires_at));
        self.store.put(&updated).await?;

        if let Err(e) = self.sender.send_code(subject, &code).await {
            error!(session_id = %session.session_id, "OTP delivery failed: {e}");
            self.store.remove::<Session>(&session.session_id).await?;
            return Err(e);
        }
        Ok(())
    }

    /// Whether `presented_code` is the code outstanding on `session`; changes nothing
    #[must_use]
    pub fn code_matches(session: &Session, presented_code: &str) -> bool {
        session
            .otp_fingerprint
            .as_deref()
            .is_some_and(|stored| crypto::constant_time_eq(&crypto::fingerprint(presented_code), stored))
    }

    /// Verify a presented code, burning it either way
    ///
    /// One conditional write moves the session to `Confirmed` on a match or
    /// `Expired` on a mismatch and clears the stored code, so a code verifies
    /// at most once and a wrong guess ends the session.
    ///
    /// # Errors
    ///
    /// Returns session-not-found if the session is missing, expired, or no
    /// longer accepts codes, and invalid-code on a mismatch
    pub async fn verify_code(&self, session_id: &str, presented_code: &str) -> AppResult<Session> {
        let loaded = self
            .store
            .load::<Session>(session_id)
            .await?
            .ok_or_else(|| AppError::session_not_found("Session not found"))?;

        let now = Utc::now();
        if !loaded.record.accepts_code_at(now) {
            return Err(AppError::session_not_found(
                "Session expired or no code outstanding",
            ));
        }

        let matched = Self::code_matches(&loaded.record, presented_code);

        let mut next = loaded.record.clone();
        next.otp_fingerprint = None;
        next.otp_expires_at = None;
        next.state = if matched {
            SessionState::Confirmed
        } else {
            SessionState::Expired
        };

        if !self.store.compare_and_swap(&loaded, &next).await? {
            warn!(session_id = %session_id, "Concurrent OTP attempt lost the race");
            return Err(AppError::session_not_found("Session already settled"));
        }

        if matched {
            info!(session_id = %session_id, "OTP verified, session confirmed");
            Ok(next)
        } else {
            warn!(session_id = %session_id, "OTP mismatch, session expired");
            Err(AppError::invalid_code("Confirmation code mismatch"))
        }
    }
}
