// ABOUTME: Maps login identities (email, phone, federated accounts) to stable internal subject ids
// ABOUTME: Links are written once with put-if-absent so concurrent first logins agree on one subject
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use chrono::Utc;
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::{FederatedIdentity, SubjectHint, SubjectLink};
use tracing::{debug, info};
use uuid::Uuid;

use crate::store::RecordStore;

/// Directory of identity links
#[derive(Clone)]
pub struct SubjectDirectory {
    store: RecordStore,
}

impl SubjectDirectory {
    /// Creates a new subject directory
    #[must_use]
    pub const fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Subject owning an email or phone, created on first use
    ///
    /// # Errors
    ///
    /// Returns a store error
    pub async fn resolve_hint(&self, hint: &SubjectHint) -> AppResult<String> {
        self.link_or_create(&hint.link_key(), None).await
    }

    /// Subject for a federated identity
    ///
    /// An existing link for the provider account wins. Otherwise a verified
    /// email joins the subject that owns that email, and anything else gets a
    /// fresh subject.
    ///
    /// # Errors
    ///
    /// Returns a store error
    pub async fn resolve_federated(&self, identity: &FederatedIdentity) -> AppResult<String> {
        let federated_key = identity.link_key();
        if let Some(link) = self.store.get::<SubjectLink>(&federated_key).await? {
            debug!(provider = %identity.provider, "Federated identity already linked");
            return Ok(link.subject_id);
        }

        let verified_email = identity
            .email
            .as_deref()
            .filter(|_| identity.email_verified)
            .and_then(|email| SubjectHint::email(email).ok());

        let candidate = match verified_email {
            Some(hint) => {
                let subject_id = self.resolve_hint(&hint).await?;
                info!(provider = %identity.provider, "Linking federated identity by verified email");
                subject_id
            }
            None => Self::new_subject_id(),
        };

        self.link_or_create(&federated_key, Some(candidate)).await
    }

    /// Link `identity_key` to `candidate` (or a fresh id) unless already linked,
    /// and return whichever subject owns the key afterwards
    async fn link_or_create(&self, identity_key: &str, candidate: Option<String>) -> AppResult<String> {
        if let Some(link) = self.store.get::<SubjectLink>(identity_key).await? {
            return Ok(link.subject_id);
        }

        let link = SubjectLink {
            identity_key: identity_key.to_owned(),
            subject_id: candidate.unwrap_or_else(Self::new_subject_id),
            created_at: Utc::now(),
        };
        if self.store.put_if_absent(&link).await? {
            info!(subject_id = %link.subject_id, "Created subject link");
            return Ok(link.subject_id);
        }

        // Lost the race to a concurrent first login
        self.store
            .get::<SubjectLink>(identity_key)
            .await?
            .map(|winner| winner.subject_id)
            .ok_or_else(|| AppError::internal("Subject link vanished after a conflicting write"))
    }

    fn new_subject_id() -> String {
        Uuid::new_v4().to_string()
    }
}
