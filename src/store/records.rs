// ABOUTME: Store key namespaces and expiry for each persisted model
// ABOUTME: Bearer-value records are keyed by fingerprint, never by the value itself
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

use chrono::{DateTime, Utc};
use gatekeeper_core::constants::store_keys;
use gatekeeper_core::models::{
    AuthorizationCode, Client, ExternalProviderState, RefreshTokenRecord, RevokedAccessToken,
    Session, SubjectLink,
};

use super::StoredRecord;

impl StoredRecord for Client {
    const PREFIX: &'static str = store_keys::CLIENT;

    fn key_id(&self) -> &str {
        &self.client_id
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}

impl StoredRecord for Session {
    const PREFIX: &'static str = store_keys::SESSION;

    fn key_id(&self) -> &str {
        &self.session_id
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl StoredRecord for AuthorizationCode {
    const PREFIX: &'static str = store_keys::AUTH_CODE;

    fn key_id(&self) -> &str {
        &self.code_fingerprint
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl StoredRecord for ExternalProviderState {
    const PREFIX: &'static str = store_keys::PROVIDER_STATE;

    fn key_id(&self) -> &str {
        &self.state
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl StoredRecord for RefreshTokenRecord {
    const PREFIX: &'static str = store_keys::REFRESH_TOKEN;

    fn key_id(&self) -> &str {
        &self.token_fingerprint
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl StoredRecord for RevokedAccessToken {
    const PREFIX: &'static str = store_keys::REVOKED_ACCESS_TOKEN;

    fn key_id(&self) -> &str {
        &self.jti
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        Some(self.expires_at)
    }
}

impl StoredRecord for SubjectLink {
    const PREFIX: &'static str = store_keys::SUBJECT_LINK;

    fn key_id(&self) -> &str {
        &self.identity_key
    }

    fn expires_at(&self) -> Option<DateTime<Utc>> {
        None
    }
}
