// ABOUTME: OAuth 2.0 client registration, deletion, and authentication
// ABOUTME: Issues client secrets once and persists only their Argon2id hash
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

use chrono::Utc;
use gatekeeper_core::constants::oauth::{CLIENT_SECRET_BYTES, OOB_REDIRECT_URI};
use gatekeeper_core::errors::{AppError, AppResult};
use gatekeeper_core::models::Client;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use super::models::{ClientCredentials, ClientRegistrationRequest};
use crate::crypto;
use crate::logging::AppLogger;
use crate::store::RecordStore;

/// Registered OAuth clients and their credentials
#[derive(Clone)]
pub struct ClientRegistry {
    store: RecordStore,
}

impl ClientRegistry {
    /// Creates a new client registry
    #[must_use]
    pub const fn new(store: RecordStore) -> Self {
        Self { store }
    }

    /// Register a client with a single redirect URI
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed redirect URI, name, or scope
    pub async fn create_client(
        &self,
        name: &str,
        redirect_uri: &str,
        scopes: Vec<String>,
    ) -> AppResult<ClientCredentials> {
        self.register(ClientRegistrationRequest {
            name: name.to_owned(),
            redirect_uris: vec![redirect_uri.to_owned()],
            scopes,
        })
        .await
    }

    /// Register a client; the returned secret is never retrievable again
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed request, or a store error
    pub async fn register(
        &self,
        request: ClientRegistrationRequest,
    ) -> AppResult<ClientCredentials> {
        Self::validate_registration_request(&request)?;

        let client_id = Self::generate_client_id();
        let client_secret = crypto::random_token(CLIENT_SECRET_BYTES)?;
        let secret_hash = crypto::hash_secret(&client_secret)?;

        let mut scopes: Vec<String> = Vec::with_capacity(request.scopes.len());
        for scope in request.scopes {
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }

        let client = Client {
            client_id: client_id.clone(),
            secret_hash,
            name: request.name.trim().to_owned(),
            redirect_uris: request.redirect_uris,
            scopes,
            created_at: Utc::now(),
        };

        if !self.store.put_if_absent(&client).await? {
            return Err(AppError::internal("Generated client_id collided"));
        }

        info!(client_id = %client_id, name = %client.name, "Registered OAuth client");
        Ok(ClientCredentials {
            client_id,
            client_secret,
        })
    }

    /// Delete a client after verifying its secret
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown client and forbidden for a wrong secret
    pub async fn delete_client(&self, client_id: &str, presented_secret: &str) -> AppResult<()> {
        let client: Client = self
            .store
            .get(client_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Client {client_id}")))?;

        if !crypto::verify_secret(presented_secret, &client.secret_hash) {
            AppLogger::log_security_event(
                "client_delete_rejected",
                "client secret did not verify",
                Some(client_id),
            );
            return Err(AppError::forbidden("Client secret does not match"));
        }

        self.store.remove::<Client>(client_id).await?;
        info!(client_id = %client_id, "Deleted OAuth client");
        Ok(())
    }

    /// Look up a client
    ///
    /// # Errors
    ///
    /// Returns invalid-client when the client does not exist
    pub async fn get_client(&self, client_id: &str) -> AppResult<Client> {
        self.store.get(client_id).await?.ok_or_else(|| {
            debug!(client_id = %client_id, "Client lookup failed");
            AppError::invalid_client("Unknown client")
        })
    }

    /// Check that `redirect_uri` is registered for the client and resolve the
    /// requested scope against the client's scopes
    ///
    /// # Errors
    ///
    /// Returns invalid-client for an unknown client, invalid-redirect for an
    /// unregistered URI, and a validation error for an unregistered scope
    pub async fn resolve_binding(
        &self,
        client_id: &str,
        redirect_uri: &str,
        requested_scope: Option<&str>,
    ) -> AppResult<String> {
        let client = self.get_client(client_id).await?;
        if !client.has_redirect_uri(redirect_uri) {
            warn!(client_id = %client_id, "Rejected unregistered redirect_uri");
            return Err(AppError::invalid_redirect(
                "redirect_uri is not registered for this client",
            ));
        }
        client.resolve_scope(requested_scope)
    }

    /// Authenticate a client by its secret
    ///
    /// Unknown clients and wrong secrets are indistinguishable to the caller.
    ///
    /// # Errors
    ///
    /// Returns invalid-client on any authentication failure
    pub async fn authenticate(&self, client_id: &str, client_secret: &str) -> AppResult<Client> {
        let client = self.get_client(client_id).await?;
        if !crypto::verify_secret(client_secret, &client.secret_hash) {
            warn!("OAuth client {client_id} secret validation failed");
            return Err(AppError::invalid_client("Client authentication failed"));
        }
        debug!("OAuth client {client_id} authenticated");
        Ok(client)
    }

    /// Validate registration request
    fn validate_registration_request(request: &ClientRegistrationRequest) -> AppResult<()> {
        if request.name.trim().is_empty() {
            return Err(AppError::validation("Client name is required"));
        }

        if request.redirect_uris.is_empty() {
            return Err(AppError::validation("At least one redirect_uri is required"));
        }
        for uri in &request.redirect_uris {
            if !Self::is_valid_redirect_uri(uri) {
                return Err(AppError::validation(format!("Invalid redirect_uri: {uri}")));
            }
        }

        if request.scopes.is_empty() {
            return Err(AppError::validation("At least one scope is required"));
        }
        if let Some(scope) = request
            .scopes
            .iter()
            .find(|scope| scope.is_empty() || scope.chars().any(|c| c.is_whitespace() || c == '"' || c == '\\'))
        {
            return Err(AppError::validation(format!("Invalid scope: '{scope}'")));
        }

        Ok(())
    }

    /// Check if redirect URI is valid
    ///
    /// Absolute, no fragment, no wildcard, and `https` unless the host is a
    /// loopback address. The RFC 8252 out-of-band URN is accepted as is.
    fn is_valid_redirect_uri(uri: &str) -> bool {
        if uri.trim().is_empty() || uri.trim() != uri {
            return false;
        }
        if uri.contains('#') {
            warn!("Rejected redirect_uri with fragment: {uri}");
            return false;
        }
        if uri.contains('*') {
            warn!("Rejected redirect_uri with wildcard: {uri}");
            return false;
        }
        if uri == OOB_REDIRECT_URI {
            return true;
        }

        let Ok(parsed_uri) = Url::parse(uri) else {
            warn!("Rejected malformed redirect_uri: {uri}");
            return false;
        };

        let is_loopback = matches!(
            parsed_uri.host_str(),
            Some("localhost" | "127.0.0.1" | "[::1]")
        );
        match parsed_uri.scheme() {
            "https" => parsed_uri.host_str().is_some(),
            "http" if is_loopback => true,
            _ => {
                warn!("Rejected redirect_uri with non-HTTPS scheme for non-loopback host: {uri}");
                false
            }
        }
    }

    /// Generate client ID
    fn generate_client_id() -> String {
        format!("client_{}", Uuid::new_v4().simple())
    }
}
