// ABOUTME: Main library entry point for the Gatekeeper authorization server
// ABOUTME: Passwordless OTP and federated login in front of an OAuth 2.0 code flow with PKCE
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

#![deny(unsafe_code)]

//! # Gatekeeper
//!
//! An OAuth 2.0 authorization server for first-party and partner clients.
//! Users prove who they are with a one-time code sent to their email or
//! phone, or by signing in with Google or Slack. Clients receive an
//! authorization code and exchange it for a JWT access token and a rotating
//! refresh token.
//!
//! ## Architecture
//!
//! - **Store**: Key-value credential store with conditional writes and TTLs
//! - **Login**: Sessions bound to client, redirect URI and CSRF token; OTP codes
//! - **Federation**: Google and Slack through `OpenID` Connect
//! - **`OAuth2` server**: Clients, codes, tokens and the HTTP surface
//! - **Config**: Environment-driven configuration
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gatekeeper::config::ServerConfig;
//! use gatekeeper::oauth2_server::{AuthorizationServer, OAuth2Routes};
//! use gatekeeper::store::InMemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::from_env()?;
//!     let server = AuthorizationServer::builder(config, Arc::new(InMemoryStore::new())).build()?;
//!     let _router = OAuth2Routes::routes(Arc::new(server));
//!     Ok(())
//! }
//! ```

/// Environment configuration
pub mod config;

/// Random tokens, fingerprints, PKCE and secret hashing
pub mod crypto;

/// External identity providers
pub mod federation;

/// Structured logging setup
pub mod logging;

/// Passwordless login sessions and OTP codes
pub mod login;

/// OAuth 2.0 authorization server
pub mod oauth2_server;

/// Credential store abstraction and in-memory backend
pub mod store;

/// Identity to subject mapping
pub mod subjects;

/// Unified error types shared with `gatekeeper-core`
pub use gatekeeper_core::errors;

/// Persisted models shared with `gatekeeper-core`
pub use gatekeeper_core::models;

/// Application constants shared with `gatekeeper-core`
pub use gatekeeper_core::constants;
