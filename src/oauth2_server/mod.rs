// ABOUTME: OAuth 2.0 authorization server with passwordless and federated login
// ABOUTME: Client registration, authorization codes with PKCE, JWT access tokens and refresh rotation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

/// Client registration, deletion and authentication
pub mod client_registration;
/// Single-use authorization codes
pub mod codes;
/// Authorization server facade
pub mod endpoints;
/// OAuth 2.0 request and response types
pub mod models;
/// axum routes
pub mod routes;
/// Access and refresh tokens
pub mod tokens;

pub use client_registration::ClientRegistry;
pub use codes::{AuthorizationCodeEngine, CodeRequest};
pub use endpoints::{AuthorizationServer, AuthorizationServerBuilder, BasicCredentials};
pub use routes::OAuth2Routes;
pub use tokens::TokenService;
