// ABOUTME: Configuration management module for centralized server settings
// ABOUTME: Environment-only configuration for the listener, token lifetimes, and identity providers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

//! Configuration module for Gatekeeper
//!
//! - **Environment**: listener, signing secret, and lifetimes from environment variables
//! - **OAuth**: Google and Slack client credentials and endpoints

/// Environment and server configuration
pub mod environment;
/// External identity provider configuration
pub mod oauth;

pub use environment::{AuthConfig, Environment, ServerConfig};
pub use oauth::{ProviderConfig, ProvidersConfig};
