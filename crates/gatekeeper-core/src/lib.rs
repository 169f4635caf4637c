// ABOUTME: Core types and constants for the Gatekeeper authorization service
// ABOUTME: Foundation crate with error handling, persisted models, and protocol constants
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

#![deny(unsafe_code)]

//! # Gatekeeper Core
//!
//! Shared types for the Gatekeeper authorization service. This crate changes
//! rarely, so the main crate can recompile without touching it.
//!
//! ## Modules
//!
//! - **errors**: `AppError`, `ErrorCode`, and the OAuth 2.0 error mapping
//! - **models**: records persisted in the credential store
//! - **constants**: protocol limits, default lifetimes, and store key prefixes

/// Application constants organized by domain
pub mod constants;

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// Persisted records for clients, sessions, codes, provider state, and tokens
pub mod models;
