// ABOUTME: Cryptographic primitives for tokens, fingerprints, secret hashing, and PKCE
// ABOUTME: CSPRNG tokens, SHA-256 fingerprints, Argon2id secrets, and constant-time comparison
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

//! Cryptographic utilities shared by every service
//!
//! Bearer values (authorization codes, refresh tokens, OTP codes) are never
//! stored; only their [`fingerprint`] is.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose, Engine as _};
use gatekeeper_core::errors::{AppError, AppResult};
use ring::rand::{SecureRandom, SystemRandom};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tracing::error;

/// `length` random bytes from the system CSPRNG, base64url encoded without padding
///
/// # Errors
///
/// Returns an internal error if the system RNG fails
pub fn random_token(length: usize) -> AppResult<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; length];

    rng.fill(&mut bytes).map_err(|e| {
        error!("CRITICAL: SystemRandom failed - cannot generate secure random bytes: {e}");
        AppError::internal("System RNG failure - server cannot operate securely")
    })?;

    Ok(general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Hex SHA-256 of a bearer value; the storage key for codes and tokens
#[must_use]
pub fn fingerprint(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// `BASE64URL(SHA256(verifier))` (RFC 7636 Section 4.2)
#[must_use]
pub fn pkce_s256_challenge(verifier: &str) -> String {
    general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Compare two strings without leaking the position of the first difference
#[must_use]
pub fn constant_time_eq(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

/// Hash a client secret with Argon2id and a random salt
///
/// # Errors
///
/// Returns an internal error if hashing fails
pub fn hash_secret(secret: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("Argon2 password hashing failed: {e}")))
}

/// Verify a presented secret against a stored Argon2 PHC string
///
/// A malformed stored hash verifies as `false`.
#[must_use]
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
        error!("Failed to parse stored password hash");
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}
