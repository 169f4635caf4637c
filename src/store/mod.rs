// ABOUTME: Credential store abstraction with conditional writes and per-item TTL
// ABOUTME: Typed record access on top of a byte-level backend, bounded by a call timeout
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Gatekeeper Contributors

/// In-memory store implementation
pub mod memory;
/// `StoredRecord` implementations for the persisted models
mod records;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gatekeeper_core::errors::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::timeout;
use tracing::error;

pub use memory::InMemoryStore;

/// Byte-level key-value backend
///
/// Every write takes an optional TTL after which the item is gone. The three
/// conditional operations must be atomic per key: concurrent callers racing on
/// one key see exactly one winner.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a live item
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Unconditional write
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AppResult<()>;

    /// Write only if no live item exists; `true` if written
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool>;

    /// Replace the item only if its current bytes equal `expected`; `true` if swapped
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool>;

    /// Delete and return the live item, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unavailable
    async fn remove(&self, key: &str) -> AppResult<Option<Vec<u8>>>;
}

/// A model persisted under `<PREFIX>:<key_id>`
pub trait StoredRecord: Serialize + DeserializeOwned + Send + Sync {
    /// Key namespace
    const PREFIX: &'static str;

    /// Identifier within the namespace
    fn key_id(&self) -> &str;

    /// When the backend may drop the record; `None` keeps it until deleted
    fn expires_at(&self) -> Option<DateTime<Utc>>;
}

/// A record together with the exact bytes it was read from, for compare-and-swap
#[derive(Debug, Clone)]
pub struct Loaded<R> {
    /// Decoded record
    pub record: R,
    raw: Vec<u8>,
}

/// Typed access to a [`CredentialStore`]
///
/// Each backend call is bounded by `call_timeout`; a timeout surfaces as a
/// retryable `TransientStore` error.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn CredentialStore>,
    call_timeout: Duration,
}

impl RecordStore {
    /// Wrap a backend
    #[must_use]
    pub fn new(backend: Arc<dyn CredentialStore>, call_timeout: Duration) -> Self {
        Self {
            backend,
            call_timeout,
        }
    }

    fn key<R: StoredRecord>(id: &str) -> String {
        format!("{}:{id}", R::PREFIX)
    }

    /// Remaining lifetime of a record as a backend TTL
    fn ttl_of<R: StoredRecord>(record: &R) -> Option<Duration> {
        record
            .expires_at()
            .map(|expires_at| (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }

    async fn call<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = AppResult<T>> + Send,
    ) -> AppResult<T> {
        timeout(self.call_timeout, future).await.unwrap_or_else(|_| {
            error!(
                operation,
                timeout_ms = self.call_timeout.as_millis() as u64,
                "Credential store call timed out"
            );
            Err(AppError::transient_store(format!(
                "credential store {operation} timed out"
            )))
        })
    }

    /// Read a record with the bytes needed to swap it later
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout or an internal error on a corrupt record
    pub async fn load<R: StoredRecord>(&self, id: &str) -> AppResult<Option<Loaded<R>>> {
        let key = Self::key::<R>(id);
        let Some(raw) = self.call("get", self.backend.get(&key)).await? else {
            return Ok(None);
        };
        let record = serde_json::from_slice(&raw)?;
        Ok(Some(Loaded { record, raw }))
    }

    /// Read a record
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout or an internal error on a corrupt record
    pub async fn get<R: StoredRecord>(&self, id: &str) -> AppResult<Option<R>> {
        Ok(self.load(id).await?.map(|loaded| loaded.record))
    }

    /// Write a record, overwriting any existing one
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout
    pub async fn put<R: StoredRecord>(&self, record: &R) -> AppResult<()> {
        let key = Self::key::<R>(record.key_id());
        let bytes = serde_json::to_vec(record)?;
        self.call("put", self.backend.put(&key, bytes, Self::ttl_of(record)))
            .await
    }

    /// Write a record only if none exists; `true` if written
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout
    pub async fn put_if_absent<R: StoredRecord>(&self, record: &R) -> AppResult<bool> {
        let key = Self::key::<R>(record.key_id());
        let bytes = serde_json::to_vec(record)?;
        self.call(
            "put_if_absent",
            self.backend.put_if_absent(&key, bytes, Self::ttl_of(record)),
        )
        .await
    }

    /// Replace `current` with `next` only if nobody changed it since it was loaded
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout
    pub async fn compare_and_swap<R: StoredRecord>(
        &self,
        current: &Loaded<R>,
        next: &R,
    ) -> AppResult<bool> {
        let key = Self::key::<R>(current.record.key_id());
        let bytes = serde_json::to_vec(next)?;
        self.call(
            "compare_and_swap",
            self.backend
                .compare_and_swap(&key, &current.raw, bytes, Self::ttl_of(next)),
        )
        .await
    }

    /// Delete a record and return it
    ///
    /// # Errors
    ///
    /// Returns a transient error on timeout or an internal error on a corrupt record
    pub async fn remove<R: StoredRecord>(&self, id: &str) -> AppResult<Option<R>> {
        let key = Self::key::<R>(id);
        match self.call("remove", self.backend.remove(&key)).await? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }
}
