// ABOUTME: In-memory credential store with per-key atomic conditional writes and TTL support
// ABOUTME: Includes an optional background cleanup task for expired entries
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Gatekeeper Contributors

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use gatekeeper_core::errors::AppResult;
use tokio::sync::mpsc;
use tracing::debug;

use super::CredentialStore;

/// Stored bytes with an optional expiration
#[derive(Debug, Clone)]
struct StoreEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Instant::now() >= expires_at)
    }
}

/// In-memory store backed by `DashMap`
///
/// Conditional writes go through the `DashMap` entry API, which holds the
/// shard lock for the key across the read-compare-write. Expired entries are
/// invisible to readers and are swept by the optional cleanup task.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    entries: Arc<DashMap<String, StoreEntry>>,
    // Dropping the last clone closes the channel and stops the cleanup task
    _shutdown_tx: Option<Arc<mpsc::Sender<()>>>,
}

impl InMemoryStore {
    /// Create a store without background cleanup
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that sweeps expired entries every `cleanup_interval`
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_cleanup(cleanup_interval: Duration) -> Self {
        let entries = Arc::new(DashMap::new());
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let weak_entries = Arc::downgrade(&entries);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if !Self::cleanup_expired(&weak_entries) {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("Store cleanup task received shutdown signal");
                        break;
                    }
                }
            }
        });

        Self {
            entries,
            _shutdown_tx: Some(Arc::new(shutdown_tx)),
        }
    }

    /// Remove all expired entries; `false` once the store itself is gone
    fn cleanup_expired(entries: &Weak<DashMap<String, StoreEntry>>) -> bool {
        let Some(entries) = entries.upgrade() else {
            return false;
        };
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(entries.len());
        if removed > 0 {
            debug!("Cleaned up {removed} expired store entries");
        }
        true
    }

    /// Number of live entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired())
            .count()
    }

    /// Whether the store holds no live entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CredentialStore for InMemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let data = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => None,
            None => return Ok(None),
        };
        // The read guard is released before removing the expired entry
        self.entries.remove_if(key, |_, entry| entry.is_expired());
        Ok(data)
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> AppResult<()> {
        self.entries
            .insert(key.to_owned(), StoreEntry::new(value, ttl));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool> {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_expired() {
                    return Ok(false);
                }
                occupied.insert(StoreEntry::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoreEntry::new(value, ttl));
                Ok(true)
            }
        }
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &[u8],
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> AppResult<bool> {
        match self.entries.entry(key.to_owned()) {
            Entry::Occupied(occupied) if occupied.get().is_expired() => {
                occupied.remove();
                Ok(false)
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().data != expected {
                    return Ok(false);
                }
                occupied.insert(StoreEntry::new(value, ttl));
                Ok(true)
            }
            Entry::Vacant(_) => Ok(false),
        }
    }

    async fn remove(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, entry)| !entry.is_expired())
            .map(|(_, entry)| entry.data))
    }
}
