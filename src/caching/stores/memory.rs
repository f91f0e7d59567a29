//! # Expiring Table
//!
//! Concurrent in-process table of payloads with per-entry expiry, shared by
//! the record-store and grid backends. Expired entries are invisible to reads
//! immediately and are removed by a periodic sweeper.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::debug;

use crate::core::types::StoredPayload;

#[derive(Debug, Clone)]
struct TableEntry {
    payload: StoredPayload,
    expires_at: Instant,
}

impl TableEntry {
    fn new(payload: StoredPayload, ttl: Duration) -> Self {
        Self {
            payload,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Default)]
pub struct ExpiringTable {
    entries: DashMap<String, TableEntry>,
    expired_cleanups: AtomicU64,
}

impl ExpiringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace
    pub fn insert(&self, key: &str, payload: StoredPayload, ttl: Duration) {
        self.entries
            .insert(key.to_string(), TableEntry::new(payload, ttl));
    }

    /// Insert only when no live entry holds `key`. The check and the insert
    /// happen under the same shard lock.
    pub fn insert_if_absent(&self, key: &str, payload: StoredPayload, ttl: Duration) -> bool {
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(TableEntry::new(payload, ttl));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(TableEntry::new(payload, ttl));
                true
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<StoredPayload> {
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Some(entry.payload.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired());
        }
        None
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|entry| !entry.is_expired())
            .unwrap_or(false)
    }

    /// Remove every expired entry, returning how many were dropped
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            self.expired_cleanups
                .fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed, "swept expired entries");
        }
        removed
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn expired_cleanups(&self) -> u64 {
        self.expired_cleanups.load(Ordering::Relaxed)
    }

    /// Sweep `table` every `period` until the table is dropped
    pub fn spawn_sweeper(table: &Arc<Self>, period: Duration) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(table);
        tokio::spawn(async move {
            let mut ticker = interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(table) => {
                        table.sweep();
                    }
                    None => break,
                }
            }
        })
    }
}
