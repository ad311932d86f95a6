// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-wide session store with per-entry time-to-live.
//!
//! Entries expire lazily on access; a background sweep evicts expired
//! entries every 60 seconds so the map does not grow unbounded between
//! reads. Reads recheck `expires_at` and are authoritative. The store is
//! in-process only and holds no persistent state.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Interval of the background eviction sweep.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct SessionEntry {
    value: Value,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Key → value map with lazy TTL eviction.
#[derive(Debug, Default)]
pub struct SessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new() -> Self {
        SessionStore::default()
    }

    /// Store a value. Absent TTL means the entry never expires.
    pub fn set(&self, key: &str, value: Value, ttl_seconds: Option<u64>) {
        let now = Utc::now();
        let entry = SessionEntry {
            value,
            created_at: now,
            expires_at: ttl_seconds.map(|s| now + ChronoDuration::seconds(s as i64)),
        };
        self.entries
            .lock()
            .expect("session store lock poisoned")
            .insert(key.to_string(), entry);
    }

    /// Fetch a value. An expired entry is deleted and treated as absent.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        let expired = entries.get(key)?.is_expired(now);
        if expired {
            entries.remove(key);
            return None;
        }
        entries.get(key).map(|entry| entry.value.clone())
    }

    /// Fetch a string value, if the entry holds one.
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|value| value.as_str().map(str::to_string))
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Remove an entry. Returns whether one was present.
    pub fn delete(&self, key: &str) -> bool {
        self.entries
            .lock()
            .expect("session store lock poisoned")
            .remove(key)
            .is_some()
    }

    /// Extend a live entry's lifetime from now. Returns false when the
    /// entry is absent or already expired.
    pub fn renew(&self, key: &str, ttl_seconds: u64) -> bool {
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        let Some(entry) = entries.get_mut(key) else {
            return false;
        };
        if entry.is_expired(now) {
            entries.remove(key);
            return false;
        }
        entry.expires_at = Some(now + ChronoDuration::seconds(ttl_seconds as i64));
        true
    }

    /// List keys of non-expired entries.
    pub fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        self.entries
            .lock()
            .expect("session store lock poisoned")
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Age of an entry, if present and live.
    pub fn age(&self, key: &str) -> Option<ChronoDuration> {
        let now = Utc::now();
        let entries = self.entries.lock().expect("session store lock poisoned");
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| now - entry.created_at)
    }

    /// Evict every expired entry, returning how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut entries = self.entries.lock().expect("session store lock poisoned");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Spawn the recurring background sweep. The task runs until the store
    /// is dropped everywhere else.
    pub fn spawn_sweeper(store: &Arc<SessionStore>) -> tokio::task::JoinHandle<()> {
        let weak = Arc::downgrade(store);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else { break };
                let evicted = store.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, "session sweep evicted expired entries");
                }
            }
        })
    }
}
