//! Request registry
//!
//! In-memory map from request ID to the latest record, read by the status
//! endpoint while a request is in flight. Records are swapped wholesale, so
//! a reader always gets one complete snapshot.
//!
//! Entries are inserted on submission and evicted once the result file has
//! been written and the grace period has passed.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{Duration, Instant};

use echidna_core::domain::request::RequestRecord;
use echidna_core::domain::state::RequestState;
use tokio::time;
use tracing::debug;
use uuid::Uuid;

struct Entry {
    record: Arc<RequestRecord>,
    persisted_at: Option<Instant>,
}

/// Registry of requests known to this process
pub struct RequestRegistry {
    entries: RwLock<HashMap<Uuid, Entry>>,
    ttl: Duration,
}

impl RequestRegistry {
    /// Creates a registry keeping persisted requests for `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub fn insert(&self, record: RequestRecord) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(
            record.id,
            Entry {
                record: Arc::new(record),
                persisted_at: None,
            },
        );
    }

    /// Replaces the snapshot of a request
    ///
    /// Returns `false` when the request is unknown.
    pub fn update(&self, id: Uuid, results: &RequestState) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get_mut(&id) {
            Some(entry) => {
                entry.record = Arc::new(entry.record.with_results(results.clone()));
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: Uuid) -> Option<Arc<RequestRecord>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(&id).map(|entry| Arc::clone(&entry.record))
    }

    /// Starts the grace period of a request whose result file is written
    pub fn mark_persisted(&self, id: Uuid) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get_mut(&id) {
            entry.persisted_at = Some(Instant::now());
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops persisted requests older than the grace period
    ///
    /// Returns how many entries were evicted.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, entry| match entry.persisted_at {
            Some(at) => now.saturating_duration_since(at) < self.ttl,
            None => true,
        });
        before - entries.len()
    }

    /// Starts a background task evicting expired entries
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);

            loop {
                ticker.tick().await;

                let evicted = self.evict_expired(Instant::now());
                if evicted > 0 {
                    debug!("Evicted {} finished request(s) from the registry", evicted);
                }
            }
        })
    }
}
