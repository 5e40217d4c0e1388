// src/probe/cache.rs

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lru::LruCache;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::resolver::PathResolver;

/// How long a probe result stays valid.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// How many distinct commands are remembered.
pub const DEFAULT_CAPACITY: usize = 10;

/// Bounds for a [`CapabilityCache`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub capacity: NonZeroUsize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            capacity: NonZeroUsize::new(DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// One remembered probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeEntry {
    pub available: bool,
    pub probed_at: Instant,
}

/// Memo of "is `command` on PATH", bounded in time and in size.
///
/// - Fresh entries are answered without touching the resolver.
/// - Expiry is checked lazily on read; there is no background sweep.
/// - Past `capacity` the least recently used command is evicted.
/// - Concurrent probes of the same uncached command share one resolution.
/// - Resolver failures count as "unavailable" and are never returned.
///
/// The mutexes are only held for map operations, never across an `.await`.
pub struct CapabilityCache {
    resolver: Arc<dyn PathResolver>,
    ttl: Duration,
    entries: Mutex<LruCache<String, ProbeEntry>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<bool>>>>,
}

impl std::fmt::Debug for CapabilityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCache")
            .field("ttl", &self.ttl)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl CapabilityCache {
    pub fn new(resolver: Arc<dyn PathResolver>, settings: CacheSettings) -> Self {
        Self {
            resolver,
            ttl: settings.ttl,
            entries: Mutex::new(LruCache::new(settings.capacity)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Is `command` available on the search path?
    pub async fn probe(&self, command: &str) -> bool {
        if let Some(available) = self.lookup(command) {
            return available;
        }

        let cell = self.in_flight_cell(command);
        let available = *cell.get_or_init(|| self.resolve(command)).await;
        self.finish_probe(command, &cell, available);
        available
    }

    /// Number of entries currently held (fresh or not yet found stale).
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read an entry without refreshing its recency.
    pub fn peek(&self, command: &str) -> Option<ProbeEntry> {
        lock(&self.entries).peek(command).copied()
    }

    /// True if `command` has an entry younger than the TTL.
    pub fn contains_fresh(&self, command: &str) -> bool {
        self.peek(command)
            .is_some_and(|entry| !self.is_expired(&entry))
    }

    fn is_expired(&self, entry: &ProbeEntry) -> bool {
        entry.probed_at.elapsed() > self.ttl
    }

    fn lookup(&self, command: &str) -> Option<bool> {
        let mut entries = lock(&self.entries);
        let entry = *entries.get(command)?;

        if self.is_expired(&entry) {
            debug!(command, "capability probe expired; recomputing");
            entries.pop(command);
            return None;
        }

        Some(entry.available)
    }

    fn in_flight_cell(&self, command: &str) -> Arc<OnceCell<bool>> {
        let mut in_flight = lock(&self.in_flight);
        Arc::clone(
            in_flight
                .entry(command.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new())),
        )
    }

    /// Store the result once per resolution; later waiters on the same cell
    /// find it already removed and leave the entry alone.
    fn finish_probe(&self, command: &str, cell: &Arc<OnceCell<bool>>, available: bool) {
        let mut in_flight = lock(&self.in_flight);
        if in_flight
            .get(command)
            .is_some_and(|current| Arc::ptr_eq(current, cell))
        {
            in_flight.remove(command);
            self.store(command, available);
        }
    }

    fn store(&self, command: &str, available: bool) {
        let entry = ProbeEntry {
            available,
            probed_at: Instant::now(),
        };

        let mut entries = lock(&self.entries);
        if let Some((evicted, _)) = entries.push(command.to_string(), entry) {
            if evicted != command {
                debug!(command, evicted = %evicted, "capability cache full; evicted least recently used");
            }
        }
    }

    async fn resolve(&self, command: &str) -> bool {
        match self.resolver.resolve(command).await {
            Ok(Some(path)) => {
                debug!(command, path = %path.display(), "capability probe: available");
                true
            }
            Ok(None) => {
                debug!(command, "capability probe: not on PATH");
                false
            }
            Err(err) => {
                warn!(
                    command,
                    error = %err,
                    "capability probe failed; treating command as unavailable"
                );
                false
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
