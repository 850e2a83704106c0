use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dashmap::DashMap;

use crate::{AbacusError, CounterWrite, store::CounterStore, store::StoreSession};

/// An in-process [`CounterStore`] with the same semantics as the Redis
/// backend.
///
/// Counters live in a [`DashMap`](dashmap::DashMap); every write stamps the
/// entry with a store-wide monotonically increasing version, and an
/// optimistic session snapshots the versions of its watched keys at watch
/// time. Commit re-checks those versions under a store-wide mutex and applies
/// the write set only if none moved — including a key that expired in the
/// meantime, which aborts the commit just like a watched-key expiry does on
/// Redis ≥ 6.0.9.
///
/// # Semantics & Limitations
///
/// **Lazy eviction:**
/// - Expired entries are only removed when the key is next touched
/// - Unbounded key cardinality with no further traffic will grow memory
///
/// **Single process only:**
/// - State is process-local; use [`RedisCounterStore`](crate::RedisCounterStore)
///   when multiple processes must share counters
#[derive(Clone, Debug, Default)]
pub struct MemoryCounterStore {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: DashMap<String, Entry>,
    /// Store-wide write stamp; never reused, so a version match at commit
    /// time means the entry is untouched since the watch.
    next_version: AtomicU64,
    /// Serializes commits and conditional sets against each other.
    commit_lock: Mutex<()>,
}

#[derive(Clone, Debug)]
struct Entry {
    value: i64,
    version: u64,
    expires_at: Instant,
}

impl MemoryCounterStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining TTL of `key`, if present and unexpired. Test observability.
    #[cfg(test)]
    pub(crate) fn expires_in(&self, key: &str) -> Option<Duration> {
        let entry = self.inner.entries.get(key)?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        let now = Instant::now();
        self.inner
            .entries
            .iter()
            .filter(|e| e.expires_at > now)
            .count()
    }
}

impl Inner {
    /// Drop `key` if it has expired; returns the live entry, if any.
    fn live(&self, key: &str) -> Option<Entry> {
        let entry = {
            let found = self.entries.get(key)?;
            Entry::clone(&found)
        };
        if entry.expires_at <= Instant::now() {
            drop(
                self.entries
                    .remove_if(key, |_, e| e.expires_at <= Instant::now()),
            );
            return None;
        }
        Some(entry)
    }

    fn stamp(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl CounterStore for MemoryCounterStore {
    type Session = MemorySession;

    async fn get(&self, key: &str) -> Result<Option<i64>, AbacusError> {
        Ok(self.inner.live(key).map(|e| e.value))
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl_ms: u64,
    ) -> Result<bool, AbacusError> {
        let inner = &self.inner;
        let _guard = inner.commit_lock.lock().expect("memory store lock poisoned");

        if inner.live(key).is_some() {
            return Ok(false);
        }

        inner.entries.insert(
            key.to_string(),
            Entry {
                value,
                version: inner.stamp(),
                expires_at: Instant::now() + Duration::from_millis(ttl_ms),
            },
        );

        Ok(true)
    }

    async fn watch(&self, keys: &[String]) -> Result<Self::Session, AbacusError> {
        let watched = keys
            .iter()
            .map(|key| {
                let version = self.inner.live(key).map(|e| e.version);
                (key.clone(), version)
            })
            .collect();

        Ok(MemorySession {
            inner: self.inner.clone(),
            watched,
        })
    }
}

/// Optimistic session over a [`MemoryCounterStore`].
///
/// Holds the watched keys' versions as of watch time; see the store docs for
/// the conflict rules. Dropping the session releases the watch implicitly
/// (there is no server-side state to clean up).
#[derive(Debug)]
pub struct MemorySession {
    inner: Arc<Inner>,
    /// Version per watched key as of watch time; `None` means absent.
    watched: Vec<(String, Option<u64>)>,
}

impl StoreSession for MemorySession {
    async fn get(&mut self, key: &str) -> Result<Option<i64>, AbacusError> {
        Ok(self.inner.live(key).map(|e| e.value))
    }

    async fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<i64>>, AbacusError> {
        Ok(keys
            .iter()
            .map(|key| self.inner.live(key).map(|e| e.value))
            .collect())
    }

    async fn commit(self, writes: Vec<CounterWrite>) -> Result<bool, AbacusError> {
        let inner = &self.inner;
        let _guard = inner.commit_lock.lock().expect("memory store lock poisoned");

        let unchanged = self
            .watched
            .iter()
            .all(|(key, version)| inner.live(key).map(|e| e.version) == *version);

        if !unchanged {
            return Ok(false);
        }

        let now = Instant::now();
        for write in writes {
            inner.entries.insert(
                write.key,
                Entry {
                    value: write.value,
                    version: inner.stamp(),
                    expires_at: now + Duration::from_millis(write.ttl_ms),
                },
            );
        }

        Ok(true)
    } // end method commit

    async fn discard(self) -> Result<(), AbacusError> {
        Ok(())
    }
}
