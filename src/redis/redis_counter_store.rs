use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use redis::{
    Client,
    aio::{ConnectionManager, MultiplexedConnection},
};

use crate::{
    AbacusError, CounterWrite,
    redis::parse_counter,
    store::{CounterStore, StoreSession},
};

/// A [`CounterStore`] backed by a shared Redis.
///
/// Plain reads and conditional sets round-robin over a pool of
/// [`redis::aio::ConnectionManager`]s (auto-reconnecting, multiplexed).
/// Optimistic sessions are different: `WATCH` state lives on the connection,
/// so every [`watch`](CounterStore::watch) opens a dedicated connection that
/// no other session shares, and drops it when the session ends. That keeps
/// concurrent in-flight transactions from cross-contaminating each other's
/// watch sets.
///
/// # Requirements
///
/// - **Redis version:** >= 6.2.0 (expiry of a watched key must abort `EXEC`)
/// - **Runtime:** Tokio or Smol (via `redis-tokio` or `redis-smol` features)
///
/// # Examples
///
/// ```ignore
/// use abacus::{CounterOps, RedisCounterStore};
///
/// let client = redis::Client::open("redis://127.0.0.1:6379/")?;
/// let store = RedisCounterStore::connect(client).await?;
/// let counters = CounterOps::new(store);
/// ```
pub struct RedisCounterStore {
    client: Client,
    connection_managers: Arc<Vec<ConnectionManager>>,
    track_index: AtomicUsize,
}

impl RedisCounterStore {
    /// Connect with a single shared connection manager for plain operations.
    pub async fn connect(client: Client) -> Result<Self, AbacusError> {
        Self::connect_pooled(client, 1).await
    }

    /// Connect with `connection_count` round-robined connection managers.
    pub async fn connect_pooled(
        client: Client,
        connection_count: usize,
    ) -> Result<Self, AbacusError> {
        if connection_count == 0 {
            return Err(AbacusError::InvalidConnectionCount(
                "connection count must be > 0".to_string(),
            ));
        }

        let mut connection_managers = Vec::with_capacity(connection_count);

        for _ in 0..connection_count {
            connection_managers.push(client.get_connection_manager().await?);
        }

        Ok(Self {
            client,
            connection_managers: Arc::new(connection_managers),
            track_index: AtomicUsize::new(0),
        })
    }

    fn manager(&self) -> ConnectionManager {
        let index = self.track_index.fetch_add(1, Ordering::Relaxed);
        self.connection_managers[index % self.connection_managers.len()].clone()
    } // end method manager
}

// ConnectionManager carries no useful (or Debug-printable) state; show the
// pool shape instead.
impl fmt::Debug for RedisCounterStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCounterStore")
            .field("connection_count", &self.connection_managers.len())
            .finish_non_exhaustive()
    }
}

impl Clone for RedisCounterStore {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            connection_managers: self.connection_managers.clone(),
            track_index: AtomicUsize::new(0),
        }
    }
}

impl CounterStore for RedisCounterStore {
    type Session = RedisSession;

    async fn get(&self, key: &str) -> Result<Option<i64>, AbacusError> {
        let mut manager = self.manager();
        let raw: Option<String> = redis::cmd("GET").arg(key).query_async(&mut manager).await?;
        parse_counter(key, raw)
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: i64,
        ttl_ms: u64,
    ) -> Result<bool, AbacusError> {
        let mut manager = self.manager();

        // SET .. PX .. NX replies OK when written, nil when the key exists.
        let written: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_ms)
            .arg("NX")
            .query_async(&mut manager)
            .await?;

        Ok(written.is_some())
    }

    async fn watch(&self, keys: &[String]) -> Result<Self::Session, AbacusError> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;

        redis::cmd("WATCH")
            .arg(keys)
            .query_async::<()>(&mut connection)
            .await?;

        Ok(RedisSession { connection })
    }
}

/// Optimistic session over a dedicated Redis connection.
///
/// Created by [`RedisCounterStore`]'s `watch`; the `WATCH` has already been
/// issued when the session is handed out. Dropping the session closes the
/// connection, which releases any watch still held server-side.
pub struct RedisSession {
    connection: MultiplexedConnection,
}

impl StoreSession for RedisSession {
    async fn get(&mut self, key: &str) -> Result<Option<i64>, AbacusError> {
        let raw: Option<String> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.connection)
            .await?;
        parse_counter(key, raw)
    }

    async fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<i64>>, AbacusError> {
        // MGET with zero keys is a protocol error.
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let raw: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut self.connection)
            .await?;

        keys.iter()
            .zip(raw)
            .map(|(key, value)| parse_counter(key, value))
            .collect()
    }

    async fn commit(mut self, writes: Vec<CounterWrite>) -> Result<bool, AbacusError> {
        let mut pipe = redis::pipe();
        pipe.atomic();

        for write in &writes {
            pipe.cmd("SET")
                .arg(&write.key)
                .arg(write.value)
                .arg("PX")
                .arg(write.ttl_ms)
                .ignore();
        }

        // EXEC replies nil when a watched key changed since WATCH.
        let applied: Option<()> = pipe.query_async(&mut self.connection).await?;
        Ok(applied.is_some())
    } // end method commit

    async fn discard(mut self) -> Result<(), AbacusError> {
        redis::cmd("UNWATCH")
            .query_async::<()>(&mut self.connection)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::RedisCounterStore;
    use crate::CounterOps;

    fn assert_debug<T: std::fmt::Debug>() {}

    #[test]
    fn store_and_front_end_are_debug() {
        assert_debug::<RedisCounterStore>();
        assert_debug::<CounterOps<RedisCounterStore>>();
    }
}
