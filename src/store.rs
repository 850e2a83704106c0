use crate::{AbacusError, CounterWrite};

/// Contract the counter operations require from a key-value store.
///
/// The store owns all counter state; implementations of this trait are
/// stateless handles that may be cloned and shared freely. Absence of a key
/// reads as `None` and is semantically a counter at 0.
///
/// [`RedisCounterStore`](crate::RedisCounterStore) implements this over a
/// shared Redis, [`MemoryCounterStore`](crate::MemoryCounterStore) in
/// process-local memory with the same semantics.
#[allow(async_fn_in_trait)]
pub trait CounterStore: Send + Sync {
    /// The per-call optimistic session type produced by [`watch`](Self::watch).
    type Session: StoreSession;

    /// Point read of a counter. `None` if absent or expired.
    async fn get(&self, key: &str) -> Result<Option<i64>, AbacusError>;

    /// Atomically write `value` with a TTL only if `key` is absent.
    ///
    /// Returns `true` iff the write took effect.
    async fn set_if_absent(&self, key: &str, value: i64, ttl_ms: u64)
    -> Result<bool, AbacusError>;

    /// Begin an optimistic session watching `keys`.
    ///
    /// A later [`commit`](StoreSession::commit) on the session applies only
    /// if none of the watched keys changed (including by expiry) in between.
    async fn watch(&self, keys: &[String]) -> Result<Self::Session, AbacusError>;
}

/// An ephemeral optimistic-concurrency session over a set of watched keys.
///
/// The session has no identity beyond the call: it either commits exactly the
/// intended write set or has no effect at all. Reads through the session see
/// live store state; consistency is enforced at commit time, not read time.
#[allow(async_fn_in_trait)]
pub trait StoreSession: Send {
    /// Point read of a counter within the session.
    async fn get(&mut self, key: &str) -> Result<Option<i64>, AbacusError>;

    /// Multi-key read, one round trip; the result has the same length and
    /// order as `keys`.
    async fn multi_get(&mut self, keys: &[String]) -> Result<Vec<Option<i64>>, AbacusError>;

    /// Atomically apply `writes` iff no watched key changed since
    /// [`watch`](CounterStore::watch).
    ///
    /// Returns `false` if the commit was rejected due to a concurrent change;
    /// nothing is written in that case.
    async fn commit(self, writes: Vec<CounterWrite>) -> Result<bool, AbacusError>;

    /// Release the watch without writing anything.
    async fn discard(self) -> Result<(), AbacusError>;
}
