use crate::{
    AbacusError, KeySet, RetryPolicy, StoreSession,
    common::CounterWrite,
    store::CounterStore,
    transaction::{TxDecision, run_optimistic},
};

/// Atomic counter operations over a [`CounterStore`].
///
/// This is the public face of the crate: four bounded, boolean-returning
/// counter mutations, each race-free under any number of concurrent callers
/// in any number of processes. All mutual exclusion is delegated to the
/// store's optimistic concurrency mechanism — no in-process locks are held,
/// and an instance is freely shareable across tasks and threads.
///
/// Operations on the same key serialize via conflict-and-retry; a call may
/// therefore block for several store round trips plus retries. Callers that
/// need bounded latency should inject a [`RetryPolicy::bounded`] or wrap the
/// call in their own deadline.
///
/// # Examples
///
/// ```ignore
/// use abacus::{CounterOps, MemoryCounterStore};
///
/// let counters = CounterOps::new(MemoryCounterStore::new());
///
/// assert!(counters.bounded_increment("k", 1, 5, 60_000).await?);
/// ```
#[derive(Clone, Debug)]
pub struct CounterOps<S> {
    store: S,
    retry: RetryPolicy,
}

impl<S: CounterStore> CounterOps<S> {
    /// Create counter operations over `store` with the default (unbounded,
    /// no-backoff) retry policy.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the conflict retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Access the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write `value` to `key` with a TTL only if `key` is currently absent.
    ///
    /// Returns `true` iff the write took effect (the key was absent or had
    /// fully expired). The store's conditional set is itself atomic, so no
    /// watch/retry protocol is needed here.
    pub async fn add(&self, key: &str, value: i64, ttl_ms: u64) -> Result<bool, AbacusError> {
        self.store.set_if_absent(key, value, ttl_ms).await
    }

    /// Increment `key` by `amount` unless the result would exceed `maximum`.
    ///
    /// Absence reads as 0 and `maximum` is inclusive: a result of exactly
    /// `maximum` is allowed. On success the TTL is refreshed to `ttl_ms`.
    /// Returns `false`, writing nothing, if the bound would be violated.
    pub async fn bounded_increment(
        &self,
        key: &str,
        amount: i64,
        maximum: i64,
        ttl_ms: u64,
    ) -> Result<bool, AbacusError> {
        let watch_keys = || vec![key.to_string()];

        run_optimistic(&self.store, &self.retry, watch_keys, move |mut session| async move {
            let current = session.get(key).await?.unwrap_or(0);
            let next = checked_step(key, current, amount, i64::checked_add)?;

            if next > maximum {
                return Ok((session, TxDecision::Deny));
            }

            let writes = vec![CounterWrite {
                key: key.to_string(),
                value: next,
                ttl_ms,
            }];
            Ok((session, TxDecision::Commit(writes)))
        })
        .await
    } // end method bounded_increment

    /// Decrement `key` by `amount` unless the result would drop below
    /// `minimum`.
    ///
    /// Symmetric to [`bounded_increment`](Self::bounded_increment); `minimum`
    /// is inclusive.
    pub async fn bounded_decrement(
        &self,
        key: &str,
        amount: i64,
        minimum: i64,
        ttl_ms: u64,
    ) -> Result<bool, AbacusError> {
        let watch_keys = || vec![key.to_string()];

        run_optimistic(&self.store, &self.retry, watch_keys, move |mut session| async move {
            let current = session.get(key).await?.unwrap_or(0);
            let next = checked_step(key, current, amount, i64::checked_sub)?;

            if next < minimum {
                return Ok((session, TxDecision::Deny));
            }

            let writes = vec![CounterWrite {
                key: key.to_string(),
                value: next,
                ttl_ms,
            }];
            Ok((session, TxDecision::Commit(writes)))
        })
        .await
    }

    /// Increment `key` by `amount` unless `amount` plus the sum of the
    /// `siblings` counters would exceed `maximum`.
    ///
    /// The sibling keys are the buckets contributing to the same logical
    /// total (e.g. the slots of a sliding window). They are read and watched
    /// but never written here — each bucket is written by the same call
    /// applied with that bucket as the primary.
    ///
    /// The watch covers `key` plus the resolved siblings. If the primary-only
    /// increment already exceeds `maximum` the call is rejected without ever
    /// reading the siblings. Otherwise the sibling set is resolved a second
    /// time right before the sum, so that time-dependent membership is
    /// checked as close to commit as possible.
    ///
    /// The aggregate is `amount + Σ siblings`, summed over exactly the
    /// resolved list: the primary's prior value participates only if the
    /// caller's key set includes the primary itself, which is the natural
    /// shape for disjoint time buckets.
    pub async fn aggregate_bounded_increment(
        &self,
        key: &str,
        siblings: &KeySet,
        amount: i64,
        maximum: i64,
        ttl_ms: u64,
    ) -> Result<bool, AbacusError> {
        let watch_keys = || {
            let resolved = siblings.resolve();
            let mut all = Vec::with_capacity(resolved.len() + 1);
            all.push(key.to_string());
            all.extend(resolved);
            all
        };

        run_optimistic(&self.store, &self.retry, watch_keys, move |mut session| async move {
            let current = session.get(key).await?.unwrap_or(0);
            let next = checked_step(key, current, amount, i64::checked_add)?;

            // Cheap early rejection on the primary alone.
            if next > maximum {
                return Ok((session, TxDecision::Deny));
            }

            // Re-resolve to account for time elapsed since the watch.
            let sibling_keys = siblings.resolve();
            let mut total = amount;
            for value in session.multi_get(&sibling_keys).await?.into_iter().flatten() {
                total = checked_step(key, total, value, i64::checked_add)?;
            }

            if total > maximum {
                return Ok((session, TxDecision::Deny));
            }

            let writes = vec![CounterWrite {
                key: key.to_string(),
                value: next,
                ttl_ms,
            }];
            Ok((session, TxDecision::Commit(writes)))
        })
        .await
    } // end method aggregate_bounded_increment
}

fn checked_step(
    key: &str,
    current: i64,
    amount: i64,
    op: fn(i64, i64) -> Option<i64>,
) -> Result<i64, AbacusError> {
    op(current, amount).ok_or_else(|| AbacusError::CounterOverflow {
        key: key.to_string(),
    })
}
