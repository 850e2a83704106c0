use std::{fmt, num::NonZeroU32, sync::Arc, time::Duration};

use crate::{AbacusError, runtime};

/// One write in the commit set of an optimistic transaction: set `key` to
/// `value` and refresh its expiry to `ttl_ms` from now.
///
/// TTLs are absolute per write, never cumulative across calls.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CounterWrite {
    /// Key to write.
    pub key: String,
    /// Value to store.
    pub value: i64,
    /// Time-to-live in milliseconds, applied with the write.
    pub ttl_ms: u64,
}

/// A set of sibling counter keys for aggregate operations.
///
/// The set is either known up front or must be computed at call time — for
/// example the buckets of a sliding window, whose membership depends on the
/// current wall clock. Dynamic sets are resolved twice per attempt: once when
/// the optimistic watch is established and again immediately before the
/// aggregate sum, so a bucket boundary crossed mid-transaction is still
/// checked against the freshest set.
#[derive(Clone)]
pub enum KeySet {
    /// A fixed list of keys.
    Static(Vec<String>),
    /// Keys computed at resolution time.
    Dynamic(Arc<dyn Fn() -> Vec<String> + Send + Sync>),
}

impl KeySet {
    /// Create a dynamic key set from a resolver closure.
    pub fn dynamic<F>(resolver: F) -> Self
    where
        F: Fn() -> Vec<String> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(resolver))
    }

    /// Produce the current key list.
    pub fn resolve(&self) -> Vec<String> {
        match self {
            Self::Static(keys) => keys.clone(),
            Self::Dynamic(resolver) => resolver(),
        }
    }
}

impl From<Vec<String>> for KeySet {
    fn from(keys: Vec<String>) -> Self {
        Self::Static(keys)
    }
}

impl From<&[&str]> for KeySet {
    fn from(keys: &[&str]) -> Self {
        Self::Static(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for KeySet {
    fn from(keys: [&str; N]) -> Self {
        Self::Static(keys.iter().map(|k| k.to_string()).collect())
    }
}

impl fmt::Debug for KeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static(keys) => f.debug_tuple("Static").field(keys).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"..").finish(),
        }
    }
}

/// How the transaction executor behaves when a commit is rejected because a
/// watched key changed concurrently.
///
/// The default retries forever with no delay — the classic WATCH/MULTI loop,
/// which assumes conflicts are rare and short-lived relative to call latency.
/// [`RetryPolicy::bounded`] trades that liveness guarantee for a worst-case
/// latency bound: after `max_attempts` conflicting attempts the operation
/// fails with [`AbacusError::RetriesExhausted`].
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: Option<NonZeroU32>,
    backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }
}

impl RetryPolicy {
    /// Retry at most `max_attempts` times, sleeping `backoff` before the
    /// first retry and doubling on each subsequent one, capped at 100ms.
    ///
    /// A `max_attempts` of zero is treated as one attempt.
    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(NonZeroU32::new(max_attempts).unwrap_or(NonZeroU32::MIN)),
            backoff,
            max_backoff: Duration::from_millis(100),
        }
    }

    /// Cap the doubling backoff at `max_backoff`.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> Self {
        self.max_backoff = max_backoff;
        self
    }

    /// Account for a conflicting attempt, sleeping out the backoff.
    ///
    /// `attempt` is 1-based: the number of attempts that have already ended
    /// in a conflict.
    pub(crate) async fn pause(&self, attempt: u32) -> Result<(), AbacusError> {
        if let Some(max) = self.max_attempts {
            if attempt >= max.get() {
                tracing::debug!("tx.retry.exhausted, giving up after {attempt} attempts");
                return Err(AbacusError::RetriesExhausted { attempts: attempt });
            }
        }

        if !self.backoff.is_zero() {
            let exp = attempt.saturating_sub(1).min(16);
            let delay = self
                .backoff
                .saturating_mul(1 << exp)
                .min(self.max_backoff.max(self.backoff));
            runtime::sleep(delay).await;
        }

        Ok(())
    } // end method pause
}
