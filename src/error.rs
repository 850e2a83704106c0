/// Error type for this crate.
///
/// Bound violations are *not* errors — they are reported through the boolean
/// return of the counter operations. Every variant here means the outcome of
/// the call could not be determined.
#[derive(Debug, thiserror::Error)]
pub enum AbacusError {
    /// Redis connectivity or protocol error.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// A non-integer payload was found where a counter was expected.
    ///
    /// This indicates external interference with the key namespace; the value
    /// is never silently coerced to zero.
    #[error("malformed counter at {key:?}: {value:?}")]
    MalformedCounter {
        /// Key holding the offending payload.
        key: String,
        /// The payload as read from the store.
        value: String,
    },

    /// A counter mutation would overflow the 64-bit value range.
    #[error("counter overflow at {key:?}")]
    CounterOverflow {
        /// Key whose mutation overflowed.
        key: String,
    },

    /// The configured retry budget ran out before a commit went through.
    ///
    /// Only reachable with [`RetryPolicy::bounded`](crate::RetryPolicy::bounded);
    /// the default policy retries forever.
    #[error("optimistic transaction gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// Number of attempts that ended in a conflict.
        attempts: u32,
    },

    /// Invalid Redis connection count.
    #[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
    #[cfg_attr(docsrs, doc(cfg(any(feature = "redis-tokio", feature = "redis-smol"))))]
    #[error("invalid redis connection count: {0}")]
    InvalidConnectionCount(String),
}
