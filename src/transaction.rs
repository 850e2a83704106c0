//! The optimistic transaction executor: watch, read, decide, conditionally
//! commit, retry on conflict.

use crate::{AbacusError, CounterWrite, RetryPolicy, StoreSession, store::CounterStore};

/// What a read-check-write body decided.
pub(crate) enum TxDecision {
    /// Apply the write set atomically, provided no watched key changed.
    Commit(Vec<CounterWrite>),
    /// Policy says no: release the watch, write nothing, report `false`.
    Deny,
}

/// Run `body` under optimistic concurrency control.
///
/// Each attempt re-evaluates `watch_keys` (key membership may depend on the
/// wall clock), establishes a fresh watch session, and hands it to `body`. A
/// `Deny` needs no retry — nothing was written. A `Commit` is attempted
/// conditionally; if the store rejects it because a watched key changed, the
/// whole cycle restarts under `retry`, which by default retries forever.
///
/// The session moves through `body` by value and comes back alongside the
/// decision. Borrowing it into the closure instead would make the closure a
/// lending `AsyncFnMut`, whose impl is pinned to one call-site lifetime; the
/// operation futures would then no longer be spawnable on a work-stealing
/// runtime. Errors from `body` or the store abort the call immediately — the
/// session is dropped inside `body` on the error path, which releases the
/// watch.
pub(crate) async fn run_optimistic<S, K, F, Fut>(
    store: &S,
    retry: &RetryPolicy,
    watch_keys: K,
    mut body: F,
) -> Result<bool, AbacusError>
where
    S: CounterStore,
    K: Fn() -> Vec<String>,
    F: FnMut(S::Session) -> Fut,
    Fut: Future<Output = Result<(S::Session, TxDecision), AbacusError>>,
{
    let mut attempt: u32 = 0;

    loop {
        let keys = watch_keys();
        let session = store.watch(&keys).await?;

        match body(session).await? {
            (session, TxDecision::Commit(writes)) => {
                if session.commit(writes).await? {
                    return Ok(true);
                }
            }
            (session, TxDecision::Deny) => {
                session.discard().await?;
                return Ok(false);
            }
        }

        attempt += 1;
        tracing::trace!("tx.conflict, watched key changed, retrying (attempt {attempt})");
        retry.pause(attempt).await?;
    }
} // end fn run_optimistic
