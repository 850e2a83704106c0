use std::time::Duration;

#[cfg(all(feature = "redis-tokio", not(feature = "redis-smol")))]
pub(crate) async fn sleep(d: Duration) {
    tokio::time::sleep(d).await;
}

#[cfg(all(feature = "redis-smol", not(feature = "redis-tokio")))]
pub(crate) async fn sleep(d: Duration) {
    smol::Timer::after(d).await;
}

#[cfg(all(feature = "redis-smol", feature = "redis-tokio"))]
pub(crate) async fn sleep(d: Duration) {
    tokio::time::sleep(d).await;
}

// No runtime to sleep on: backoff degrades to immediate retry.
#[cfg(not(any(feature = "redis-tokio", feature = "redis-smol")))]
pub(crate) async fn sleep(_d: Duration) {}
