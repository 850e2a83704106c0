#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

mod counters;
pub use counters::*;

mod store;
pub use store::*;

mod memory;
pub use memory::*;

#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
mod redis;
#[cfg(any(feature = "redis-tokio", feature = "redis-smol"))]
pub use redis::*;

mod error;
pub use error::*;

mod common;
pub use common::{CounterWrite, KeySet, RetryPolicy};

mod runtime;
mod transaction;
