mod redis_counter_store;
pub use redis_counter_store::*;

mod common;
pub(crate) use common::*;
