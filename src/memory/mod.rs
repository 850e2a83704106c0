mod memory_counter_store;
pub use memory_counter_store::*;
