pub mod config;
pub mod cycle;
pub mod extract;
pub mod fetch;
pub mod pool;
pub mod reconcile;
pub mod stats;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod traits;
pub mod types;
pub mod upsert;
