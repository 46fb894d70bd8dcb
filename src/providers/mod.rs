pub mod coingecko;
pub mod fixed;
pub mod indexer;
pub mod routing;
pub mod snapshot;
pub mod util;

// Re-export traits for providers to easily use cache
pub use crate::core::cache::Cache;
pub use crate::store::memory::MemoryCache;
