//! Core business logic abstractions

pub mod aggregate;
pub mod aggregator;
pub mod arn;
pub mod balance;
pub mod cache;
pub mod config;
pub mod context;
pub mod log;
pub mod metadata;
pub mod price;
pub mod usd;

// Re-export main types for cleaner imports
pub use aggregate::{AggregateState, Aggregation};
pub use aggregator::{AggregationHandle, Aggregator};
pub use arn::{Address, Arn, AssetType, TokenStandard};
pub use balance::{BalanceEntry, BalanceSource};
pub use context::{Context, ContextKind};
pub use metadata::{AssetMetadata, AssetRegistry};
pub use price::{PriceProvider, PriceQuote};
