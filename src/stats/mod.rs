/// Entry stream to counter snapshot aggregation
pub mod aggregator;

/// Flat counter cache with swap-and-reset snapshots
pub mod cache;

pub use aggregator::StatsAggregator;
pub use cache::CounterCache;
