/// Threshold monitor with hysteresis
pub mod monitor;

/// Sliding-window datapoint store with a running sum
pub mod store;

pub use monitor::AlertMonitor;
pub use store::{Datapoint, MetricStore};
