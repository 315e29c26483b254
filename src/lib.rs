/// Error types for the pipeline
pub mod error;

/// Wire contracts shared by every worker
pub mod messages;

/// Common log format grammar
pub mod clf;

/// Topic-addressed publish/subscribe bus
pub mod bus;

/// Access log file tailer
pub mod tailer;

/// Entry stream aggregation into counter snapshots
pub mod stats;

/// Threshold alerting with hysteresis
pub mod alerts;

/// Terminal dashboard
pub mod dashboard;

/// Cooperative shutdown primitives
pub mod shutdown;

// Re-export commonly used types
pub use error::{BusError, ClfError, MessageError, TailError};
