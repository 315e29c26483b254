use thiserror::Error;

/// Errors that can occur when publishing to the bus
#[derive(Error, Debug)]
pub enum BusError {
    #[error("Failed to serialize message: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Bus is no longer accepting messages")]
    Closed,
}

/// Errors that can occur while decoding an inbound payload
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Failed to decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unexpected message type")]
    WrongKind,
}

/// Errors that can occur while tailing the access log
#[derive(Error, Debug)]
pub enum TailError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to watch {path}: {source}")]
    Watch {
        path: String,
        source: notify::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur when parsing a common log format line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClfError {
    #[error("Line does not match common log format")]
    NoMatch,

    #[error("Failed to parse date in common log format: {0}")]
    Date(String),

    #[error("Failed to parse status in common log format: {0}")]
    Status(String),

    #[error("Failed to parse bytes in common log format: {0}")]
    Bytes(String),
}
