use std::fmt;
use std::io;
use thiserror::Error;

/// Which of the two engine queues an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Payloads waiting for a token hold
    Outbound,
    /// Payloads waiting to be collected by the upper layer
    Inbound,
}

impl fmt::Display for QueueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueKind::Outbound => f.write_str("outbound"),
            QueueKind::Inbound => f.write_str("inbound"),
        }
    }
}

/// Custom error types for the MS/TP data link
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{queue} queue full (capacity {capacity})")]
    QueueFull {
        /// Queue that rejected the entry
        queue: QueueKind,
        /// Fixed capacity of that queue
        capacity: usize,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Link driver closed")]
    Closed,
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Creates a new queue capacity error
    pub fn queue_full(queue: QueueKind, capacity: usize) -> Self {
        Error::QueueFull { queue, capacity }
    }

    /// Creates a new invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}
