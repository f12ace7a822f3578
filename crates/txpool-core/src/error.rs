//! Error types for txpool

use thiserror::Error;

/// Core error type for pool and driver operations
#[derive(Error, Debug)]
pub enum TxpoolError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Failed to create connection: {0}")]
    Creation(#[source] Box<TxpoolError>),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Cannot commit because connection was closed: {0}")]
    CommitOnClosed(String),

    #[error("Rollback failed: {0}")]
    RollbackFailed(#[source] Box<TxpoolError>),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("{0}")]
    Other(String),
}

impl TxpoolError {
    /// Wrap a factory failure, leaving errors that already describe a
    /// creation failure untouched
    pub fn creation(source: TxpoolError) -> Self {
        match source {
            TxpoolError::Creation(_) => source,
            other => TxpoolError::Creation(Box::new(other)),
        }
    }

    /// Whether this error reports a failure of the pool or connection itself,
    /// as opposed to an error raised by the caller's own work
    pub fn is_infrastructure(&self) -> bool {
        matches!(
            self,
            TxpoolError::Configuration(_)
                | TxpoolError::Creation(_)
                | TxpoolError::Protocol(_)
                | TxpoolError::CommitOnClosed(_)
                | TxpoolError::RollbackFailed(_)
                | TxpoolError::Timeout(_)
        )
    }
}

/// Result type alias for txpool operations
pub type Result<T> = std::result::Result<T, TxpoolError>;
