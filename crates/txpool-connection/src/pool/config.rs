//! Pool configuration types

use std::num::NonZeroUsize;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use txpool_core::{Result, TxpoolError};

use crate::wait::SocketWaiter;

const DEFAULT_MAX_SIZE: NonZeroUsize = NonZeroUsize::new(10).unwrap();
const DEFAULT_FETCH_BATCH_SIZE: NonZeroUsize = NonZeroUsize::new(100).unwrap();

/// Configuration for a connection pool
///
/// Sizes are validated when the configuration is built, so a pool can never
/// be constructed with a ceiling of zero connections. Deserialization goes
/// through the same validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPoolConfig", into = "RawPoolConfig")]
pub struct PoolConfig {
    /// Maximum number of live connections
    max_size: NonZeroUsize,
    /// Rows requested per batch by lazy row iteration
    fetch_batch_size: NonZeroUsize,
    /// Upper bound in milliseconds for a single socket readiness wait
    wait_timeout_ms: Option<u64>,
}

/// Unvalidated form used for (de)serialization
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct RawPoolConfig {
    max_size: usize,
    fetch_batch_size: usize,
    wait_timeout_ms: Option<u64>,
}

impl Default for RawPoolConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE.get(),
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE.get(),
            wait_timeout_ms: None,
        }
    }
}

impl TryFrom<RawPoolConfig> for PoolConfig {
    type Error = TxpoolError;

    fn try_from(raw: RawPoolConfig) -> Result<Self> {
        let mut config =
            PoolConfig::new(raw.max_size)?.with_fetch_batch_size(raw.fetch_batch_size)?;
        config.wait_timeout_ms = raw.wait_timeout_ms;
        Ok(config)
    }
}

impl From<PoolConfig> for RawPoolConfig {
    fn from(config: PoolConfig) -> Self {
        Self {
            max_size: config.max_size.get(),
            fetch_batch_size: config.fetch_batch_size.get(),
            wait_timeout_ms: config.wait_timeout_ms,
        }
    }
}

impl PoolConfig {
    /// Create a configuration allowing at most `max_size` live connections
    ///
    /// Returns `TxpoolError::Configuration` if `max_size` is zero.
    pub fn new(max_size: usize) -> Result<Self> {
        let max_size = NonZeroUsize::new(max_size).ok_or_else(|| {
            TxpoolError::Configuration(format!(
                "max_size must be a positive integer, got {}",
                max_size
            ))
        })?;

        Ok(Self {
            max_size,
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            wait_timeout_ms: None,
        })
    }

    /// Set how many rows lazy iteration fetches per round trip
    pub fn with_fetch_batch_size(mut self, batch_size: usize) -> Result<Self> {
        self.fetch_batch_size = NonZeroUsize::new(batch_size).ok_or_else(|| {
            TxpoolError::Configuration(format!(
                "fetch_batch_size must be a positive integer, got {}",
                batch_size
            ))
        })?;
        Ok(self)
    }

    /// Bound every socket readiness wait of the default waiter
    pub fn with_wait_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.wait_timeout_ms = Some(timeout_ms);
        self
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size.get()
    }

    pub fn fetch_batch_size(&self) -> usize {
        self.fetch_batch_size.get()
    }

    /// Get the socket wait timeout as a Duration if set
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_ms.map(Duration::from_millis)
    }

    /// Build the waiter a pool uses when none is supplied explicitly
    pub fn socket_waiter(&self) -> SocketWaiter {
        match self.wait_timeout() {
            Some(timeout) => SocketWaiter::new().with_timeout(timeout),
            None => SocketWaiter::new(),
        }
    }
}

impl Default for PoolConfig {
    /// Create a default pool configuration
    ///
    /// Defaults:
    /// - max_size: 10
    /// - fetch_batch_size: 100
    /// - wait_timeout: None
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            fetch_batch_size: DEFAULT_FETCH_BATCH_SIZE,
            wait_timeout_ms: None,
        }
    }
}
