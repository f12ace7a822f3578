//! Pool statistics types

use serde::{Deserialize, Serialize};

/// Snapshot of a connection pool's counters
///
/// `gets` and `puts` count demand and returns; they are informational and
/// never drive pool decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PoolStats {
    /// Configured ceiling on live connections
    pub max_size: usize,
    /// Live connections, including slots reserved for a connection being created
    pub live: usize,
    /// Connections sitting in the idle queue
    pub idle: usize,
    /// Tasks parked waiting for a connection
    pub waiting: usize,
    /// Calls to `acquire`, counted on entry
    pub gets: u64,
    /// Connections handed back through `release`
    pub puts: u64,
    /// Connections successfully created by the factory
    pub created: u64,
    /// Connections destroyed by the pool (found closed, failed rollback, drained)
    pub discarded: u64,
}

impl PoolStats {
    /// Number of live connections currently checked out
    pub fn in_use(&self) -> usize {
        self.live.saturating_sub(self.idle)
    }

    /// Fraction of the ceiling currently checked out (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.in_use() as f64 / self.max_size as f64
        }
    }

    /// Whether the next `acquire` would have to wait
    pub fn is_exhausted(&self) -> bool {
        self.idle == 0 && self.live >= self.max_size
    }
}
