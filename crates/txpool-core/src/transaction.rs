//! Transaction isolation levels
//!
//! A connection carries a "resting" isolation level. A transaction scope may
//! switch it for the duration of one checkout and must switch it back before
//! the connection is reused.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Transaction isolation level of a connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    /// Every statement commits on its own; no transaction is opened
    Autocommit,
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// The SQL spelling used in `SET TRANSACTION ISOLATION LEVEL ...`
    ///
    /// Returns `None` for `Autocommit`, which is a session mode rather than
    /// an isolation level.
    pub fn as_sql(&self) -> Option<&'static str> {
        match self {
            IsolationLevel::Autocommit => None,
            IsolationLevel::ReadUncommitted => Some("READ UNCOMMITTED"),
            IsolationLevel::ReadCommitted => Some("READ COMMITTED"),
            IsolationLevel::RepeatableRead => Some("REPEATABLE READ"),
            IsolationLevel::Serializable => Some("SERIALIZABLE"),
        }
    }

    /// Whether statements run at this level are grouped into a transaction
    pub fn is_transactional(&self) -> bool {
        !matches!(self, IsolationLevel::Autocommit)
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_sql() {
            Some(sql) => f.write_str(sql),
            None => f.write_str("AUTOCOMMIT"),
        }
    }
}
