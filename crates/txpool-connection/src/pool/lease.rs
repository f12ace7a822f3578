//! Checked-out connection bookkeeping

use std::sync::Arc;

use txpool_core::Connection;

use super::pool::{ConnectionPool, Shared};

/// A connection that counts against the pool's ceiling and has not been
/// handed back yet
///
/// A lease ends in exactly one way: `release` puts the connection back,
/// `discard` closes it, `into_inner` gives it to the caller. A lease that
/// is simply dropped (a cancelled task, a panic) drops the connection and
/// frees its slot, so the pool never loses capacity to a vanished task.
pub(crate) struct Lease {
    shared: Arc<Shared>,
    conn: Option<Box<dyn Connection>>,
}

impl Lease {
    pub(super) fn new(shared: Arc<Shared>, conn: Box<dyn Connection>) -> Self {
        Self {
            shared,
            conn: Some(conn),
        }
    }

    pub(crate) fn conn(&mut self) -> &mut dyn Connection {
        self.conn.as_deref_mut().expect("lease already ended")
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.conn.as_ref().is_none_or(|conn| conn.is_closed())
    }

    pub(crate) fn describe(&self) -> String {
        self.conn
            .as_ref()
            .map(|conn| conn.describe())
            .unwrap_or_else(|| "<ended lease>".to_string())
    }

    /// The pool this lease was taken from
    pub(crate) fn pool(&self) -> ConnectionPool {
        ConnectionPool {
            shared: self.shared.clone(),
        }
    }

    /// Put the connection back into the idle queue
    pub(crate) fn release(mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.release(conn);
        }
    }

    /// Close the connection and free its slot, ignoring close errors
    pub(crate) async fn discard(mut self) {
        if let Some(conn) = self.conn.as_mut() {
            tracing::debug!(connection = %conn.describe(), "discarding connection");
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "ignoring error while closing connection");
            }
        }
        // Dropping the lease frees the slot
    }

    /// Hand the connection to the caller, who becomes responsible for it
    pub(crate) fn into_inner(mut self) -> Box<dyn Connection> {
        self.conn.take().expect("lease already ended")
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            self.shared.retire();
        }
    }
}
