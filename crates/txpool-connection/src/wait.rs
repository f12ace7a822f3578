//! Cooperative waiting on driver I/O
//!
//! A driver that talks to the server over a non-blocking socket reports its
//! progress through `Pollable::poll`. The `WaitCallback` configured on a pool
//! drives that state machine: whenever the driver needs the socket to become
//! readable or writable, the current task is parked on the runtime's reactor
//! instead of blocking the thread, so other tasks keep running.
//!
//! Every pool owns its own callback and hands it to the connection factory,
//! which installs it on each connection it creates.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use txpool_core::{PollState, Pollable, RawFd, Result, TxpoolError};


/// Drives a pending driver operation to completion without blocking the thread
#[async_trait]
pub trait WaitCallback: Send + Sync + fmt::Debug {
    /// Poll `conn` until its pending operation is complete
    async fn wait(&self, conn: &mut dyn Pollable) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Readable,
    Writable,
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Readable => f.write_str("readable"),
            Readiness::Writable => f.write_str("writable"),
        }
    }
}

/// Waits on socket readiness through the tokio reactor
///
/// Each wait may be bounded by a timeout; exceeding it fails the wait with
/// `TxpoolError::Timeout` and leaves the driver operation pending.
#[derive(Debug, Clone, Default)]
pub struct SocketWaiter {
    timeout: Option<Duration>,
}

impl SocketWaiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every individual readiness wait by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn wait_for(&self, fd: RawFd, readiness: Readiness) -> Result<()> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait_fd(fd, readiness))
                .await
                .map_err(|_| {
                    TxpoolError::Timeout(format!(
                        "socket {} not {} within {:?}",
                        fd, readiness, limit
                    ))
                })?,
            None => wait_fd(fd, readiness).await,
        }
    }
}

#[async_trait]
impl WaitCallback for SocketWaiter {
    async fn wait(&self, conn: &mut dyn Pollable) -> Result<()> {
        loop {
            let state = conn.poll()?;
            tracing::trace!(fd = conn.fileno(), state = %state, "polled connection");
            match state {
                PollState::Ready => return Ok(()),
                PollState::WantRead => self.wait_for(conn.fileno(), Readiness::Readable).await?,
                PollState::WantWrite => self.wait_for(conn.fileno(), Readiness::Writable).await?,
                PollState::Unrecognized(code) => {
                    return Err(TxpoolError::Protocol(format!(
                        "bad result from poll: {}",
                        code
                    )));
                }
            }
        }
    }
}

/// A descriptor owned by the driver; registering it never closes it
#[cfg(unix)]
struct DriverSocket(RawFd);

#[cfg(unix)]
impl std::os::unix::io::AsRawFd for DriverSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

#[cfg(unix)]
async fn wait_fd(fd: RawFd, readiness: Readiness) -> Result<()> {
    use tokio::io::Interest;
    use tokio::io::unix::AsyncFd;

    let interest = match readiness {
        Readiness::Readable => Interest::READABLE,
        Readiness::Writable => Interest::WRITABLE,
    };
    // SAFETY: a driver keeps `fileno` open while an operation is pending, and
    // the registration is dropped before this wait returns.
    let registered = unsafe { AsyncFd::register_with_interest(DriverSocket(fd), interest) }
        .map_err(|e| e.into_parts().1)?;
    match readiness {
        Readiness::Readable => registered.readable().await.map(|_| ())?,
        Readiness::Writable => registered.writable().await.map(|_| ())?,
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_fd(fd: RawFd, readiness: Readiness) -> Result<()> {
    Err(TxpoolError::Other(format!(
        "cannot wait for socket {} to become {} on this platform",
        fd, readiness
    )))
}
