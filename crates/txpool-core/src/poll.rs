//! Non-blocking readiness protocol
//!
//! Drivers that speak to the server over a non-blocking socket report the
//! progress of an in-flight operation through `Pollable::poll`. The pool's
//! wait adapter drives this state machine, parking the task on socket
//! readiness whenever the driver asks for more I/O.

use std::fmt;

#[cfg(unix)]
pub use std::os::unix::io::RawFd;

#[cfg(not(unix))]
pub type RawFd = i32;

use crate::Result;

/// Progress reported by a driver for its current operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    /// The operation has completed
    Ready,
    /// The driver needs the socket to become readable
    WantRead,
    /// The driver needs the socket to become writable
    WantWrite,
    /// A state code the protocol does not define
    Unrecognized(i32),
}

impl PollState {
    /// Map a libpq-style poll code (0 = ok, 1 = read, 2 = write)
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PollState::Ready,
            1 => PollState::WantRead,
            2 => PollState::WantWrite,
            other => PollState::Unrecognized(other),
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollState::Ready => write!(f, "ready"),
            PollState::WantRead => write!(f, "want-read"),
            PollState::WantWrite => write!(f, "want-write"),
            PollState::Unrecognized(code) => write!(f, "unrecognized({})", code),
        }
    }
}

/// A driver object whose pending operation can be advanced by polling
pub trait Pollable: Send {
    /// Advance the pending operation as far as possible without blocking
    fn poll(&mut self) -> Result<PollState>;

    /// The socket descriptor the operation is waiting on
    ///
    /// The descriptor must stay open until the pending operation completes.
    fn fileno(&self) -> RawFd;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(PollState::from_code(0), PollState::Ready);
        assert_eq!(PollState::from_code(1), PollState::WantRead);
        assert_eq!(PollState::from_code(2), PollState::WantWrite);
        assert_eq!(PollState::from_code(3), PollState::Unrecognized(3));
        assert_eq!(PollState::from_code(-1), PollState::Unrecognized(-1));
    }

    #[test]
    fn test_display() {
        assert_eq!(PollState::WantWrite.to_string(), "want-write");
        assert_eq!(PollState::Unrecognized(7).to_string(), "unrecognized(7)");
    }
}
