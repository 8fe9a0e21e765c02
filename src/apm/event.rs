//! Pool and connection lifecycle events.
use connstring::Host;

use std::fmt;

/// Why a connection was destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionClosedReason {
    /// The connection belonged to an older pool generation.
    Stale,
    /// The connection sat unused past the idle limit.
    Idle,
    /// The connection could not be established or encountered an error.
    Error,
    /// The owning pool was closed.
    PoolClosed,
}

/// Why a checkout attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutFailedReason {
    PoolClosed,
    Timeout,
}

/// An event emitted by a connection pool.
#[derive(Debug, Clone)]
pub enum Event {
    PoolCreated { address: Host },
    PoolCleared { address: Host, generation: usize },
    PoolClosed { address: Host },
    ConnectionCreated { address: Host, connection_id: usize },
    ConnectionReady { address: Host, connection_id: usize },
    ConnectionClosed {
        address: Host,
        connection_id: usize,
        reason: ConnectionClosedReason,
    },
    CheckOutStarted { address: Host },
    CheckOutFailed {
        address: Host,
        reason: CheckOutFailedReason,
    },
    ConnectionCheckedOut { address: Host, connection_id: usize },
    ConnectionCheckedIn { address: Host, connection_id: usize },
}

impl Event {
    /// The address of the pool that emitted this event.
    pub fn address(&self) -> &Host {
        match *self {
            Event::PoolCreated { ref address } |
            Event::PoolCleared { ref address, .. } |
            Event::PoolClosed { ref address } |
            Event::ConnectionCreated { ref address, .. } |
            Event::ConnectionReady { ref address, .. } |
            Event::ConnectionClosed { ref address, .. } |
            Event::CheckOutStarted { ref address } |
            Event::CheckOutFailed { ref address, .. } |
            Event::ConnectionCheckedOut { ref address, .. } |
            Event::ConnectionCheckedIn { ref address, .. } => address,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Event::PoolCreated { ref address } => write!(fmt, "Pool for {} created.", address),
            Event::PoolCleared { ref address, generation } => {
                write!(fmt, "Pool for {} cleared; now on generation {}.", address, generation)
            }
            Event::PoolClosed { ref address } => write!(fmt, "Pool for {} closed.", address),
            Event::ConnectionCreated { ref address, connection_id } => {
                write!(fmt, "Connection {} to {} created.", connection_id, address)
            }
            Event::ConnectionReady { ref address, connection_id } => {
                write!(fmt, "Connection {} to {} ready.", connection_id, address)
            }
            Event::ConnectionClosed { ref address, connection_id, reason } => {
                write!(fmt,
                       "Connection {} to {} closed ({:?}).",
                       connection_id,
                       address,
                       reason)
            }
            Event::CheckOutStarted { ref address } => {
                write!(fmt, "Check out from pool for {} started.", address)
            }
            Event::CheckOutFailed { ref address, reason } => {
                write!(fmt, "Check out from pool for {} failed ({:?}).", address, reason)
            }
            Event::ConnectionCheckedOut { ref address, connection_id } => {
                write!(fmt, "Connection {} to {} checked out.", connection_id, address)
            }
            Event::ConnectionCheckedIn { ref address, connection_id } => {
                write!(fmt, "Connection {} to {} checked in.", connection_id, address)
            }
        }
    }
}
