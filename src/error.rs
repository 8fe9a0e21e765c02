//! Error types shared across the topology and pool modules.
use connstring::Host;

use std::{error, fmt, io, sync};

/// A type alias for results returned by this crate.
pub type Result<T> = ::std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// An invalid argument was supplied during construction or configuration.
    ArgumentError(String),
    /// An operation could not be completed in the current topology or pool state.
    OperationError(String),
    /// A connection checkout was attempted against a closed pool.
    PoolClosedError(Host),
    /// No connection became available within the configured wait-queue timeout.
    WaitQueueTimeoutError(Host),
    /// A connection was checked into a pool that does not own it.
    ForeignConnectionError(Host),
    /// A server reported a wire-version range this driver does not support.
    IncompatibleError(String),
    /// An underlying transport error.
    IoError(io::Error),
    /// An internal lock was poisoned by a panicking thread.
    PoisonLockError,
    /// A catch-all for miscellaneous errors.
    DefaultError(String),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::IoError(err)
    }
}

impl<T> From<sync::PoisonError<T>> for Error {
    fn from(_: sync::PoisonError<T>) -> Error {
        Error::PoisonLockError
    }
}

impl<'a> From<&'a str> for Error {
    fn from(s: &str) -> Error {
        Error::DefaultError(s.to_owned())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Error {
        Error::DefaultError(s)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::ArgumentError(ref inner) => inner.fmt(fmt),
            Error::OperationError(ref inner) => inner.fmt(fmt),
            Error::PoolClosedError(ref host) => {
                write!(fmt, "The connection pool for {} is closed.", host)
            }
            Error::WaitQueueTimeoutError(ref host) => {
                write!(fmt,
                       "Timed out while waiting to check out a connection from the pool for {}.",
                       host)
            }
            Error::ForeignConnectionError(ref host) => {
                write!(fmt,
                       "The connection checked into the pool for {} belongs to another pool.",
                       host)
            }
            Error::IncompatibleError(ref inner) => inner.fmt(fmt),
            Error::IoError(ref inner) => inner.fmt(fmt),
            Error::PoisonLockError => write!(fmt, "Internal lock poisoned."),
            Error::DefaultError(ref inner) => inner.fmt(fmt),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IoError(ref inner) => Some(inner),
            _ => None,
        }
    }
}
