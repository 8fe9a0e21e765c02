//! Monitoring events for pool and connection lifecycles.
mod event;
mod listener;

pub use self::event::{CheckOutFailedReason, ConnectionClosedReason, Event};
pub use self::listener::{EventHook, Listener};
