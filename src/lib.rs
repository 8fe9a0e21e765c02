//! Deployment discovery and connection management for MongoDB.
//!
//! This crate implements the two stateful cores of a MongoDB driver: the
//! topology description state machine, which folds isMaster handshake results
//! from individual servers into a consistent view of the whole deployment, and
//! the per-server connection pool, which hands out reusable transport
//! connections under a bounded size with fair waiting and generation-based
//! invalidation.
//!
//! Wire-protocol encoding, CRUD operations, authentication and server
//! selection live in the layers above; they consume the topology snapshots and
//! the pools exposed here.
extern crate bson;
extern crate bufstream;
extern crate chrono;

pub mod apm;
pub mod connstring;
pub mod error;
pub mod pool;
pub mod stream;
pub mod topology;

pub use error::{Error, Result};

pub const DRIVER_NAME: &'static str = "mongodb-core";
