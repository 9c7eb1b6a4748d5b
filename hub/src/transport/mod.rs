//! Network side of the hub
//!
//! This module handles:
//! - Binding the listener and advertising the service
//! - Accepting companion connections and assigning device ids
//! - Per-connection receive loops and lifecycle tracking
//! - Idempotent teardown of failed or cancelled connections

mod beacon;
mod connection;
mod listener;
mod manager;

pub use beacon::run_beacon;
pub use connection::{ConnectionEvent, ConnectionState, DeviceConnection};
pub use listener::{Accepted, Listener};
pub use manager::ConnectionManager;
