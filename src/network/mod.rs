//! Network Module
//!
//! Blocking TCP front end for the store.
//!
//! One acceptor thread polls a non-blocking listener so it can notice a
//! shutdown request. Accepted sockets go through a bounded channel to a
//! fixed pool of `max_connections` workers, each serving one client at a
//! time through `Connection`.

mod client;
mod connection;
mod server;

pub use client::Client;
pub use connection::Connection;
pub use server::{Server, ShutdownHandle};
