//! # worldsync-client
//!
//! The synchronization client: mirrors a locally-built tree of worlds and
//! models to a remote simulation server over one persistent TCP connection.
//!
//! The embedding application creates a [`Client`], connects it, builds
//! worlds and models locally (local ids are assigned immediately), then
//! calls [`Client::push`] to materialize them remotely. Afterwards it
//! streams property changes with [`Client::set_property`] and drains
//! inbound traffic with [`Client::poll`] from its own event loop.
//!
//! All I/O is two-moded: writes block until the full message is on the
//! wire, reads are polled so the caller can interleave synchronization with
//! other work on a single thread.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;

pub use client::{Client, ClientEvent, ConnectionState};
pub use config::{ClientConfig, ConfigError};
pub use connection::{Connection, ServerInfo};
pub use error::ClientError;
