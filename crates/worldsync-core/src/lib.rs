//! # worldsync-core
//!
//! Shared library for worldsync containing the network protocol codec and
//! the domain entities of the simulation mirror (identifiers, registries,
//! models and worlds).
//!
//! This crate is used by the client application and by protocol test
//! doubles. It has zero dependencies on OS APIs or network sockets.
//!
//! - **`protocol`** – how bytes travel over the wire. Messages are encoded
//!   into a compact binary format (8-byte header + payload) and decoded
//!   back into typed Rust structs on the other end.
//!
//! - **`domain`** – pure business logic with no infrastructure
//!   dependencies: the two-sided identifier space (local vs. server ids),
//!   the triple-indexed registry, and the World/Model object tree with its
//!   opaque property maps.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `worldsync_core::Registry` instead of `worldsync_core::domain::registry::Registry`.
pub use domain::ids::{IdCounter, LocalId, ServerId};
pub use domain::model::Model;
pub use domain::property::Property;
pub use domain::registry::{Registered, Registry};
pub use domain::token::Token;
pub use domain::world::World;
pub use protocol::codec::{decode_header, decode_message, encode_message, ProtocolError};
pub use protocol::messages::SyncMessage;
