//! Error type for all client-facing operations.

use std::time::Duration;

use thiserror::Error;

use worldsync_core::{LocalId, ProtocolError};

/// Everything that can go wrong in a public `Client` or `Connection`
/// operation.
///
/// `ConnectionLost` and `Framing` are fatal for the connection: the client
/// transitions to a disconnected state and rejects further network
/// operations until reconnected. `ReplyTimeout` is not fatal; `push` is
/// resumable. `NotMaterialized` and the `Unknown*` variants indicate caller
/// mistakes and leave all state untouched.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The TCP connection could not be opened.
    #[error("failed to connect to {addr}: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Strict handshake mode was requested and the server answered with an
    /// unexpected status code.
    #[error("handshake rejected: server answered status 0x{0:08X}")]
    Handshake(u32),

    /// The peer closed the stream or a read/write failed.
    #[error("connection lost")]
    ConnectionLost,

    /// The byte stream no longer frames correctly.
    #[error("framing error: {0}")]
    Framing(#[from] ProtocolError),

    /// No reply of the expected type arrived within the configured bound.
    #[error("no matching reply within {0:?}")]
    ReplyTimeout(Duration),

    /// The operation referenced an object that has no server id yet.
    #[error("object {0} has no server id yet; push first")]
    NotMaterialized(LocalId),

    /// No world is registered under this local id.
    #[error("unknown world {0}")]
    UnknownWorld(LocalId),

    /// The world exists but holds no model under this local id.
    #[error("unknown model {model} in world {world}")]
    UnknownModel { world: LocalId, model: LocalId },

    /// The requested parent handle does not refer to a model of the world.
    #[error("unknown parent model {0}")]
    UnknownParent(LocalId),
}
