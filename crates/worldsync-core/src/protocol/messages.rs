//! All worldsync protocol message types.
//!
//! Every message on the wire is an 8-byte header (`{type: u32,
//! payload_len: u32}`, big-endian) followed by `payload_len` opaque payload
//! bytes. Payload layouts are defined per message type in the codec; this
//! module defines the typed Rust representations.

use serde::{Deserialize, Serialize};

use crate::domain::ids::ServerId;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Total size of the common message header in bytes: type (4) + payload_len (4).
pub const HEADER_SIZE: usize = 8;

/// Sanity cap on a single payload. A header declaring more than this is
/// treated as malformed rather than allocated.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Maximum length of the server's greeting banner, including the NUL.
pub const GREETING_MAX: usize = 100;

/// Magic code the client writes after reading the server banner ("WSN1").
pub const CLIENT_GREETING: u32 = 0x5753_4E31;

/// Status code the server answers with when it accepts the client greeting
/// ("WSA1").
pub const GREETING_ACK: u32 = 0x5753_4131;

/// Fixed size of the NUL-padded server identification string in the
/// connect reply.
pub const ID_STRING_LEN: usize = 64;

/// Total size of the connect reply record:
/// status (4) + id_string (64) + three version fields (12).
pub const CONNECT_REPLY_LEN: usize = 80;

// ── Message type codes ────────────────────────────────────────────────────────

/// All message type codes defined by the protocol.
///
/// Tags are grouped by the scope of the addressed object: world lifecycle
/// in 0x0X, model lifecycle in 0x1X, property traffic in 0x2X and
/// subscription control in 0x3X.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum MessageType {
    WorldCreate = 0x01,
    WorldCreateReply = 0x02,
    WorldDestroy = 0x03,
    ModelCreate = 0x10,
    ModelCreateReply = 0x11,
    ModelDestroy = 0x12,
    ModelProperty = 0x20,
    Subscribe = 0x30,
    Unsubscribe = 0x31,
}

impl TryFrom<u32> for MessageType {
    type Error = ();

    fn try_from(value: u32) -> Result<Self, ()> {
        match value {
            0x01 => Ok(MessageType::WorldCreate),
            0x02 => Ok(MessageType::WorldCreateReply),
            0x03 => Ok(MessageType::WorldDestroy),
            0x10 => Ok(MessageType::ModelCreate),
            0x11 => Ok(MessageType::ModelCreateReply),
            0x12 => Ok(MessageType::ModelDestroy),
            0x20 => Ok(MessageType::ModelProperty),
            0x30 => Ok(MessageType::Subscribe),
            0x31 => Ok(MessageType::Unsubscribe),
            _ => Err(()),
        }
    }
}

// ── Common frame header ───────────────────────────────────────────────────────

/// Decoded form of the 8-byte header prepended to every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Identifies the payload type.
    pub message_type: MessageType,
    /// Length of the payload in bytes (not including this header).
    pub payload_len: usize,
}

// ── Per-message payload structs ───────────────────────────────────────────────

/// WORLD_CREATE (0x01): ask the server to materialize a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldCreateMessage {
    /// Human-readable world name, echoed back in server logs.
    pub token: String,
    /// Pixels per meter for the server-side raster.
    pub ppm: f64,
    /// Simulated time advanced per server step, in seconds.
    pub interval_sim: f64,
    /// Real time the server waits per step, in seconds.
    pub interval_real: f64,
}

/// MODEL_CREATE (0x10): ask the server to materialize a model inside an
/// already-materialized world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelCreateMessage {
    /// Server id of the owning world.
    pub world: ServerId,
    /// Human-readable model name.
    pub token: String,
}

/// MODEL_DESTROY (0x12): fire-and-forget teardown of one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelDestroyMessage {
    pub world: ServerId,
    pub model: ServerId,
}

/// MODEL_PROPERTY (0x20): one opaque, type-tagged property blob, flowing in
/// either direction (upload on set, download on subscription updates).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelPropertyMessage {
    pub world: ServerId,
    pub model: ServerId,
    /// Property type tag; see [`crate::domain::property::tags`].
    pub tag: u32,
    /// Raw property bytes, never interpreted by this layer.
    pub data: Vec<u8>,
}

/// SUBSCRIBE (0x30): ask the server to stream a property back periodically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeMessage {
    pub world: ServerId,
    pub model: ServerId,
    pub tag: u32,
    /// Streaming interval in seconds; 0 means "every update".
    pub interval: f64,
}

/// UNSUBSCRIBE (0x31): stop streaming a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsubscribeMessage {
    pub world: ServerId,
    pub model: ServerId,
    pub tag: u32,
}

// ── Handshake reply ───────────────────────────────────────────────────────────

/// The structured reply the server sends after receiving [`CLIENT_GREETING`].
///
/// Not a framed message: it is a fixed 80-byte record read once during the
/// handshake, before framed traffic begins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectReply {
    /// Expected to be [`GREETING_ACK`]; anything else is reported as a
    /// recoverable warning.
    pub status: u32,
    /// Server identification string (NUL padding stripped).
    pub id_string: String,
    pub version_major: u32,
    pub version_minor: u32,
    pub version_micro: u32,
}

// ── Top-level message enum ────────────────────────────────────────────────────

/// All valid worldsync messages, discriminated by type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncMessage {
    WorldCreate(WorldCreateMessage),
    WorldCreateReply(ServerId),
    WorldDestroy(ServerId),
    ModelCreate(ModelCreateMessage),
    ModelCreateReply(ServerId),
    ModelDestroy(ModelDestroyMessage),
    ModelProperty(ModelPropertyMessage),
    Subscribe(SubscribeMessage),
    Unsubscribe(UnsubscribeMessage),
}

impl SyncMessage {
    /// Returns the [`MessageType`] discriminant for this message.
    pub fn message_type(&self) -> MessageType {
        match self {
            SyncMessage::WorldCreate(_) => MessageType::WorldCreate,
            SyncMessage::WorldCreateReply(_) => MessageType::WorldCreateReply,
            SyncMessage::WorldDestroy(_) => MessageType::WorldDestroy,
            SyncMessage::ModelCreate(_) => MessageType::ModelCreate,
            SyncMessage::ModelCreateReply(_) => MessageType::ModelCreateReply,
            SyncMessage::ModelDestroy(_) => MessageType::ModelDestroy,
            SyncMessage::ModelProperty(_) => MessageType::ModelProperty,
            SyncMessage::Subscribe(_) => MessageType::Subscribe,
            SyncMessage::Unsubscribe(_) => MessageType::Unsubscribe,
        }
    }
}
