//! Binary codec for encoding and decoding worldsync protocol messages.
//!
//! Wire format:
//! ```text
//! [type:4][payload_len:4][payload:N]
//! ```
//! Total header size: 8 bytes. All multi-byte integers are big-endian.
//!
//! The codec validates structure only; it never interprets property payload
//! bytes. Interpretation is the addressed object's concern.

use thiserror::Error;

use crate::domain::ids::ServerId;
use crate::protocol::messages::{
    ConnectReply, FrameHeader, MessageType, ModelCreateMessage, ModelDestroyMessage,
    ModelPropertyMessage, SubscribeMessage, SyncMessage, UnsubscribeMessage, WorldCreateMessage,
    CONNECT_REPLY_LEN, HEADER_SIZE, ID_STRING_LEN, MAX_PAYLOAD_LEN,
};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The message type field in the header is not a recognized value.
    #[error("unknown message type: 0x{0:02X}")]
    UnknownMessageType(u32),

    /// The payload could not be parsed (field out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The header declares a payload larger than the sanity cap.
    #[error("declared payload of {0} bytes exceeds maximum")]
    PayloadTooLarge(usize),

    /// A string field does not fit the 16-bit wire length prefix.
    #[error("string of {0} bytes exceeds the u16 length prefix")]
    StringTooLong(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`SyncMessage`] into a byte vector including the 8-byte header.
///
/// # Errors
///
/// Returns [`ProtocolError::StringTooLong`] when a token does not fit the
/// wire format's 16-bit string length prefix.
pub fn encode_message(msg: &SyncMessage) -> Result<Vec<u8>, ProtocolError> {
    let payload = encode_payload(msg)?;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.extend_from_slice(&(msg.message_type() as u32).to_be_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

/// Decodes and validates the 8-byte header at the beginning of `bytes`.
///
/// Used by the connection layer to learn how many payload bytes it still
/// has to accumulate before [`decode_message`] can succeed.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than 8 bytes are
/// available, and [`ProtocolError::UnknownMessageType`] /
/// [`ProtocolError::PayloadTooLarge`] for invalid header fields.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let raw_type = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let message_type =
        MessageType::try_from(raw_type).map_err(|_| ProtocolError::UnknownMessageType(raw_type))?;

    let payload_len = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }

    Ok(FrameHeader {
        message_type,
        payload_len,
    })
}

/// Decodes one [`SyncMessage`] from the beginning of `bytes`.
///
/// Returns the decoded message and the total number of bytes consumed
/// (header + payload), so the caller can advance their read cursor.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed or incomplete.
pub fn decode_message(bytes: &[u8]) -> Result<(SyncMessage, usize), ProtocolError> {
    let header = decode_header(bytes)?;

    let total_needed = HEADER_SIZE + header.payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: header.payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }

    let payload = &bytes[HEADER_SIZE..total_needed];
    let msg = decode_payload(header.message_type, payload)?;
    Ok((msg, total_needed))
}

// ── Payload encoding ──────────────────────────────────────────────────────────

fn encode_payload(msg: &SyncMessage) -> Result<Vec<u8>, ProtocolError> {
    let mut buf = Vec::new();
    match msg {
        SyncMessage::WorldCreate(m) => encode_world_create(&mut buf, m)?,
        SyncMessage::WorldCreateReply(id) => buf.extend_from_slice(&id.raw().to_be_bytes()),
        SyncMessage::WorldDestroy(id) => buf.extend_from_slice(&id.raw().to_be_bytes()),
        SyncMessage::ModelCreate(m) => encode_model_create(&mut buf, m)?,
        SyncMessage::ModelCreateReply(id) => buf.extend_from_slice(&id.raw().to_be_bytes()),
        SyncMessage::ModelDestroy(m) => {
            buf.extend_from_slice(&m.world.raw().to_be_bytes());
            buf.extend_from_slice(&m.model.raw().to_be_bytes());
        }
        SyncMessage::ModelProperty(m) => encode_model_property(&mut buf, m),
        SyncMessage::Subscribe(m) => encode_subscribe(&mut buf, m),
        SyncMessage::Unsubscribe(m) => {
            buf.extend_from_slice(&m.world.raw().to_be_bytes());
            buf.extend_from_slice(&m.model.raw().to_be_bytes());
            buf.extend_from_slice(&m.tag.to_be_bytes());
        }
    }
    Ok(buf)
}

fn encode_world_create(buf: &mut Vec<u8>, m: &WorldCreateMessage) -> Result<(), ProtocolError> {
    write_length_prefixed_string(buf, &m.token)?;
    buf.extend_from_slice(&m.ppm.to_be_bytes());
    buf.extend_from_slice(&m.interval_sim.to_be_bytes());
    buf.extend_from_slice(&m.interval_real.to_be_bytes());
    Ok(())
}

fn encode_model_create(buf: &mut Vec<u8>, m: &ModelCreateMessage) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&m.world.raw().to_be_bytes());
    write_length_prefixed_string(buf, &m.token)
}

fn encode_model_property(buf: &mut Vec<u8>, m: &ModelPropertyMessage) {
    buf.extend_from_slice(&m.world.raw().to_be_bytes());
    buf.extend_from_slice(&m.model.raw().to_be_bytes());
    buf.extend_from_slice(&m.tag.to_be_bytes());
    buf.extend_from_slice(&(m.data.len() as u32).to_be_bytes());
    buf.extend_from_slice(&m.data);
}

fn encode_subscribe(buf: &mut Vec<u8>, m: &SubscribeMessage) {
    buf.extend_from_slice(&m.world.raw().to_be_bytes());
    buf.extend_from_slice(&m.model.raw().to_be_bytes());
    buf.extend_from_slice(&m.tag.to_be_bytes());
    buf.extend_from_slice(&m.interval.to_be_bytes());
}

// ── Payload decoding ──────────────────────────────────────────────────────────

fn decode_payload(msg_type: MessageType, payload: &[u8]) -> Result<SyncMessage, ProtocolError> {
    match msg_type {
        MessageType::WorldCreate => decode_world_create(payload).map(SyncMessage::WorldCreate),
        MessageType::WorldCreateReply => {
            read_server_id(payload, 0, "WorldCreateReply").map(SyncMessage::WorldCreateReply)
        }
        MessageType::WorldDestroy => {
            read_server_id(payload, 0, "WorldDestroy").map(SyncMessage::WorldDestroy)
        }
        MessageType::ModelCreate => decode_model_create(payload).map(SyncMessage::ModelCreate),
        MessageType::ModelCreateReply => {
            read_server_id(payload, 0, "ModelCreateReply").map(SyncMessage::ModelCreateReply)
        }
        MessageType::ModelDestroy => {
            require_len(payload, 8, "ModelDestroy")?;
            Ok(SyncMessage::ModelDestroy(ModelDestroyMessage {
                world: read_server_id(payload, 0, "ModelDestroy")?,
                model: read_server_id(payload, 4, "ModelDestroy")?,
            }))
        }
        MessageType::ModelProperty => {
            decode_model_property(payload).map(SyncMessage::ModelProperty)
        }
        MessageType::Subscribe => decode_subscribe(payload).map(SyncMessage::Subscribe),
        MessageType::Unsubscribe => {
            require_len(payload, 12, "Unsubscribe")?;
            Ok(SyncMessage::Unsubscribe(UnsubscribeMessage {
                world: read_server_id(payload, 0, "Unsubscribe")?,
                model: read_server_id(payload, 4, "Unsubscribe")?,
                tag: read_u32(payload, 8, "Unsubscribe")?,
            }))
        }
    }
}

fn decode_world_create(p: &[u8]) -> Result<WorldCreateMessage, ProtocolError> {
    // 2 (token_len) + token + 3 * 8 (f64 parameters)
    let (token, end) = read_length_prefixed_string(p, 0)?;
    require_len(p, end + 24, "WorldCreate")?;
    Ok(WorldCreateMessage {
        token,
        ppm: read_f64(p, end)?,
        interval_sim: read_f64(p, end + 8)?,
        interval_real: read_f64(p, end + 16)?,
    })
}

fn decode_model_create(p: &[u8]) -> Result<ModelCreateMessage, ProtocolError> {
    require_len(p, 6, "ModelCreate")?;
    let world = read_server_id(p, 0, "ModelCreate")?;
    let (token, _) = read_length_prefixed_string(p, 4)?;
    Ok(ModelCreateMessage { world, token })
}

fn decode_model_property(p: &[u8]) -> Result<ModelPropertyMessage, ProtocolError> {
    // 4 (world) + 4 (model) + 4 (tag) + 4 (data_len) + data
    require_len(p, 16, "ModelProperty")?;
    let world = read_server_id(p, 0, "ModelProperty")?;
    let model = read_server_id(p, 4, "ModelProperty")?;
    let tag = read_u32(p, 8, "ModelProperty")?;
    let data_len = read_u32(p, 12, "ModelProperty")? as usize;
    require_len(p, 16 + data_len, "ModelProperty.data")?;
    let data = p[16..16 + data_len].to_vec();
    Ok(ModelPropertyMessage {
        world,
        model,
        tag,
        data,
    })
}

fn decode_subscribe(p: &[u8]) -> Result<SubscribeMessage, ProtocolError> {
    require_len(p, 20, "Subscribe")?;
    Ok(SubscribeMessage {
        world: read_server_id(p, 0, "Subscribe")?,
        model: read_server_id(p, 4, "Subscribe")?,
        tag: read_u32(p, 8, "Subscribe")?,
        interval: read_f64(p, 12)?,
    })
}

// ── Handshake records ─────────────────────────────────────────────────────────

/// Encodes the fixed 80-byte connect reply the server sends during the
/// handshake. Public so protocol test doubles can act as the server.
pub fn encode_connect_reply(reply: &ConnectReply) -> Vec<u8> {
    let mut buf = Vec::with_capacity(CONNECT_REPLY_LEN);
    buf.extend_from_slice(&reply.status.to_be_bytes());

    let mut id_bytes = [0u8; ID_STRING_LEN];
    let src = reply.id_string.as_bytes();
    let n = src.len().min(ID_STRING_LEN - 1); // always NUL-terminated
    id_bytes[..n].copy_from_slice(&src[..n]);
    buf.extend_from_slice(&id_bytes);

    buf.extend_from_slice(&reply.version_major.to_be_bytes());
    buf.extend_from_slice(&reply.version_minor.to_be_bytes());
    buf.extend_from_slice(&reply.version_micro.to_be_bytes());
    buf
}

/// Decodes the fixed 80-byte connect reply.
///
/// # Errors
///
/// Returns [`ProtocolError::InsufficientData`] when fewer than 80 bytes are
/// available, and [`ProtocolError::MalformedPayload`] when the id string is
/// not valid UTF-8.
pub fn decode_connect_reply(bytes: &[u8]) -> Result<ConnectReply, ProtocolError> {
    if bytes.len() < CONNECT_REPLY_LEN {
        return Err(ProtocolError::InsufficientData {
            needed: CONNECT_REPLY_LEN,
            available: bytes.len(),
        });
    }

    let status = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);

    let id_raw = &bytes[4..4 + ID_STRING_LEN];
    let id_end = id_raw.iter().position(|&b| b == 0).unwrap_or(ID_STRING_LEN);
    let id_string = std::str::from_utf8(&id_raw[..id_end])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid id string: {e}")))?
        .to_string();

    let v = 4 + ID_STRING_LEN;
    Ok(ConnectReply {
        status,
        id_string,
        version_major: u32::from_be_bytes([bytes[v], bytes[v + 1], bytes[v + 2], bytes[v + 3]]),
        version_minor: u32::from_be_bytes([
            bytes[v + 4],
            bytes[v + 5],
            bytes[v + 6],
            bytes[v + 7],
        ]),
        version_micro: u32::from_be_bytes([
            bytes[v + 8],
            bytes[v + 9],
            bytes[v + 10],
            bytes[v + 11],
        ]),
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize, context: &str) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        Err(ProtocolError::MalformedPayload(format!(
            "{context}: need {needed} bytes, got {}",
            buf.len()
        )))
    } else {
        Ok(())
    }
}

fn read_u32(buf: &[u8], offset: usize, context: &str) -> Result<u32, ProtocolError> {
    if buf.len() < offset + 4 {
        return Err(ProtocolError::MalformedPayload(format!(
            "{context}: need 4 bytes at offset {offset}, got {}",
            buf.len().saturating_sub(offset)
        )));
    }
    Ok(u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ]))
}

fn read_server_id(buf: &[u8], offset: usize, context: &str) -> Result<ServerId, ProtocolError> {
    read_u32(buf, offset, context).map(ServerId::new)
}

fn read_f64(buf: &[u8], offset: usize) -> Result<f64, ProtocolError> {
    if buf.len() < offset + 8 {
        return Err(ProtocolError::InsufficientData {
            needed: offset + 8,
            available: buf.len(),
        });
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&buf[offset..offset + 8]);
    Ok(f64::from_be_bytes(raw))
}

/// Writes a 2-byte length prefix followed by the UTF-8 string bytes.
/// Strings that do not fit the prefix are rejected rather than truncated,
/// since truncation at an arbitrary byte boundary can split a UTF-8
/// sequence and produce a payload the peer cannot decode.
fn write_length_prefixed_string(buf: &mut Vec<u8>, s: &str) -> Result<(), ProtocolError> {
    let bytes = s.as_bytes();
    if bytes.len() > u16::MAX as usize {
        return Err(ProtocolError::StringTooLong(bytes.len()));
    }
    buf.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

/// Reads a 2-byte length prefix and then that many UTF-8 bytes.
/// Returns the string and the offset of the byte after the string.
fn read_length_prefixed_string(
    buf: &[u8],
    offset: usize,
) -> Result<(String, usize), ProtocolError> {
    if buf.len() < offset + 2 {
        return Err(ProtocolError::MalformedPayload(format!(
            "need 2 bytes for string length at offset {offset}"
        )));
    }
    let len = u16::from_be_bytes([buf[offset], buf[offset + 1]]) as usize;
    let start = offset + 2;
    if buf.len() < start + len {
        return Err(ProtocolError::MalformedPayload(format!(
            "string of length {len} at offset {start} exceeds buffer"
        )));
    }
    let s = std::str::from_utf8(&buf[start..start + len])
        .map_err(|e| ProtocolError::MalformedPayload(format!("invalid UTF-8: {e}")))?
        .to_string();
    Ok((s, start + len))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
