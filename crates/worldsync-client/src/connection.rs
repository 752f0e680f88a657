//! TCP connection to the simulation server.
//!
//! Owns one `std::net::TcpStream` plus a growable read buffer. Writes are
//! blocking full writes; reads are polled: [`Connection::try_read`] drains
//! whatever bytes the socket has ready and returns a message only once a
//! complete frame has accumulated, so the caller's event loop never stalls
//! on a slow server.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use worldsync_core::protocol::codec::{
    decode_connect_reply, decode_header, decode_message, encode_message,
};
use worldsync_core::protocol::messages::{
    CLIENT_GREETING, CONNECT_REPLY_LEN, GREETING_ACK, GREETING_MAX, HEADER_SIZE,
};
use worldsync_core::SyncMessage;

use crate::config::ClientConfig;
use crate::error::ClientError;

/// What the server told us about itself during the handshake.
#[derive(Debug, Clone)]
pub struct ServerInfo {
    /// Free-form greeting banner, informational only.
    pub banner: String,
    /// Server identification string from the connect reply.
    pub id_string: String,
    /// Server version as (major, minor, micro).
    pub version: (u32, u32, u32),
    /// `false` when the server answered the greeting with an unexpected
    /// status code and lenient mode let the connection proceed anyway.
    pub greeting_acknowledged: bool,
}

/// One established, handshake-complete stream to the server.
pub struct Connection {
    stream: TcpStream,
    rx_buf: Vec<u8>,
    poll_interval: Duration,
    /// Set once the peer closes its end; frames already buffered are still
    /// delivered before the loss is reported.
    closed: bool,
}

impl Connection {
    /// Connects to the configured server and performs the greeting
    /// handshake: read the server banner, write the client greeting code,
    /// read the 80-byte connect reply.
    ///
    /// A reply status other than the expected acknowledgement is lenient by
    /// default: it is logged as a warning and surfaced through
    /// [`ServerInfo::greeting_acknowledged`]. With `strict_handshake` set
    /// in the config it fails with [`ClientError::Handshake`] instead.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectFailed`] if the socket cannot be opened,
    /// [`ClientError::ConnectionLost`] if the peer drops mid-handshake.
    pub fn establish(config: &ClientConfig) -> Result<(Self, ServerInfo), ClientError> {
        let addr = format!("{}:{}", config.host, config.port);
        let stream = TcpStream::connect(&addr).map_err(|source| ClientError::ConnectFailed {
            addr: addr.clone(),
            source,
        })?;
        stream
            .set_nodelay(true)
            .map_err(|source| ClientError::ConnectFailed {
                addr: addr.clone(),
                source,
            })?;

        // Bound the handshake so a silent server cannot hang us forever.
        stream
            .set_read_timeout(Some(config.reply_timeout()))
            .map_err(|_| ClientError::ConnectionLost)?;

        let banner = read_banner(&stream)?;
        debug!(%banner, "server banner received");

        (&stream)
            .write_all(&CLIENT_GREETING.to_be_bytes())
            .map_err(|_| ClientError::ConnectionLost)?;

        let mut reply_bytes = [0u8; CONNECT_REPLY_LEN];
        (&stream)
            .read_exact(&mut reply_bytes)
            .map_err(|_| ClientError::ConnectionLost)?;
        let reply = decode_connect_reply(&reply_bytes)?;

        let greeting_acknowledged = reply.status == GREETING_ACK;
        if !greeting_acknowledged {
            if config.strict_handshake {
                return Err(ClientError::Handshake(reply.status));
            }
            warn!(
                status = format_args!("0x{:08X}", reply.status),
                "server answered greeting with unexpected status; proceeding"
            );
        }

        stream
            .set_read_timeout(None)
            .map_err(|_| ClientError::ConnectionLost)?;

        info!(
            server = %reply.id_string,
            version = format_args!(
                "{}.{}.{}",
                reply.version_major, reply.version_minor, reply.version_micro
            ),
            %addr,
            "connected"
        );

        let info = ServerInfo {
            banner,
            id_string: reply.id_string,
            version: (reply.version_major, reply.version_minor, reply.version_micro),
            greeting_acknowledged,
        };
        let conn = Self {
            stream,
            rx_buf: Vec::new(),
            poll_interval: config.poll_interval(),
            closed: false,
        };
        Ok((conn, info))
    }

    /// Non-blocking poll: drains ready bytes into the read buffer and
    /// returns one decoded message if a complete frame has accumulated.
    ///
    /// Frames that arrived ahead of a peer close are still delivered; the
    /// loss is reported only once no complete frame remains buffered.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionLost`] when the peer has closed the stream
    /// and the buffer holds no further complete frame,
    /// [`ClientError::Framing`] when the buffered bytes no longer frame
    /// correctly (fatal for this connection).
    pub fn try_read(&mut self) -> Result<Option<SyncMessage>, ClientError> {
        self.fill_buffer()?;

        if self.rx_buf.len() >= HEADER_SIZE {
            let header = decode_header(&self.rx_buf)?;
            if self.rx_buf.len() >= HEADER_SIZE + header.payload_len {
                let (msg, consumed) = decode_message(&self.rx_buf)?;
                self.rx_buf.drain(..consumed);
                debug!(kind = ?msg.message_type(), "message received");
                return Ok(Some(msg));
            }
        }

        if self.closed {
            // A trailing partial frame can never complete now.
            return Err(ClientError::ConnectionLost);
        }
        Ok(None)
    }

    /// Polls [`try_read`](Self::try_read) until a message arrives or
    /// `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`ClientError::ReplyTimeout`] when nothing arrived in time, plus
    /// everything `try_read` can fail with.
    pub fn read_blocking(&mut self, timeout: Duration) -> Result<SyncMessage, ClientError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(msg) = self.try_read()? {
                return Ok(msg);
            }
            if Instant::now() >= deadline {
                return Err(ClientError::ReplyTimeout(timeout));
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    /// Blocking full write of one encoded message.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionLost`] on a short or failed write.
    pub fn write(&mut self, msg: &SyncMessage) -> Result<(), ClientError> {
        let bytes = encode_message(msg)?;
        self.stream
            .write_all(&bytes)
            .map_err(|_| ClientError::ConnectionLost)?;
        debug!(kind = ?msg.message_type(), len = bytes.len(), "message sent");
        Ok(())
    }

    /// Reads everything the socket has ready without blocking. A peer close
    /// is recorded in `closed` rather than reported here, so frames that
    /// were received ahead of the close can still be drained by the caller.
    fn fill_buffer(&mut self) -> Result<(), ClientError> {
        if self.closed {
            return Ok(());
        }
        self.stream
            .set_nonblocking(true)
            .map_err(|_| ClientError::ConnectionLost)?;

        let mut chunk = [0u8; 4096];
        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => {
                    self.closed = true;
                    break;
                }
            }
        }

        // Restore blocking mode for writes regardless of the read outcome.
        self.stream
            .set_nonblocking(false)
            .map_err(|_| ClientError::ConnectionLost)?;
        Ok(())
    }
}

/// Reads the NUL-terminated server banner, at most [`GREETING_MAX`] bytes.
fn read_banner(mut stream: &TcpStream) -> Result<String, ClientError> {
    let mut banner = Vec::with_capacity(GREETING_MAX);
    let mut byte = [0u8; 1];
    while banner.len() < GREETING_MAX {
        stream
            .read_exact(&mut byte)
            .map_err(|_| ClientError::ConnectionLost)?;
        if byte[0] == 0 {
            break;
        }
        banner.push(byte[0]);
    }
    Ok(String::from_utf8_lossy(&banner).into_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
