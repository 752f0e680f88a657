//! Protocol module containing message types and the binary codec.

pub mod codec;
pub mod messages;

pub use codec::{decode_header, decode_message, encode_message, ProtocolError};
pub use messages::*;
