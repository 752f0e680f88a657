//! Opaque, type-tagged property blobs.
//!
//! Properties are the unit of state exchanged for a model: a `u32` type tag
//! plus raw bytes. The synchronization layer copies payloads verbatim and
//! never interprets them; producing and consuming layers agree on the
//! meaning of each tag out of band.

use serde::{Deserialize, Serialize};

/// Well-known property type tags.
///
/// The tag space is open: any `u32` is a valid tag, these are merely the
/// ones the standard model implementations exchange.
pub mod tags {
    /// Planar pose: x, y, heading.
    pub const POSE: u32 = 0x01;
    /// Bounding-box size.
    pub const SIZE: u32 = 0x02;
    /// Rendering color.
    pub const COLOR: u32 = 0x03;
    /// Planar velocity.
    pub const VELOCITY: u32 = 0x04;
    /// Range-sensor sample block.
    pub const RANGER_DATA: u32 = 0x05;
}

/// One opaque property value: a type tag and its raw payload bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    tag: u32,
    data: Vec<u8>,
}

impl Property {
    pub fn new(tag: u32, data: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            data: data.into(),
        }
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_stores_bytes_verbatim() {
        let prop = Property::new(tags::POSE, vec![1, 2, 3]);
        assert_eq!(prop.tag(), tags::POSE);
        assert_eq!(prop.data(), &[1, 2, 3]);
        assert_eq!(prop.len(), 3);
    }

    #[test]
    fn test_empty_property_is_allowed() {
        let prop = Property::new(tags::COLOR, vec![]);
        assert!(prop.is_empty());
    }
}
