//! A model: one node in a world's object tree.

use std::collections::BTreeMap;

use crate::domain::ids::{LocalId, ServerId};
use crate::domain::property::Property;
use crate::domain::registry::Registered;
use crate::domain::token::Token;

/// A mirrored simulation object.
///
/// Models are owned by their world's registry; the `world` and `parent`
/// fields are handles into that registry, never pointers. A model's parent,
/// if present, always belongs to the same world (enforced by
/// [`crate::domain::world::World::create_model`]).
pub struct Model {
    local_id: LocalId,
    server_id: ServerId,
    token: Token,
    world: LocalId,
    parent: Option<LocalId>,
    /// Property map keyed by type tag; at most one value per tag, last
    /// write wins. A `BTreeMap` keeps upload order deterministic.
    props: BTreeMap<u32, Property>,
}

impl Model {
    pub fn new(local_id: LocalId, world: LocalId, parent: Option<LocalId>, token: Token) -> Self {
        Self {
            local_id,
            server_id: ServerId::UNASSIGNED,
            token,
            world,
            parent,
            props: BTreeMap::new(),
        }
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    /// Handle of the owning world.
    pub fn world(&self) -> LocalId {
        self.world
    }

    /// Handle of the parent model within the same world, if any.
    pub fn parent(&self) -> Option<LocalId> {
        self.parent
    }

    /// Stores a property value, replacing any previous value under the
    /// same tag. The bytes are copied verbatim and never interpreted.
    pub fn set_property(&mut self, tag: u32, data: impl Into<Vec<u8>>) {
        self.props.insert(tag, Property::new(tag, data));
    }

    /// Read-only accessor for a property's raw bytes.
    pub fn property(&self, tag: u32) -> Option<&[u8]> {
        self.props.get(&tag).map(Property::data)
    }

    /// All stored properties, in ascending tag order.
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.props.values()
    }

    pub fn property_count(&self) -> usize {
        self.props.len()
    }
}

impl Registered for Model {
    fn local_id(&self) -> LocalId {
        self.local_id
    }

    fn server_id(&self) -> ServerId {
        self.server_id
    }

    fn set_server_id(&mut self, id: ServerId) {
        self.server_id = id;
    }

    fn name(&self) -> &str {
        self.token.name()
    }
}
