//! A world: an owner of a set of models plus simulation parameters.

use thiserror::Error;
use tracing::debug;

use crate::domain::ids::{IdCounter, LocalId, ServerId};
use crate::domain::model::Model;
use crate::domain::registry::{Registered, Registry};
use crate::domain::token::Token;

/// Error type for world-scoped operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// The requested parent handle does not refer to a model of this world.
    #[error("parent model {0} does not belong to this world")]
    UnknownParent(LocalId),
}

/// One mirrored simulation world and its model tree.
pub struct World {
    local_id: LocalId,
    server_id: ServerId,
    token: Token,
    /// Pixels per meter for the server-side raster.
    ppm: f64,
    /// Simulated time advanced per server step, in seconds.
    interval_sim: f64,
    /// Real time the server waits per step, in seconds.
    interval_real: f64,
    models: Registry<Model>,
}

impl World {
    pub fn new(
        local_id: LocalId,
        token: Token,
        ppm: f64,
        interval_sim: f64,
        interval_real: f64,
    ) -> Self {
        Self {
            local_id,
            server_id: ServerId::UNASSIGNED,
            token,
            ppm,
            interval_sim,
            interval_real,
            models: Registry::new(),
        }
    }

    /// Creates a model in this world, allocating its local id from the
    /// client-wide counter and indexing it by local id and name.
    /// Purely local; no network I/O.
    ///
    /// # Errors
    ///
    /// Fails if `parent` is given but does not refer to a model already
    /// registered in this world.
    pub fn create_model(
        &mut self,
        ids: &IdCounter,
        parent: Option<LocalId>,
        token: Token,
    ) -> Result<LocalId, WorldError> {
        if let Some(p) = parent {
            if self.models.get(p).is_none() {
                return Err(WorldError::UnknownParent(p));
            }
        }

        let local = ids.next();
        debug!(world = %self.local_id, model = %local, token = %token, "created model");
        Ok(self.models.insert(Model::new(local, self.local_id, parent, token)))
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn ppm(&self) -> f64 {
        self.ppm
    }

    pub fn interval_sim(&self) -> f64 {
        self.interval_sim
    }

    pub fn interval_real(&self) -> f64 {
        self.interval_real
    }

    pub fn models(&self) -> &Registry<Model> {
        &self.models
    }

    pub fn models_mut(&mut self) -> &mut Registry<Model> {
        &mut self.models
    }

    /// Returns `true` when the world itself or any of its models still
    /// lacks a server id, i.e. the next push has work to do here.
    pub fn needs_push(&self) -> bool {
        !self.server_id.is_assigned() || self.models.iter().any(|m| !m.server_id().is_assigned())
    }
}

impl Registered for World {
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
