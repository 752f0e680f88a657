//! The client orchestrator: owns the connection and the world tree, drives
//! push/pull, property traffic, subscriptions and inbound dispatch.
//!
//! One `Client` exclusively owns its `Connection` and its worlds, so a
//! single logical thread of control suffices and no internal locking is
//! needed. If an embedding application drives the client from several
//! threads, it must serialize all public calls externally.

use std::collections::HashSet;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Instant;

use tracing::{debug, info, warn};

use worldsync_core::domain::world::WorldError;
use worldsync_core::protocol::messages::{
    MessageType, ModelCreateMessage, ModelDestroyMessage, ModelPropertyMessage, SubscribeMessage,
    UnsubscribeMessage, WorldCreateMessage,
};
use worldsync_core::{
    IdCounter, LocalId, Model, ProtocolError, Registered, Registry, ServerId, SyncMessage, Token,
    World,
};

use crate::config::ClientConfig;
use crate::connection::{Connection, ServerInfo};
use crate::error::ClientError;

/// Where the client currently stands with respect to its server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection has been established (or `shutdown` was called).
    Disconnected,
    /// Handshake complete; network operations are available.
    Connected,
    /// The connection failed; network operations are rejected with
    /// `ConnectionLost` until `connect` succeeds again.
    Lost,
}

/// Notifications emitted by inbound dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientEvent {
    /// A subscribed property was updated by an inbound message.
    PropertyUpdated {
        world: LocalId,
        model: LocalId,
        tag: u32,
    },
}

/// The synchronization client.
pub struct Client {
    config: ClientConfig,
    conn: Option<Connection>,
    state: ConnectionState,
    server_info: Option<ServerInfo>,
    ids: IdCounter,
    worlds: Registry<World>,
    /// Locally-tracked subscriptions, keyed by (model handle, property tag).
    subscriptions: HashSet<(LocalId, u32)>,
    /// Properties staged locally but not yet delivered to the server,
    /// keyed by (model handle, property tag). Flushed by `push`.
    pending_uploads: HashSet<(LocalId, u32)>,
    event_tx: Sender<ClientEvent>,
    event_rx: Receiver<ClientEvent>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        let (event_tx, event_rx) = channel();
        Self {
            config,
            conn: None,
            state: ConnectionState::Disconnected,
            server_info: None,
            ids: IdCounter::new(),
            worlds: Registry::new(),
            subscriptions: HashSet::new(),
            pending_uploads: HashSet::new(),
            event_tx,
            event_rx,
        }
    }

    // ── Connection lifecycle ──────────────────────────────────────────────────

    /// Opens the connection and performs the handshake. The result of the
    /// handshake is available via [`server_info`](Self::server_info).
    ///
    /// # Errors
    ///
    /// See [`Connection::establish`].
    pub fn connect(&mut self) -> Result<(), ClientError> {
        let (conn, info) = Connection::establish(&self.config)?;
        self.conn = Some(conn);
        self.server_info = Some(info);
        self.state = ConnectionState::Connected;
        Ok(())
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    /// Best-effort teardown: pulls every materialized world, then clears
    /// all local state and closes the socket.
    pub fn shutdown(&mut self) {
        if self.state == ConnectionState::Connected {
            if let Err(e) = self.pull() {
                warn!(error = %e, "teardown pull failed");
            }
        }
        for wl in self.worlds.local_ids() {
            self.worlds.remove(wl);
        }
        self.subscriptions.clear();
        self.pending_uploads.clear();
        self.conn = None;
        self.server_info = None;
        self.state = ConnectionState::Disconnected;
        info!("client shut down");
    }

    // ── Local object creation ─────────────────────────────────────────────────

    /// Creates a world locally. No network I/O; the world is materialized
    /// remotely by the next [`push`](Self::push).
    pub fn create_world(
        &mut self,
        token: Token,
        ppm: f64,
        interval_sim: f64,
        interval_real: f64,
    ) -> LocalId {
        let local = self.ids.next();
        info!(world = %local, token = %token, "created world");
        self.worlds
            .insert(World::new(local, token, ppm, interval_sim, interval_real))
    }

    /// Creates a model locally inside `world`, optionally under `parent`.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownWorld`] / [`ClientError::UnknownParent`] when
    /// the handles do not resolve.
    pub fn create_model(
        &mut self,
        world: LocalId,
        parent: Option<LocalId>,
        token: Token,
    ) -> Result<LocalId, ClientError> {
        let ids = &self.ids;
        let w = self
            .worlds
            .get_mut(world)
            .ok_or(ClientError::UnknownWorld(world))?;
        w.create_model(ids, parent, token).map_err(|e| match e {
            WorldError::UnknownParent(p) => ClientError::UnknownParent(p),
        })
    }

    /// Removes a world (and all its models) from local bookkeeping only.
    /// Use [`pull_world`](Self::pull_world) first if the server side should
    /// be torn down too.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownWorld`] when the handle does not resolve.
    pub fn remove_world(&mut self, world: LocalId) -> Result<(), ClientError> {
        let removed = self
            .worlds
            .remove(world)
            .ok_or(ClientError::UnknownWorld(world))?;
        let gone: HashSet<LocalId> = removed.models().iter().map(Registered::local_id).collect();
        self.subscriptions.retain(|(ml, _)| !gone.contains(ml));
        self.pending_uploads.retain(|(ml, _)| !gone.contains(ml));
        Ok(())
    }

    /// Removes a model from local bookkeeping only.
    ///
    /// # Errors
    ///
    /// [`ClientError::UnknownWorld`] / [`ClientError::UnknownModel`].
    pub fn remove_model(&mut self, world: LocalId, model: LocalId) -> Result<(), ClientError> {
        let w = self
            .worlds
            .get_mut(world)
            .ok_or(ClientError::UnknownWorld(world))?;
        w.models_mut()
            .remove(model)
            .ok_or(ClientError::UnknownModel { world, model })?;
        self.subscriptions.retain(|(ml, _)| *ml != model);
        self.pending_uploads.retain(|(ml, _)| *ml != model);
        Ok(())
    }

    // ── Push / pull ───────────────────────────────────────────────────────────

    /// Materializes every unmaterialized world and model on the server, in
    /// creation order, and uploads every staged property that has not yet
    /// been delivered, including values whose immediate upload failed on a
    /// previous connection.
    ///
    /// Idempotent: entries that already carry a server id are not recreated,
    /// so a push interrupted by connection loss is resumed by calling it
    /// again after reconnecting.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionLost`] / [`ClientError::ReplyTimeout`] /
    /// [`ClientError::Framing`]; the already-materialized prefix keeps its
    /// server ids.
    pub fn push(&mut self) -> Result<(), ClientError> {
        for wl in self.worlds.local_ids() {
            self.push_world(wl)?;
        }
        Ok(())
    }

    fn push_world(&mut self, wl: LocalId) -> Result<(), ClientError> {
        let world = self.worlds.get(wl).ok_or(ClientError::UnknownWorld(wl))?;
        if !world.server_id().is_assigned() {
            let request = SyncMessage::WorldCreate(WorldCreateMessage {
                token: world.token().name().to_string(),
                ppm: world.ppm(),
                interval_sim: world.interval_sim(),
                interval_real: world.interval_real(),
            });
            self.send(&request)?;
            let sid = self.await_reply(MessageType::WorldCreateReply)?;
            self.bind_world(wl, sid)?;
            info!(world = %wl, server = %sid, "world materialized");
        }

        let world = self.worlds.get(wl).ok_or(ClientError::UnknownWorld(wl))?;
        let world_sid = world.server_id();
        for ml in world.models().local_ids() {
            let Some(model) = self.worlds.get(wl).and_then(|w| w.models().get(ml)) else {
                continue;
            };
            if !model.server_id().is_assigned() {
                let request = SyncMessage::ModelCreate(ModelCreateMessage {
                    world: world_sid,
                    token: model.token().name().to_string(),
                });
                self.send(&request)?;
                let sid = self.await_reply(MessageType::ModelCreateReply)?;
                self.bind_model(wl, ml, sid)?;
                info!(world = %wl, model = %ml, server = %sid, "model materialized");
            }
            // The model is addressable; flush what was staged locally but
            // never delivered, whether it predates materialization or was
            // left behind by a failed immediate upload.
            self.flush_pending_uploads(wl, ml, world_sid)?;
        }
        Ok(())
    }

    /// Uploads every property of one materialized model that is still
    /// marked pending, clearing each mark only after its send succeeds so
    /// an interrupted flush stays resumable.
    fn flush_pending_uploads(
        &mut self,
        wl: LocalId,
        ml: LocalId,
        world_sid: ServerId,
    ) -> Result<(), ClientError> {
        let mut tags: Vec<u32> = self
            .pending_uploads
            .iter()
            .filter(|(m, _)| *m == ml)
            .map(|&(_, tag)| tag)
            .collect();
        tags.sort_unstable();
        for tag in tags {
            let staged = self
                .worlds
                .get(wl)
                .and_then(|w| w.models().get(ml))
                .and_then(|m| m.property(tag).map(|d| (m.server_id(), d.to_vec())));
            let Some((model_sid, data)) = staged else {
                // The stored value is gone; nothing left to deliver.
                self.pending_uploads.remove(&(ml, tag));
                continue;
            };
            self.send(&SyncMessage::ModelProperty(ModelPropertyMessage {
                world: world_sid,
                model: model_sid,
                tag,
                data,
            }))?;
            self.pending_uploads.remove(&(ml, tag));
        }
        Ok(())
    }

    /// Requests remote teardown of every materialized world. Fire and
    /// forget: no reply is awaited. Unmaterialized worlds are skipped with
    /// a warning. Local bookkeeping is untouched; see
    /// [`remove_world`](Self::remove_world).
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionLost`] if a send fails.
    pub fn pull(&mut self) -> Result<(), ClientError> {
        for wl in self.worlds.local_ids() {
            let sid = match self.worlds.get(wl) {
                Some(w) => w.server_id(),
                None => continue,
            };
            if !sid.is_assigned() {
                warn!(world = %wl, "skipping pull of unmaterialized world");
                continue;
            }
            self.send(&SyncMessage::WorldDestroy(sid))?;
        }
        Ok(())
    }

    /// Requests remote teardown of one world.
    ///
    /// # Errors
    ///
    /// [`ClientError::NotMaterialized`] when the world has no server id;
    /// a destroy request is never sent with server id 0.
    pub fn pull_world(&mut self, world: LocalId) -> Result<(), ClientError> {
        let w = self
            .worlds
            .get(world)
            .ok_or(ClientError::UnknownWorld(world))?;
        let sid = w.server_id();
        if !sid.is_assigned() {
            return Err(ClientError::NotMaterialized(world));
        }
        self.send(&SyncMessage::WorldDestroy(sid))
    }

    /// Requests remote teardown of one model.
    ///
    /// # Errors
    ///
    /// As [`pull_world`](Self::pull_world), for either handle.
    pub fn pull_model(&mut self, world: LocalId, model: LocalId) -> Result<(), ClientError> {
        let (wsid, msid) = self.materialized_ids(world, model)?;
        self.send(&SyncMessage::ModelDestroy(ModelDestroyMessage {
            world: wsid,
            model: msid,
        }))
    }

    // ── Properties and subscriptions ──────────────────────────────────────────

    /// Stores a property locally (last write wins) and, when the model is
    /// already materialized, immediately uploads it. On an unmaterialized
    /// model the value is only staged; the next [`push`](Self::push) sends
    /// it.
    ///
    /// # Errors
    ///
    /// Handle-resolution errors, plus [`ClientError::ConnectionLost`] when
    /// an immediate upload was due and failed (the local store remains and
    /// is re-sent by a later push after reconnecting).
    pub fn set_property(
        &mut self,
        world: LocalId,
        model: LocalId,
        tag: u32,
        data: Vec<u8>,
    ) -> Result<(), ClientError> {
        let w = self
            .worlds
            .get_mut(world)
            .ok_or(ClientError::UnknownWorld(world))?;
        let world_sid = w.server_id();
        let m = w
            .models_mut()
            .get_mut(model)
            .ok_or(ClientError::UnknownModel { world, model })?;
        m.set_property(tag, data.clone());
        let model_sid = m.server_id();
        // Marked undelivered until a send actually goes through; a later
        // push flushes whatever is still marked.
        self.pending_uploads.insert((model, tag));

        if world_sid.is_assigned() && model_sid.is_assigned() {
            self.send(&SyncMessage::ModelProperty(ModelPropertyMessage {
                world: world_sid,
                model: model_sid,
                tag,
                data,
            }))?;
            self.pending_uploads.remove(&(model, tag));
        }
        Ok(())
    }

    /// Asks the server to stream a property back periodically as inbound
    /// ModelProperty messages. `interval` is in seconds; 0 means "every
    /// update". Matching updates are surfaced via
    /// [`next_event`](Self::next_event).
    ///
    /// # Errors
    ///
    /// [`ClientError::NotMaterialized`] when world or model lacks a server
    /// id.
    pub fn subscribe(
        &mut self,
        world: LocalId,
        model: LocalId,
        tag: u32,
        interval: f64,
    ) -> Result<(), ClientError> {
        let (wsid, msid) = self.materialized_ids(world, model)?;
        self.send(&SyncMessage::Subscribe(SubscribeMessage {
            world: wsid,
            model: msid,
            tag,
            interval,
        }))?;
        self.subscriptions.insert((model, tag));
        Ok(())
    }

    /// Stops streaming a property.
    ///
    /// # Errors
    ///
    /// As [`subscribe`](Self::subscribe).
    pub fn unsubscribe(
        &mut self,
        world: LocalId,
        model: LocalId,
        tag: u32,
    ) -> Result<(), ClientError> {
        let (wsid, msid) = self.materialized_ids(world, model)?;
        self.send(&SyncMessage::Unsubscribe(UnsubscribeMessage {
            world: wsid,
            model: msid,
            tag,
        }))?;
        self.subscriptions.remove(&(model, tag));
        Ok(())
    }

    // ── Inbound traffic ───────────────────────────────────────────────────────

    /// Drains every complete inbound message through dispatch. Returns the
    /// number of messages handled. Call from the embedding event loop.
    ///
    /// # Errors
    ///
    /// [`ClientError::ConnectionLost`] / [`ClientError::Framing`]; both
    /// transition the client to [`ConnectionState::Lost`].
    pub fn poll(&mut self) -> Result<usize, ClientError> {
        let mut handled = 0;
        loop {
            let next = self.active_conn()?.try_read();
            match next {
                Ok(Some(msg)) => {
                    self.dispatch(msg);
                    handled += 1;
                }
                Ok(None) => return Ok(handled),
                Err(e) => return Err(self.note_failure(e)),
            }
        }
    }

    /// Pops the next pending event, if any.
    pub fn next_event(&mut self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Routes one inbound message. Property updates for unknown server ids
    /// (already destroyed or not yet materialized on our side) are dropped
    /// silently.
    fn dispatch(&mut self, msg: SyncMessage) {
        match msg {
            SyncMessage::ModelProperty(p) => {
                let Some(wl) = self.worlds.handle_by_server(p.world) else {
                    debug!(world = %p.world, "property update for unknown world dropped");
                    return;
                };
                let Some(world) = self.worlds.get_mut(wl) else {
                    return;
                };
                let Some(ml) = world.models().handle_by_server(p.model) else {
                    debug!(world = %p.world, model = %p.model, "property update for unknown model dropped");
                    return;
                };
                let tag = p.tag;
                if let Some(model) = world.models_mut().get_mut(ml) {
                    model.set_property(tag, p.data);
                }
                if self.subscriptions.contains(&(ml, tag)) {
                    let _ = self.event_tx.send(ClientEvent::PropertyUpdated {
                        world: wl,
                        model: ml,
                        tag,
                    });
                }
            }
            SyncMessage::WorldCreateReply(id) | SyncMessage::ModelCreateReply(id) => {
                warn!(server = %id, "stray creation reply dropped");
            }
            other => {
                warn!(kind = ?other.message_type(), "unexpected inbound message dropped");
            }
        }
    }

    // ── Collaborator accessors ────────────────────────────────────────────────

    pub fn world(&self, local: LocalId) -> Option<&World> {
        self.worlds.get(local)
    }

    pub fn world_by_name(&self, name: &str) -> Option<&World> {
        self.worlds.lookup_by_name(name)
    }

    pub fn worlds(&self) -> &Registry<World> {
        &self.worlds
    }

    /// Resolves a model by world name and model name.
    pub fn get_model(&self, world_name: &str, model_name: &str) -> Option<&Model> {
        self.worlds
            .lookup_by_name(world_name)?
            .models()
            .lookup_by_name(model_name)
    }

    /// Resolves a model by the server-assigned ids, the way inbound
    /// dispatch does.
    pub fn get_model_by_server_ids(&self, world: ServerId, model: ServerId) -> Option<&Model> {
        self.worlds
            .lookup_by_server(world)?
            .models()
            .lookup_by_server(model)
    }

    // ── Internals ─────────────────────────────────────────────────────────────

    fn active_conn(&mut self) -> Result<&mut Connection, ClientError> {
        match self.state {
            ConnectionState::Connected => self.conn.as_mut().ok_or(ClientError::ConnectionLost),
            _ => Err(ClientError::ConnectionLost),
        }
    }

    fn send(&mut self, msg: &SyncMessage) -> Result<(), ClientError> {
        let result = self.active_conn()?.write(msg);
        result.map_err(|e| self.note_failure(e))
    }

    /// Blocks until the single outstanding create request is answered.
    ///
    /// Any inbound message that is not the expected reply is dispatched
    /// normally, never dropped. Creation requests are never pipelined, so
    /// the next reply of the expected type belongs to the request just
    /// sent.
    fn await_reply(&mut self, expected: MessageType) -> Result<ServerId, ClientError> {
        let timeout = self.config.reply_timeout();
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = match deadline.checked_duration_since(Instant::now()) {
                Some(d) if !d.is_zero() => d,
                _ => return Err(ClientError::ReplyTimeout(timeout)),
            };
            let read = self.active_conn()?.read_blocking(remaining);
            let msg = match read {
                Ok(m) => m,
                Err(ClientError::ReplyTimeout(_)) => {
                    return Err(ClientError::ReplyTimeout(timeout))
                }
                Err(e) => return Err(self.note_failure(e)),
            };
            match (expected, msg) {
                (MessageType::WorldCreateReply, SyncMessage::WorldCreateReply(id))
                | (MessageType::ModelCreateReply, SyncMessage::ModelCreateReply(id)) => {
                    return Ok(id)
                }
                (_, other) => self.dispatch(other),
            }
        }
    }

    fn bind_world(&mut self, wl: LocalId, sid: ServerId) -> Result<(), ClientError> {
        if !sid.is_assigned() {
            return Err(ClientError::Framing(ProtocolError::MalformedPayload(
                "creation reply carried server id 0".to_string(),
            )));
        }
        self.worlds
            .bind_server_id(wl, sid)
            .map_err(|_| ClientError::UnknownWorld(wl))
    }

    fn bind_model(&mut self, wl: LocalId, ml: LocalId, sid: ServerId) -> Result<(), ClientError> {
        if !sid.is_assigned() {
            return Err(ClientError::Framing(ProtocolError::MalformedPayload(
                "creation reply carried server id 0".to_string(),
            )));
        }
        let w = self.worlds.get_mut(wl).ok_or(ClientError::UnknownWorld(wl))?;
        w.models_mut()
            .bind_server_id(ml, sid)
            .map_err(|_| ClientError::UnknownModel {
                world: wl,
                model: ml,
            })
    }

    fn materialized_ids(
        &self,
        world: LocalId,
        model: LocalId,
    ) -> Result<(ServerId, ServerId), ClientError> {
        let w = self
            .worlds
            .get(world)
            .ok_or(ClientError::UnknownWorld(world))?;
        if !w.server_id().is_assigned() {
            return Err(ClientError::NotMaterialized(world));
        }
        let m = w
            .models()
            .get(model)
            .ok_or(ClientError::UnknownModel { world, model })?;
        if !m.server_id().is_assigned() {
            return Err(ClientError::NotMaterialized(model));
        }
        Ok((w.server_id(), m.server_id()))
    }

    /// Marks the connection dead on fatal errors and passes the error on.
    fn note_failure(&mut self, err: ClientError) -> ClientError {
        if matches!(err, ClientError::ConnectionLost | ClientError::Framing(_)) {
            self.state = ConnectionState::Lost;
            self.conn = None;
            warn!("connection lost; reconnect required");
        }
        err
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
