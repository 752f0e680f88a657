//! Integration tests driving the `Client` against a scripted in-process TCP
//! server double.
//!
//! The double speaks the real handshake and framing, records every message
//! the client sends, and answers creation requests with sequential server
//! ids (worlds from 7, models from 3) so the tests can assert the exact
//! outbound traffic and the resulting server-id bindings.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use worldsync_client::{Client, ClientConfig, ClientError, ClientEvent, ConnectionState};
use worldsync_core::domain::property::tags;
use worldsync_core::protocol::codec::{decode_message, encode_connect_reply, encode_message};
use worldsync_core::protocol::messages::{
    ConnectReply, ModelPropertyMessage, GREETING_ACK, HEADER_SIZE,
};
use worldsync_core::{Registered, ServerId, SyncMessage, Token};

// ── Server double ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
enum Script {
    /// Answer every creation request.
    Answer,
    /// Answer the first WorldCreate, then close the stream.
    DropAfterWorldReply,
    /// Answer creation requests normally, then close the stream right after
    /// the first ModelCreateReply.
    CloseAfterModelReply,
    /// Like `Answer`, and respond to Subscribe with one matching
    /// ModelProperty carrying `[0xAB, 0xCD]`.
    StreamOnSubscribe,
    /// Like `Answer`, and respond to Subscribe with a property addressed to
    /// an unknown model first, then the matching one.
    StreamUnknownThenKnown,
}

struct ServerDouble {
    port: u16,
    received: Receiver<SyncMessage>,
    handle: JoinHandle<()>,
}

impl ServerDouble {
    fn spawn(script: Script) -> Self {
        Self::spawn_sessions(vec![script])
    }

    /// Accepts one connection per script, in order, so a test can drive a
    /// disconnect-and-reconnect sequence against the same port.
    fn spawn_sessions(scripts: Vec<Script>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let (tx, received) = channel();

        let handle = thread::spawn(move || {
            for script in scripts {
                let (mut stream, _) = listener.accept().expect("accept");
                handshake(&mut stream);
                serve_session(&mut stream, script, &tx);
            }
        });

        Self {
            port,
            received,
            handle,
        }
    }

    /// Waits for the server thread to finish (the client must have closed
    /// its stream) and returns everything it received, in order.
    fn finish(self) -> Vec<SyncMessage> {
        self.handle.join().expect("server thread");
        self.received.try_iter().collect()
    }
}

/// Records and answers frames on one accepted stream until the client closes
/// it or the script says to hang up.
fn serve_session(stream: &mut TcpStream, script: Script, tx: &Sender<SyncMessage>) {
    let mut next_world_id = 7u32;
    let mut next_model_id = 3u32;
    while let Ok(msg) = read_frame(stream) {
        tx.send(msg.clone()).ok();
        match msg {
            SyncMessage::WorldCreate(_) => {
                write_frame(
                    stream,
                    &SyncMessage::WorldCreateReply(ServerId::new(next_world_id)),
                );
                next_world_id += 1;
                if matches!(script, Script::DropAfterWorldReply) {
                    return;
                }
            }
            SyncMessage::ModelCreate(_) => {
                write_frame(
                    stream,
                    &SyncMessage::ModelCreateReply(ServerId::new(next_model_id)),
                );
                next_model_id += 1;
                if matches!(script, Script::CloseAfterModelReply) {
                    return;
                }
            }
            SyncMessage::Subscribe(s) => match script {
                Script::StreamOnSubscribe => {
                    write_frame(
                        stream,
                        &SyncMessage::ModelProperty(ModelPropertyMessage {
                            world: s.world,
                            model: s.model,
                            tag: s.tag,
                            data: vec![0xAB, 0xCD],
                        }),
                    );
                }
                Script::StreamUnknownThenKnown => {
                    write_frame(
                        stream,
                        &SyncMessage::ModelProperty(ModelPropertyMessage {
                            world: s.world,
                            model: ServerId::new(99),
                            tag: s.tag,
                            data: vec![0xEE],
                        }),
                    );
                    write_frame(
                        stream,
                        &SyncMessage::ModelProperty(ModelPropertyMessage {
                            world: s.world,
                            model: s.model,
                            tag: s.tag,
                            data: vec![0xAB, 0xCD],
                        }),
                    );
                }
                _ => {}
            },
            _ => {}
        }
    }
}

fn handshake(stream: &mut TcpStream) {
    stream.write_all(b"worldsync test server\0").expect("banner");
    let mut greeting = [0u8; 4];
    stream.read_exact(&mut greeting).expect("greeting");
    let reply = ConnectReply {
        status: GREETING_ACK,
        id_string: "server-double".to_string(),
        version_major: 2,
        version_minor: 1,
        version_micro: 0,
    };
    stream
        .write_all(&encode_connect_reply(&reply))
        .expect("connect reply");
}

fn read_frame(stream: &mut TcpStream) -> std::io::Result<SyncMessage> {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header)?;
    let payload_len = u32::from_be_bytes([header[4], header[5], header[6], header[7]]) as usize;
    let mut frame = header.to_vec();
    frame.resize(HEADER_SIZE + payload_len, 0);
    stream.read_exact(&mut frame[HEADER_SIZE..])?;
    Ok(decode_message(&frame).expect("server double decode").0)
}

fn write_frame(stream: &mut TcpStream, msg: &SyncMessage) {
    let bytes = encode_message(msg).expect("server double encode");
    stream.write_all(&bytes).expect("server write");
}

fn connected_client(port: u16) -> Client {
    let config = ClientConfig {
        host: "127.0.0.1".to_string(),
        port,
        reply_timeout_ms: 2000,
        ..ClientConfig::default()
    };
    let mut client = Client::new(config);
    client.connect().expect("connect");
    client
}

fn pose_bytes() -> Vec<u8> {
    let mut pose = Vec::with_capacity(24);
    for v in [1.0f64, 2.0, 0.0] {
        pose.extend_from_slice(&v.to_be_bytes());
    }
    pose
}

// ── Scenarios ─────────────────────────────────────────────────────────────────

#[test]
fn test_push_materializes_world_tree_end_to_end() {
    let server = ServerDouble::spawn(Script::Answer);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    let robot = client
        .create_model(world, None, Token::new("robot", 1))
        .expect("create model");
    client
        .set_property(world, robot, tags::POSE, pose_bytes())
        .expect("stage pose");

    client.push().expect("push");

    // Server ids are bound into both registries.
    let w = client
        .worlds()
        .lookup_by_server(ServerId::new(7))
        .expect("world by server id");
    assert_eq!(w.local_id(), world);
    let m = client
        .get_model_by_server_ids(ServerId::new(7), ServerId::new(3))
        .expect("model by server ids");
    assert_eq!(m.local_id(), robot);

    drop(client);
    let sent = server.finish();
    assert_eq!(sent.len(), 3, "WorldCreate, ModelCreate, ModelProperty");
    match &sent[0] {
        SyncMessage::WorldCreate(w) => {
            assert_eq!(w.token, "arena");
            assert_eq!(w.ppm, 20.0);
            assert_eq!(w.interval_sim, 0.1);
            assert_eq!(w.interval_real, 0.1);
        }
        other => panic!("expected WorldCreate first, got {other:?}"),
    }
    match &sent[1] {
        SyncMessage::ModelCreate(m) => {
            assert_eq!(m.world, ServerId::new(7));
            assert_eq!(m.token, "robot");
        }
        other => panic!("expected ModelCreate second, got {other:?}"),
    }
    match &sent[2] {
        SyncMessage::ModelProperty(p) => {
            assert_eq!(p.world, ServerId::new(7));
            assert_eq!(p.model, ServerId::new(3));
            assert_eq!(p.tag, tags::POSE);
            assert_eq!(p.data, pose_bytes());
        }
        other => panic!("expected ModelProperty last, got {other:?}"),
    }
}

#[test]
fn test_push_twice_sends_no_duplicate_creates() {
    let server = ServerDouble::spawn(Script::Answer);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    client
        .create_model(world, None, Token::new("robot", 1))
        .expect("create model");

    client.push().expect("first push");
    client.push().expect("second push");

    drop(client);
    let sent = server.finish();
    let creates = sent
        .iter()
        .filter(|m| {
            matches!(
                m,
                SyncMessage::WorldCreate(_) | SyncMessage::ModelCreate(_)
            )
        })
        .count();
    assert_eq!(creates, 2, "exactly one create per object");
}

#[test]
fn test_connection_lost_mid_push_leaves_resumable_prefix() {
    let server = ServerDouble::spawn(Script::DropAfterWorldReply);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    client
        .create_model(world, None, Token::new("robot", 1))
        .expect("create model");

    let result = client.push();
    assert!(matches!(result, Err(ClientError::ConnectionLost)));
    server.handle.join().expect("server thread");

    // The world kept the server id it received before the loss; the model
    // never got one.
    assert_eq!(client.world(world).expect("world").server_id(), ServerId::new(7));
    assert_eq!(
        client
            .get_model("arena", "robot")
            .expect("model")
            .server_id(),
        ServerId::UNASSIGNED
    );
    assert_eq!(client.state(), ConnectionState::Lost);

    // Until reconnected, retrying fails the same way.
    assert!(matches!(client.push(), Err(ClientError::ConnectionLost)));
}

#[test]
fn test_push_after_reconnect_resends_undelivered_property() {
    let server = ServerDouble::spawn_sessions(vec![Script::CloseAfterModelReply, Script::Answer]);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    let robot = client
        .create_model(world, None, Token::new("robot", 1))
        .expect("create model");
    client.push().expect("initial push");

    // The server hung up right after the ModelCreateReply; keep polling
    // until the loss becomes visible.
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        match client.poll() {
            Err(ClientError::ConnectionLost) => break,
            Ok(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(5)),
            other => panic!("expected ConnectionLost, got {other:?}"),
        }
    }

    // The model is materialized, so an immediate upload is due and fails;
    // the value must stay staged locally.
    let result = client.set_property(world, robot, tags::POSE, pose_bytes());
    assert!(matches!(result, Err(ClientError::ConnectionLost)));
    assert_eq!(
        client
            .get_model("arena", "robot")
            .expect("model")
            .property(tags::POSE),
        Some(pose_bytes().as_slice())
    );

    client.connect().expect("reconnect");
    client.push().expect("resumed push");

    drop(client);
    let sent = server.finish();
    let props: Vec<_> = sent
        .iter()
        .filter_map(|m| match m {
            SyncMessage::ModelProperty(p) => Some(p),
            _ => None,
        })
        .collect();
    assert_eq!(props.len(), 1, "the staged pose is delivered exactly once");
    assert_eq!(props[0].world, ServerId::new(7));
    assert_eq!(props[0].model, ServerId::new(3));
    assert_eq!(props[0].tag, tags::POSE);
    assert_eq!(props[0].data, pose_bytes());

    let creates = sent
        .iter()
        .filter(|m| {
            matches!(
                m,
                SyncMessage::WorldCreate(_) | SyncMessage::ModelCreate(_)
            )
        })
        .count();
    assert_eq!(creates, 2, "the resumed push recreates nothing");
}

#[test]
fn test_pull_of_unmaterialized_world_sends_nothing() {
    let server = ServerDouble::spawn(Script::Answer);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    let result = client.pull_world(world);
    assert!(matches!(result, Err(ClientError::NotMaterialized(l)) if l == world));

    drop(client);
    let sent = server.finish();
    assert!(sent.is_empty(), "no destroy with server id 0 may be sent");
}

#[test]
fn test_pull_world_sends_destroy_with_bound_server_id() {
    let server = ServerDouble::spawn(Script::Answer);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    client.push().expect("push");
    client.pull_world(world).expect("pull");

    drop(client);
    let sent = server.finish();
    assert!(matches!(
        sent.last(),
        Some(SyncMessage::WorldDestroy(id)) if *id == ServerId::new(7)
    ));
}

#[test]
fn test_subscription_updates_arrive_as_events() {
    let server = ServerDouble::spawn(Script::StreamOnSubscribe);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    let robot = client
        .create_model(world, None, Token::new("robot", 1))
        .expect("create model");
    client.push().expect("push");
    client
        .subscribe(world, robot, tags::POSE, 0.1)
        .expect("subscribe");

    let event = poll_for_event(&mut client, Duration::from_secs(2));
    assert_eq!(
        event,
        Some(ClientEvent::PropertyUpdated {
            world,
            model: robot,
            tag: tags::POSE
        })
    );
    assert_eq!(
        client
            .get_model("arena", "robot")
            .expect("model")
            .property(tags::POSE),
        Some([0xABu8, 0xCD].as_slice())
    );

    drop(client);
    let sent = server.finish();
    assert!(matches!(
        sent.last(),
        Some(SyncMessage::Subscribe(s))
            if s.world == ServerId::new(7) && s.model == ServerId::new(3)
                && s.tag == tags::POSE && s.interval == 0.1
    ));
}

#[test]
fn test_property_for_unknown_server_id_is_dropped_silently() {
    let server = ServerDouble::spawn(Script::StreamUnknownThenKnown);
    let mut client = connected_client(server.port);

    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    let robot = client
        .create_model(world, None, Token::new("robot", 1))
        .expect("create model");
    client.push().expect("push");
    client
        .subscribe(world, robot, tags::POSE, 0.0)
        .expect("subscribe");

    // The bogus-model property arrives first and must vanish without a
    // trace; the matching one lands normally.
    let event = poll_for_event(&mut client, Duration::from_secs(2));
    assert_eq!(
        event,
        Some(ClientEvent::PropertyUpdated {
            world,
            model: robot,
            tag: tags::POSE
        })
    );
    assert_eq!(
        client
            .get_model("arena", "robot")
            .expect("model")
            .property(tags::POSE),
        Some([0xABu8, 0xCD].as_slice()),
        "only the correctly-addressed payload may land"
    );
    assert!(client.next_event().is_none(), "exactly one event expected");

    drop(client);
    server.finish();
}

/// Polls the client until an event shows up or the deadline passes.
fn poll_for_event(client: &mut Client, timeout: Duration) -> Option<ClientEvent> {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        client.poll().expect("poll");
        if let Some(event) = client.next_event() {
            return Some(event);
        }
        thread::sleep(Duration::from_millis(5));
    }
    None
}
