//! Worldsync demo client entry point.
//!
//! Builds a small world tree, pushes it to the configured server, subscribes
//! to the robot's pose and then runs a poll loop printing subscription
//! updates. This is the role an embedding simulation application plays; the
//! binary exists to exercise the full public API against a live server.
//!
//! ```text
//! main()
//!  └─ ClientConfig::load()   -- TOML config (worldsync.toml by default)
//!  └─ Client::connect()      -- handshake
//!  └─ create_world/create_model/set_property
//!  └─ Client::push()         -- materialize remotely
//!  └─ poll loop              -- inbound dispatch + events
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use worldsync_client::{Client, ClientConfig, ClientError};
use worldsync_core::domain::property::tags;
use worldsync_core::Token;

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("worldsync.toml"));
    let config = ClientConfig::load(&config_path)?;

    // Initialise structured logging; RUST_LOG wins over the config file.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    info!(host = %config.host, port = config.port, "worldsync client starting");

    let mut client = Client::new(config);
    client.connect()?;
    if let Some(info) = client.server_info() {
        info!(server = %info.id_string, banner = %info.banner, "handshake complete");
        if !info.greeting_acknowledged {
            warn!("server did not acknowledge the greeting; continuing leniently");
        }
    }

    // ── Build the local tree ──────────────────────────────────────────────────
    let world = client.create_world(Token::new("arena", 0), 20.0, 0.1, 0.1);
    let robot = client.create_model(world, None, Token::new("robot", 1))?;

    // Stage an initial pose: x=1.0, y=2.0, theta=0.0 as big-endian f64s.
    let mut pose = Vec::with_capacity(24);
    for v in [1.0f64, 2.0, 0.0] {
        pose.extend_from_slice(&v.to_be_bytes());
    }
    client.set_property(world, robot, tags::POSE, pose)?;

    // ── Materialize and subscribe ─────────────────────────────────────────────
    client.push()?;
    client.subscribe(world, robot, tags::POSE, 0.1)?;
    info!("world tree pushed; polling for updates (Ctrl-C to quit)");

    // ── Poll loop ─────────────────────────────────────────────────────────────
    loop {
        match client.poll() {
            Ok(_) => {}
            Err(ClientError::ConnectionLost) => {
                warn!("server went away; exiting");
                break;
            }
            Err(e) => return Err(e.into()),
        }

        while let Some(event) = client.next_event() {
            info!(?event, "subscription update");
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    client.shutdown();
    Ok(())
}
