//! zone-link-client binary
//!
//! Headless collaborator for a zone server: joins the default topics, logs
//! chat and entity notifications, and turns stdin lines into commands.
//!
//! ## Configuration (TOML file → `ZONE_LINK_*` env → CLI flags)
//!
//! | Key               | Default                                | Description                  |
//! |-------------------|----------------------------------------|------------------------------|
//! | `socket_url`      | `ws://localhost:4001/socket/websocket` | Channel endpoint             |
//! | `player_name`     | `player1`                              | Sender name / datagram id    |
//! | `global_topic`    | `chat:global`                          | Un-addressed chat topic      |
//! | `zone_id`         | `1`                                    | Zone joined on connect       |
//! | `default_topics`  | *(global + zone)*                      | Comma separated in env       |
//! | `udp_server`      | `127.0.0.1:4000`                       | Movement datagram target     |
//! | `packet_format`   | `hashed`                               | `hashed` or `named`          |
//! | `heartbeat_secs`  | `30`                                   | 0 disables heartbeats        |
//!
//! ## Commands
//!
//! | Line              | Effect                                   |
//! |-------------------|------------------------------------------|
//! | `/move dx dy dz`  | send one movement datagram               |
//! | `/join <topic>`   | join another channel                     |
//! | `/quit`           | close and exit                           |
//! | anything else     | chat (`/w name text` whispers)           |

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use zone_link::queue::{DeliveryQueue, Inbox};
use zone_link::reconciler::EntityNotification;
use zone_link::{ClientConfig, Vec3, ZoneClient};

const TICK: Duration = Duration::from_millis(16);

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "zone-link-client", about = "Zone Link headless client", version)]
struct Args {
    /// Optional TOML config file
    #[arg(long, env = "ZONE_LINK_CONFIG")]
    config: Option<String>,

    /// Channel endpoint URL
    #[arg(long)]
    url: Option<String>,

    /// Player name
    #[arg(long)]
    name: Option<String>,

    /// Zone to join on connect
    #[arg(long)]
    zone: Option<String>,

    /// UDP movement target (host:port)
    #[arg(long)]
    udp_server: Option<String>,

    /// Movement datagram layout
    #[arg(long, value_parser = ["hashed", "named"])]
    packet_format: Option<String>,
}

fn load_config(args: &Args) -> Result<ClientConfig> {
    let mut builder = config::Config::builder();

    if let Some(path) = &args.config {
        builder = builder.add_source(config::File::with_name(path));
    }

    builder = builder
        .add_source(
            config::Environment::with_prefix("ZONE_LINK")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("default_topics"),
        )
        .set_override_option("socket_url", args.url.clone())?
        .set_override_option("player_name", args.name.clone())?
        .set_override_option("zone_id", args.zone.clone())?
        .set_override_option("udp_server", args.udp_server.clone())?
        .set_override_option("packet_format", args.packet_format.clone())?;

    let cfg = builder
        .build()
        .context("reading configuration")?
        .try_deserialize::<ClientConfig>()
        .context("invalid configuration")?;
    Ok(cfg)
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

enum Command<'a> {
    Move(Vec3),
    Join(&'a str),
    Quit,
    Chat(&'a str),
}

fn parse_command(line: &str) -> Result<Command<'_>> {
    let line = line.trim_end();
    if line == "/quit" {
        return Ok(Command::Quit);
    }
    if let Some(topic) = line.strip_prefix("/join ") {
        let topic = topic.trim();
        if topic.is_empty() {
            bail!("usage: /join <topic>");
        }
        return Ok(Command::Join(topic));
    }
    if let Some(rest) = line.strip_prefix("/move ") {
        let parts = rest
            .split_whitespace()
            .map(str::parse::<f32>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("usage: /move dx dy dz")?;
        let [x, y, z] = parts[..] else {
            bail!("usage: /move dx dy dz");
        };
        return Ok(Command::Move(Vec3::new(x, y, z)));
    }
    Ok(Command::Chat(line))
}

/// Reads stdin on its own thread; lines reach the tick through a queue.
fn spawn_stdin_reader(inbox: Inbox<String>) -> Result<()> {
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => inbox.push(line),
                    Err(e) => {
                        log::error!("[stdin] Read failed: {}", e);
                        break;
                    }
                }
            }
            inbox.push("/quit".into());
        })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("zone_link=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let cfg = load_config(&args)?;

    tracing::info!(
        "Starting zone-link-client (url='{}', player='{}', topics={:?}, udp={})",
        cfg.socket_url,
        cfg.player_name,
        cfg.topics(),
        cfg.udp_server,
    );

    let mut client = ZoneClient::websocket(cfg);

    client.on_chat(|msg| println!("[{}] {}: {}", msg.topic, msg.from, msg.text));
    client.on_entity(|n| match n {
        EntityNotification::Spawned { id, position } => {
            tracing::info!("spawn {} at {}", id, position)
        }
        EntityNotification::Moved { id, position } => {
            tracing::debug!("move {} to {}", id, position)
        }
        EntityNotification::Removed { id } => tracing::info!("despawn {}", id),
    });

    client.connect()?;

    let lines = DeliveryQueue::new();
    spawn_stdin_reader(lines.inbox())?;

    loop {
        client.poll();

        for line in lines.drain(0) {
            match parse_command(&line) {
                Ok(Command::Quit) => {
                    client.close();
                    tracing::info!("Bye");
                    return Ok(());
                }
                Ok(Command::Join(topic)) => client.join_channel(topic),
                Ok(Command::Move(delta)) => {
                    if let Err(e) = client.send_movement(delta) {
                        tracing::warn!("Movement not sent: {}", e);
                    }
                }
                Ok(Command::Chat(text)) => {
                    if !text.trim().is_empty() && !client.send_chat_line(text) {
                        tracing::warn!("Not connected; chat dropped");
                    }
                }
                Err(e) => eprintln!("{e:#}"),
            }
        }

        thread::sleep(TICK);
    }
}
