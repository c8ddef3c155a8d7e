//! Per-client connection handler.
//!
//! Hello -> Play. The read half decodes lines and queues them for the main
//! thread; a writer task serialises whatever the main thread (or the player
//! registry) wants this client to know. Nothing here touches world state.

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use crossbeam_channel::Sender;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use super::protocol::{ClientMessage, ServerMessage};
use crate::host::Inbound;
use crate::player_registry::{PlayerEvent, PlayerRegistry};

const MAX_NAME_LEN: usize = 16;

/// Handle a single client connection until it disconnects.
pub async fn handle(
    stream: TcpStream,
    conn_id: u64,
    inbox: Sender<Inbound>,
    registry: Arc<PlayerRegistry>,
) -> Result<()> {
    let (read, write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    // ── Hello ───────────────────────────────────────────────────────────
    let name = loop {
        let Some(line) = lines.next_line().await? else {
            return Ok(());
        };
        match serde_json::from_str::<ClientMessage>(&line) {
            Ok(ClientMessage::Hello { name }) => break name,
            Ok(other) => bail!("expected hello, got {:?}", other),
            Err(e) => tracing::warn!("Connection {}: malformed line before hello: {}", conn_id, e),
        }
    };
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        bail!("rejected player name {:?}", name);
    }

    let uuid = offline_uuid(&name);
    tracing::info!("Login: {} (uuid: {})", name, uuid);

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let events = registry.subscribe();
    let writer = tokio::spawn(write_loop(write, conn_id, out_rx, events));

    inbox
        .send(Inbound::Join {
            conn_id,
            name: name.clone(),
            uuid,
            outbound: out_tx,
        })
        .context("main thread is gone")?;

    // ── Play ────────────────────────────────────────────────────────────
    let result = read_loop(&mut lines, conn_id, &inbox).await;

    let _ = inbox.send(Inbound::Leave { conn_id });
    // The writer stops once the main thread drops its sender.
    let _ = writer.await;
    tracing::info!("{} disconnected", name);
    result
}

async fn read_loop(
    lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    conn_id: u64,
    inbox: &Sender<Inbound>,
) -> Result<()> {
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let message = match serde_json::from_str::<ClientMessage>(&line) {
            Ok(ClientMessage::Hello { .. }) => {
                tracing::warn!("Connection {}: repeated hello ignored", conn_id);
                continue;
            }
            Ok(message) => message,
            Err(e) => {
                // One bad packet must not end the session.
                tracing::warn!("Connection {}: skipping malformed packet: {}", conn_id, e);
                continue;
            }
        };
        inbox
            .send(Inbound::Packet { conn_id, message })
            .context("main thread is gone")?;
    }
    Ok(())
}

async fn write_loop(
    mut write: OwnedWriteHalf,
    conn_id: u64,
    mut outbound: mpsc::UnboundedReceiver<ServerMessage>,
    mut events: broadcast::Receiver<PlayerEvent>,
) {
    let mut events_open = true;
    loop {
        let message = tokio::select! {
            msg = outbound.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
            event = events.recv(), if events_open => match event {
                Ok(event) if event.conn_id() == conn_id => continue,
                Ok(event) => event_message(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::debug!("Connection {} skipped {} player events", conn_id, n);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    events_open = false;
                    continue;
                }
            },
        };
        if let Err(e) = send(&mut write, &message).await {
            tracing::debug!("Connection {}: write failed: {}", conn_id, e);
            break;
        }
    }
    let _ = write.shutdown().await;
}

fn event_message(event: PlayerEvent) -> ServerMessage {
    match event {
        PlayerEvent::Joined { uuid, name, .. } => ServerMessage::PlayerJoined { uuid, name },
        PlayerEvent::Left { uuid, .. } => ServerMessage::PlayerLeft { uuid },
        PlayerEvent::Moved {
            uuid, transform, ..
        } => ServerMessage::PlayerMoved {
            uuid,
            x: transform.position.x,
            y: transform.position.y,
            z: transform.position.z,
            yaw: transform.yaw,
            pitch: transform.pitch,
        },
    }
}

async fn send(write: &mut OwnedWriteHalf, message: &ServerMessage) -> Result<()> {
    let mut line = serde_json::to_vec(message)?;
    line.push(b'\n');
    write.write_all(&line).await?;
    Ok(())
}

/// Generate an offline-mode UUID from a player name.
pub fn offline_uuid(name: &str) -> Uuid {
    Uuid::new_v3(&Uuid::NAMESPACE_URL, format!("OfflinePlayer:{}", name).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_uuid_is_stable_per_name() {
        assert_eq!(offline_uuid("alice"), offline_uuid("alice"));
        assert_ne!(offline_uuid("alice"), offline_uuid("bob"));
        assert_eq!(offline_uuid("alice").get_version_num(), 3);
    }
}
