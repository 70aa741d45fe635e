//! One connected client, end to end: the greeting sequence, the framed read
//! loop feeding the inbound queue, and the writer task draining the outbound
//! channel.
//!
//! A session never tears itself down. The read loop's only exit action is the
//! `Active -> Draining` transition; removal from the directory and registry
//! is centralized in the reaper so the read loop, tick processor, and
//! teardown can never race on shared state.

use crate::network::SharedState;
use log::{debug, info};
use shared::{encode, Packet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

/// Lifecycle of a session. Transitions only move forward:
/// `Connecting -> Active -> Draining -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted; greeting in flight, not yet addressable by broadcasts from
    /// its own inputs.
    Connecting,
    /// Fully joined, read loop running.
    Active,
    /// Read loop ended; waiting for the reaper.
    Draining,
    /// Teardown finished.
    Closed,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Active,
            2 => SessionState::Draining,
            _ => SessionState::Closed,
        }
    }
}

/// Shared, lock-free view of a session's state, observed by the reaper and
/// the registry while the session task owns the transitions.
#[derive(Clone)]
pub struct SessionStateCell(Arc<AtomicU8>);

impl SessionStateCell {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(SessionState::Connecting as u8)))
    }

    pub fn set(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }
}

impl Default for SessionStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives one accepted connection until its transport dies.
pub async fn run_session(
    id: u32,
    stream: TcpStream,
    state: SessionStateCell,
    outbound_rx: UnboundedReceiver<String>,
    shared: Arc<SharedState>,
    join_grace: Duration,
) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string());
    info!("session {} connected from {}", id, peer);

    let (read_half, write_half) = stream.into_split();
    spawn_writer(id, write_half, outbound_rx);

    greet(id, &state, &shared, join_grace).await;

    let mut reader = BufReader::new(read_half);
    let mut type_line = String::new();
    let mut payload_line = String::new();

    loop {
        type_line.clear();
        match reader.read_line(&mut type_line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("session {} read error: {}", id, e);
                break;
            }
        }
        // Stray separator between frames; not a frame start.
        if type_line.trim().is_empty() {
            continue;
        }

        payload_line.clear();
        match reader.read_line(&mut payload_line).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("session {} read error: {}", id, e);
                break;
            }
        }

        let frame = format!(
            "{}\n{}",
            type_line.trim_end_matches(['\r', '\n']),
            payload_line.trim_end_matches(['\r', '\n'])
        );
        shared.queue.push(id, frame).await;
    }

    state.set(SessionState::Draining);
    info!("session {} disconnected", id);
}

/// The connect-time sequence: spawn the player, push the roster snapshot,
/// wait out the join grace so the client can initialize, then assign the id
/// and announce the join to everyone else.
async fn greet(id: u32, state: &SessionStateCell, shared: &SharedState, join_grace: Duration) {
    let roster = {
        let mut directory = shared.directory.lock().await;
        directory.spawn_player(id);
        directory.roster_excluding(id)
    };

    let roster_frame = encode(&Packet::Roster { entries: roster });
    shared.registry.read().await.send_to(id, &roster_frame);

    tokio::time::sleep(join_grace).await;

    shared
        .registry
        .read()
        .await
        .send_to(id, &encode(&Packet::IdAssign { id }));
    state.set(SessionState::Active);

    let entry = shared
        .directory
        .lock()
        .await
        .get(id)
        .map(|player| player.roster_entry());
    if let Some(entry) = entry {
        let announce = encode(&Packet::Join { entry });
        shared.registry.read().await.broadcast(&announce, Some(id));
    }
}

/// Writer task: drains the outbound channel into the write half, appending
/// the payload line terminator. Ends when the channel closes (teardown) or
/// the transport rejects a write; either way the reaper owns cleanup.
fn spawn_writer(id: u32, mut write_half: OwnedWriteHalf, mut rx: UnboundedReceiver<String>) {
    tokio::spawn(async move {
        while let Some(mut frame) = rx.recv().await {
            frame.push('\n');
            if let Err(e) = write_half.write_all(frame.as_bytes()).await {
                debug!("session {} write error: {}", id, e);
                break;
            }
        }
    });
}
