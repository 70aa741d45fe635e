//! The fixed-cadence processing loop and the single writer of player state.
//!
//! Every tick drains the inbound queue, decodes each frame at the codec
//! chokepoint, applies the effect to the directory, and fans the re-encoded
//! result out through the registry. Because all mutation paths funnel through
//! this one loop, the directory needs no per-field locking discipline.

use crate::network::SharedState;
use crate::reaper;
use log::warn;
use shared::{decode, encode, normalize_rotation, sanitize_text, Packet, PlayerColor};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};

/// Runs the tick loop forever. The reaper shares the cadence.
pub async fn run(shared: Arc<SharedState>, tick_interval: Duration) {
    let mut ticker = interval(tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        reaper::reap(&shared).await;

        for (from, frame) in shared.queue.drain().await {
            process_frame(&shared, from, &frame).await;
        }
    }
}

/// Decodes one queued frame and applies it. A malformed frame costs exactly
/// one log line; the sending session is never torn down for it.
pub(crate) async fn process_frame(shared: &SharedState, from: u32, frame: &str) {
    match decode(frame) {
        Ok(packet) => apply_packet(shared, from, packet).await,
        Err(e) => warn!("dropping malformed frame from session {}: {}", from, e),
    }
}

async fn apply_packet(shared: &SharedState, from: u32, packet: Packet) {
    match packet {
        Packet::PositionUpdate { x, y, rot, .. } => {
            let rot = normalize_rotation(rot);
            let applied = shared.directory.lock().await.apply_position(from, x, y, rot);
            if !applied {
                // Benign race: the sender was removed before its update was
                // processed.
                return;
            }
            let frame = encode(&Packet::PositionUpdate {
                from: Some(from),
                x,
                y,
                rot,
            });
            shared.registry.read().await.broadcast(&frame, Some(from));
        }
        Packet::UsernameUpdate { username, .. } => {
            let username = sanitize_text(&username);
            let applied = shared
                .directory
                .lock()
                .await
                .apply_username(from, &username);
            if !applied {
                return;
            }
            let frame = encode(&Packet::UsernameUpdate {
                from: Some(from),
                username,
            });
            shared.registry.read().await.broadcast(&frame, Some(from));
        }
        Packet::ColorUpdate { code, .. } => {
            let color = PlayerColor::from_code(code).unwrap_or_default();
            let applied = shared.directory.lock().await.apply_color(from, color);
            if !applied {
                return;
            }
            let frame = encode(&Packet::ColorUpdate {
                from: Some(from),
                code: color.code(),
            });
            shared.registry.read().await.broadcast(&frame, Some(from));
        }
        Packet::ProjectileFire { rot, .. } => {
            let rot = normalize_rotation(rot);
            let applied = shared.directory.lock().await.apply_fire(from, rot);
            if !applied {
                return;
            }
            let frame = encode(&Packet::ProjectileFire {
                from: Some(from),
                rot,
            });
            shared.registry.read().await.broadcast(&frame, Some(from));
        }
        Packet::Roster { .. }
        | Packet::IdAssign { .. }
        | Packet::Join { .. }
        | Packet::Leave { .. } => {
            // Protocol violation, but not worth a connection.
            warn!(
                "session {} sent a server-to-client message kind; ignoring",
                from
            );
        }
    }
}
