//! Centralized session teardown.
//!
//! Sessions only flag themselves `Draining`; everything destructive happens
//! here, once per session, on the tick cadence. Registry and directory locks
//! are taken in that fixed order and never overlap within a teardown step.

use crate::network::SharedState;
use crate::session::SessionState;
use log::{error, info};
use shared::{encode, Packet};

/// Scans for sessions whose read loop has ended and tears each one down:
/// await the reader task, close the transport, remove the player, notify the
/// remaining sessions, and only then make the id reusable.
pub async fn reap(shared: &SharedState) {
    let draining = shared.registry.read().await.draining_ids();

    for id in draining {
        let handle = shared.registry.write().await.remove(id);
        let Some(mut handle) = handle else {
            // Already torn down.
            continue;
        };

        if let Some(reader) = handle.take_reader() {
            if let Err(e) = reader.await {
                error!("session {} reader task failed: {}", id, e);
            }
        }

        let state = handle.state_cell();
        // Dropping the handle closes the outbound channel; the writer task
        // drains out and the transport's write half shuts down with it.
        drop(handle);

        shared.directory.lock().await.remove_player(id);

        let leave = encode(&Packet::Leave { id });
        {
            let mut registry = shared.registry.write().await;
            registry.broadcast(&leave, None);
            registry.release_id(id);
        }

        state.set(SessionState::Closed);
        info!("session {} reaped", id);
    }
}
