//! Ordered buffer of raw frames awaiting the tick processor.
//!
//! Session read loops push concurrently; the tick processor takes a snapshot
//! of everything queued and clears it in one step, so frames arriving
//! mid-drain wait for the next tick. FIFO order holds per sender; nothing is
//! guaranteed across senders. Unbounded on purpose: under overload this
//! trades memory for never dropping a client's input.

use tokio::sync::Mutex;

#[derive(Default)]
pub struct InboundQueue {
    items: Mutex<Vec<(u32, String)>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, from: u32, frame: String) {
        self.items.lock().await.push((from, frame));
    }

    /// Takes a consistent snapshot of all queued frames and empties the queue.
    pub async fn drain(&self) -> Vec<(u32, String)> {
        std::mem::take(&mut *self.items.lock().await)
    }
}
