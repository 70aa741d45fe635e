//! Tracking of live sessions, id allocation, and fan-out.

use crate::session::{SessionState, SessionStateCell};
use log::debug;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Everything the server keeps per live session: the outbound channel feeding
/// its writer task, the shared state flag, and the reader task handle the
/// reaper awaits at teardown.
pub struct SessionHandle {
    outbound: UnboundedSender<String>,
    state: SessionStateCell,
    reader: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn new(outbound: UnboundedSender<String>, state: SessionStateCell) -> Self {
        Self {
            outbound,
            state,
            reader: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn state_cell(&self) -> SessionStateCell {
        self.state.clone()
    }

    pub fn take_reader(&mut self) -> Option<JoinHandle<()>> {
        self.reader.take()
    }

    /// Best-effort enqueue onto the session's writer. A closed channel means
    /// the writer already died; the reaper will catch up with the session.
    fn send(&self, id: u32, frame: &str) -> bool {
        match self.outbound.send(frame.to_string()) {
            Ok(()) => true,
            Err(_) => {
                debug!("outbound channel for session {} is closed", id);
                false
            }
        }
    }
}

/// Live-session map plus the id allocator.
///
/// Ids are handed out lowest-free-first: freed ids sit in a min-heap and are
/// preferred over extending the counter, so departures close gaps. An id
/// returns to the pool only after its session's teardown completes, which
/// keeps an in-teardown id unallocatable.
pub struct SessionRegistry {
    sessions: HashMap<u32, SessionHandle>,
    free_ids: BinaryHeap<Reverse<u32>>,
    next_id: u32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            free_ids: BinaryHeap::new(),
            next_id: 0,
        }
    }

    /// Returns the smallest non-negative id not held by any live or
    /// in-teardown session.
    pub fn allocate_id(&mut self) -> u32 {
        match self.free_ids.pop() {
            Some(Reverse(id)) => id,
            None => {
                let id = self.next_id;
                self.next_id += 1;
                id
            }
        }
    }

    /// Makes an id reusable again. Called exactly once per session, after
    /// teardown has finished.
    pub fn release_id(&mut self, id: u32) {
        debug_assert!(!self.sessions.contains_key(&id));
        self.free_ids.push(Reverse(id));
    }

    pub fn register(&mut self, id: u32, handle: SessionHandle) {
        debug_assert!(!self.sessions.contains_key(&id));
        self.sessions.insert(id, handle);
    }

    pub fn attach_reader(&mut self, id: u32, reader: JoinHandle<()>) {
        if let Some(handle) = self.sessions.get_mut(&id) {
            handle.reader = Some(reader);
        }
    }

    pub fn remove(&mut self, id: u32) -> Option<SessionHandle> {
        self.sessions.remove(&id)
    }

    pub fn send_to(&self, id: u32, frame: &str) -> bool {
        match self.sessions.get(&id) {
            Some(handle) => handle.send(id, frame),
            None => false,
        }
    }

    /// Sends a pre-encoded frame to every live session except `exclude`.
    /// Delivery is best-effort per recipient; one dead channel never blocks
    /// the rest.
    pub fn broadcast(&self, frame: &str, exclude: Option<u32>) {
        for (id, handle) in &self.sessions {
            if Some(*id) == exclude {
                continue;
            }
            if matches!(
                handle.state(),
                SessionState::Draining | SessionState::Closed
            ) {
                continue;
            }
            handle.send(*id, frame);
        }
    }

    /// Ids of sessions whose read loop has ended, awaiting the reaper.
    pub fn draining_ids(&self) -> Vec<u32> {
        self.sessions
            .iter()
            .filter(|(_, handle)| handle.state() == SessionState::Draining)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
