//! TCP listener and server assembly.

use crate::directory::PlayerDirectory;
use crate::queue::InboundQueue;
use crate::registry::{SessionHandle, SessionRegistry};
use crate::session::{self, SessionStateCell};
use crate::tick;
use log::{error, info};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex, RwLock};

/// Timing knobs, exposed so tests can shrink them.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Cadence of the tick/reaper loop.
    pub tick_interval: Duration,
    /// Delay between the roster snapshot and the id assignment, giving the
    /// client time to initialize before it becomes addressable.
    pub join_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(20),
            join_grace: Duration::from_millis(200),
        }
    }
}

/// State shared by the sessions, the tick processor, and the reaper.
///
/// Each field is its own mutual-exclusion domain. No task holds two of these
/// locks at once except the reaper during teardown, which always takes the
/// registry before the directory.
pub struct SharedState {
    pub registry: RwLock<SessionRegistry>,
    pub directory: Mutex<PlayerDirectory>,
    pub queue: InboundQueue,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(SessionRegistry::new()),
            directory: Mutex::new(PlayerDirectory::new()),
            queue: InboundQueue::new(),
        }
    }
}

impl Default for SharedState {
    fn default() -> Self {
        Self::new()
    }
}

/// The listening server: accepts connections and spawns a session task per
/// client, with the tick/reaper loop running alongside.
pub struct Server {
    listener: TcpListener,
    shared: Arc<SharedState>,
    config: ServerConfig,
}

impl Server {
    pub async fn new(addr: &str, config: ServerConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            shared: Arc::new(SharedState::new()),
            config,
        })
    }

    /// The actually bound address; tests bind port 0 and read it back here.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the process is stopped. A failed accept is
    /// logged and retried; it never ends the loop.
    pub async fn run(self) -> io::Result<()> {
        tokio::spawn(tick::run(
            Arc::clone(&self.shared),
            self.config.tick_interval,
        ));

        loop {
            match self.listener.accept().await {
                Ok((stream, _)) => self.spawn_session(stream).await,
                Err(e) => {
                    error!("accept failed: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn spawn_session(&self, stream: TcpStream) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let state = SessionStateCell::new();

        let id = {
            let mut registry = self.shared.registry.write().await;
            let id = registry.allocate_id();
            registry.register(id, SessionHandle::new(outbound_tx, state.clone()));
            id
        };

        let task = tokio::spawn(session::run_session(
            id,
            stream,
            state,
            outbound_rx,
            Arc::clone(&self.shared),
            self.config.join_grace,
        ));
        self.shared.registry.write().await.attach_reader(id, task);
    }
}
