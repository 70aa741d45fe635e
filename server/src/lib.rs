//! # Session State Server
//!
//! Authoritative state engine for a real-time multiplayer session. The
//! server accepts TCP connections, assigns each one an identity, keeps the
//! canonical map of player state (position, rotation, username, color), and
//! fans every accepted change out to all other connected sessions.
//!
//! ## Architecture
//!
//! The design hinges on a single-writer rule: session tasks decode nothing
//! and mutate nothing — their read loops push raw frames onto the inbound
//! queue, and all world mutation plus every broadcast decision happens
//! inside the tick processor, one task on a fixed cadence. That one funnel
//! is what makes shared player state safe without fine-grained locking.
//!
//! Per connection the server runs one session task (framed read loop) and
//! one writer task (outbound channel into the socket). Teardown is just as
//! centralized as mutation: a dying session only flags itself `Draining`,
//! and the lifecycle reaper performs the one-and-only removal pass.
//!
//! ## Module Organization
//!
//! - [`network`]: listener, accept loop, server assembly and configuration
//! - [`session`]: per-connection lifecycle, greeting sequence, read loop
//! - [`queue`]: inbound frame buffer between sessions and the tick loop
//! - [`registry`]: live-session map, id allocation, best-effort fan-out
//! - [`directory`]: the authoritative player map and spawn placement
//! - [`tick`]: the fixed-cadence processor applying and broadcasting effects
//! - [`reaper`]: exactly-once teardown of dead sessions
//!
//! ## Usage
//!
//! ```rust,no_run
//! use server::network::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new("127.0.0.1:50000", ServerConfig::default()).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod directory;
pub mod network;
pub mod queue;
pub mod reaper;
pub mod registry;
pub mod session;
pub mod tick;
