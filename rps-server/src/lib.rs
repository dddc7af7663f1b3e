//! # RPS Match Server
//!
//! Matchmaking and session server for two-player rock-paper-scissors over a
//! pipe-delimited text protocol.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RPS MATCH SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  game/              - Rules (pure)                           │
//! │  └── rules.rs       - Moves, outcomes, round resolution      │
//! │                                                              │
//! │  network/           - Networking                             │
//! │  ├── protocol.rs    - Framing and message codec              │
//! │  ├── connection.rs  - Buffered framed TCP connection         │
//! │  ├── player.rs      - Named player owning a connection       │
//! │  ├── matchmaking.rs - Join admission and FIFO pairing        │
//! │  ├── registry.rs    - Names held by live matches             │
//! │  ├── session.rs     - Per-match state machine                │
//! │  └── server.rs      - Acceptor loop and worker reaping       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//!
//! One acceptor task owns the queue and the registry. Each match runs as its
//! own task in a `JoinSet`; the acceptor reaps finished tasks and releases
//! their names, so no state is shared across tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod game;
pub mod network;

// Re-export commonly used types
pub use game::rules::{Move, Outcome};
pub use network::protocol::{ClientMessage, ServerMessage};
pub use network::server::{MatchServer, ServerConfig, ServerError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol version sent in the welcome message.
pub const PROTOCOL_VERSION: &str = "1";

/// Reason sent when a name is already in use.
pub const REJECT_REASON: &str = "Logged in";
