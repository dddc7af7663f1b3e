//! Network Layer
//!
//! TCP transport, pipe-delimited wire protocol, matchmaking and match sessions.
//! Game rules live in `game/`; everything here owns sockets.

pub mod connection;
pub mod matchmaking;
pub mod player;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod session;

pub use connection::{Connection, MessageError};
pub use matchmaking::{Admission, AdmissionConfig, JoinCandidate, MatchmakingQueue};
pub use player::Player;
pub use protocol::{ClientMessage, Frame, FrameError, ProtocolError, ServerMessage};
pub use registry::{ActiveMatchRegistry, WorkerId};
pub use server::{MatchServer, ServerConfig, ServerError};
pub use session::{MatchId, MatchSession, MatchSummary, SessionEnd, SessionState};
