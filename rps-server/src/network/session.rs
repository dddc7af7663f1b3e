//! Match Session
//!
//! Drives one opponent pair through rounds until a forfeit, a disconnect or
//! a declined rematch ends the match.
//!
//! ```text
//! AnnounceOpponent -> CollectMoves -> Resolve -> Report -> RematchNegotiation
//!        ^                 |                                     |
//!        |                 +--(forfeit)--> Terminated <--(no)----+
//!        +-------------------------(both accept)-----------------+
//! ```
//!
//! A session owns both connections and shares nothing with other matches or
//! the acceptor loop; it runs as its own task until it terminates.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::game::rules::{resolve_pair, Move, Outcome};
use crate::network::player::Player;
use crate::network::protocol::{ClientMessage, ServerMessage};

/// Unique match identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatchId(uuid::Uuid);

impl MatchId {
    /// Fresh random identifier.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Short hex prefix for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Tell each player who they face.
    AnnounceOpponent,
    /// Wait for both moves.
    CollectMoves,
    /// Both moves are in.
    Resolve,
    /// Send each player its result.
    Report {
        /// Outcome per seat.
        outcomes: [Outcome; 2],
        /// Move per seat.
        moves: [Move; 2],
    },
    /// Ask both players whether to go again.
    RematchNegotiation,
    /// Match is over.
    Terminated(SessionEnd),
}

/// Why a match ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// A player hung up or broke protocol while moves were collected.
    Forfeit {
        /// Name of the forfeiting player.
        by: String,
    },
    /// At least one player did not ask for a rematch.
    Declined,
    /// A connection failed before the round started.
    Disconnected,
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Forfeit { by } => write!(f, "forfeit by {}", by),
            SessionEnd::Declined => f.write_str("rematch declined"),
            SessionEnd::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// What a finished session reports back to the acceptor loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    /// Match identifier.
    pub id: MatchId,
    /// Names by seat.
    pub players: [String; 2],
    /// Rounds resolved (forfeits excluded).
    pub rounds: u32,
    /// How it ended.
    pub end: SessionEnd,
}

/// A live match between two players.
#[derive(Debug)]
pub struct MatchSession {
    /// Match identifier.
    pub id: MatchId,
    players: [Player; 2],
    rounds: u32,
}

impl MatchSession {
    /// Seat `first` and `second` (first is announced and reported first).
    pub fn new(id: MatchId, first: Player, second: Player) -> Self {
        Self {
            id,
            players: [first, second],
            rounds: 0,
        }
    }

    /// Names by seat.
    pub fn names(&self) -> [String; 2] {
        [
            self.players[0].name().to_string(),
            self.players[1].name().to_string(),
        ]
    }

    /// Run rounds until the match terminates, then close both connections.
    #[instrument(skip(self), fields(match_id = %self.id.short()))]
    pub async fn run(mut self) -> MatchSummary {
        info!("{} vs {}", self.players[0].name(), self.players[1].name());

        let mut state = SessionState::AnnounceOpponent;
        let end = loop {
            state = match state {
                SessionState::AnnounceOpponent => self.announce().await,
                SessionState::CollectMoves => self.collect_moves().await,
                SessionState::Resolve => self.resolve_round(),
                SessionState::Report { outcomes, moves } => self.report(outcomes, moves).await,
                SessionState::RematchNegotiation => self.negotiate_rematch().await,
                SessionState::Terminated(end) => break end,
            };
        };

        for player in &mut self.players {
            player.disconnect();
        }
        info!("Match over after {} round(s): {}", self.rounds, end);

        MatchSummary {
            id: self.id,
            players: self.names(),
            rounds: self.rounds,
            end,
        }
    }

    async fn announce(&mut self) -> SessionState {
        for seat in 0..2 {
            let begin = ServerMessage::Begin {
                opponent: self.players[1 - seat].name().to_string(),
            };
            if !self.players[seat].send(&begin).await {
                warn!("Could not announce opponent to {}", self.players[seat].name());
                return SessionState::Terminated(SessionEnd::Disconnected);
            }
        }
        SessionState::CollectMoves
    }

    async fn collect_moves(&mut self) -> SessionState {
        for player in &mut self.players {
            player.clear_move();
        }

        while self.players.iter().any(|p| p.pending_move().is_none()) {
            let (seat, message) = {
                let [first, second] = &mut self.players;
                let first_waiting = first.pending_move().is_none();
                let second_waiting = second.pending_move().is_none();
                tokio::select! {
                    message = first.read_message(), if first_waiting => (0, message),
                    message = second.read_message(), if second_waiting => (1, message),
                }
            };

            match message {
                Ok(ClientMessage::Move(mv)) => {
                    debug!("{} played {}", self.players[seat].name(), mv);
                    self.players[seat].set_move(mv);
                }
                Ok(other) => {
                    debug!("{} sent {:?} instead of a move", self.players[seat].name(), other);
                    return self.forfeit(seat).await;
                }
                Err(e) => {
                    debug!("{} failed while moving: {}", self.players[seat].name(), e);
                    return self.forfeit(seat).await;
                }
            }
        }
        SessionState::Resolve
    }

    async fn forfeit(&mut self, seat: usize) -> SessionState {
        let by = self.players[seat].name().to_string();
        warn!("{} forfeits", by);

        if !self.players[1 - seat].send(&ServerMessage::Forfeit).await {
            debug!("Forfeit notice to {} not delivered", self.players[1 - seat].name());
        }
        self.players[seat].disconnect();
        for player in &mut self.players {
            player.set_wants_rematch(false);
        }
        SessionState::Terminated(SessionEnd::Forfeit { by })
    }

    fn resolve_round(&mut self) -> SessionState {
        let (Some(first), Some(second)) = (
            self.players[0].pending_move(),
            self.players[1].pending_move(),
        ) else {
            return SessionState::Terminated(SessionEnd::Disconnected);
        };

        let (first_outcome, second_outcome) = resolve_pair(first, second);
        self.rounds += 1;
        info!(
            "Round {}: {} {} ({}) vs {} {} ({})",
            self.rounds,
            self.players[0].name(),
            first,
            first_outcome,
            self.players[1].name(),
            second,
            second_outcome,
        );

        SessionState::Report {
            outcomes: [first_outcome, second_outcome],
            moves: [first, second],
        }
    }

    async fn report(&mut self, outcomes: [Outcome; 2], moves: [Move; 2]) -> SessionState {
        for seat in 0..2 {
            let result = ServerMessage::Result {
                outcome: outcomes[seat],
                opponent_move: moves[1 - seat],
            };
            if !self.players[seat].send(&result).await {
                warn!("Result not delivered to {}", self.players[seat].name());
            }
        }
        SessionState::RematchNegotiation
    }

    async fn negotiate_rematch(&mut self) -> SessionState {
        {
            let [first, second] = &mut self.players;
            tokio::join!(first.await_rematch(), second.await_rematch());
        }

        // A lone player has nobody left to play.
        for seat in 0..2 {
            if self.players[seat].is_connected() && !self.players[1 - seat].wants_rematch() {
                self.players[seat].disconnect();
            }
        }

        let again = self
            .players
            .iter()
            .all(|p| p.is_connected() && p.wants_rematch());
        if again {
            debug!("Both players want a rematch");
            SessionState::AnnounceOpponent
        } else {
            SessionState::Terminated(SessionEnd::Declined)
        }
    }
}
