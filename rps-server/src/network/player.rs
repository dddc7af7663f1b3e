//! Player Records
//!
//! A named participant that owns its connection from the moment its join
//! request is accepted until the connection is closed.

use tracing::debug;

use crate::game::rules::Move;
use crate::network::connection::{Connection, MessageError};
use crate::network::protocol::{ClientMessage, FrameError, ServerMessage};

/// A player waiting in the queue or seated in a match.
#[derive(Debug)]
pub struct Player {
    name: String,
    connection: Option<Connection>,
    pending_move: Option<Move>,
    wants_rematch: bool,
}

impl Player {
    /// Create a player that owns `connection`.
    pub fn new(name: impl Into<String>, connection: Connection) -> Self {
        Self {
            name: name.into(),
            connection: Some(connection),
            pending_move: None,
            wants_rematch: true,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the connection is still held open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Peek for a hang-up. A player already closed counts as gone.
    pub fn peer_closed(&self) -> bool {
        self.connection.as_ref().map_or(true, Connection::peer_closed)
    }

    /// Move submitted this round, if any.
    pub fn pending_move(&self) -> Option<Move> {
        self.pending_move
    }

    /// Store this round's move.
    pub fn set_move(&mut self, mv: Move) {
        self.pending_move = Some(mv);
    }

    /// Forget the previous round's move.
    pub fn clear_move(&mut self) {
        self.pending_move = None;
    }

    /// Whether the player asked for another round.
    pub fn wants_rematch(&self) -> bool {
        self.wants_rematch
    }

    /// Record rematch intent.
    pub fn set_wants_rematch(&mut self, wants: bool) {
        self.wants_rematch = wants;
    }

    /// Send a message. A failed write closes the connection.
    ///
    /// Returns whether the message went out.
    pub async fn send(&mut self, message: &ServerMessage) -> bool {
        let Some(connection) = self.connection.as_mut() else {
            return false;
        };
        match connection.send(&message.encode()).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Write to {} failed: {}", self.name, e);
                self.disconnect();
                false
            }
        }
    }

    /// Read one message. A closed player yields `FrameError::Closed`.
    pub async fn read_message(&mut self) -> Result<ClientMessage, MessageError> {
        match self.connection.as_mut() {
            Some(connection) => connection.read_client_message().await,
            None => Err(FrameError::Closed.into()),
        }
    }

    /// Read the rematch reply: `C` keeps the connection, anything else
    /// (including a failed read) closes it.
    pub async fn await_rematch(&mut self) {
        self.wants_rematch = false;
        if !self.is_connected() {
            return;
        }
        match self.read_message().await {
            Ok(ClientMessage::Rematch) => self.wants_rematch = true,
            Ok(other) => {
                debug!("{} declined rematch with {:?}", self.name, other);
                self.disconnect();
            }
            Err(e) => {
                debug!("{} gone during rematch: {}", self.name, e);
                self.disconnect();
            }
        }
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connection::loopback_pair;

    #[tokio::test]
    async fn test_rematch_accept_keeps_connection() {
        let (server, mut client) = loopback_pair().await;
        let mut player = Player::new("alice", server);

        client.send("C").await.unwrap();
        player.await_rematch().await;

        assert!(player.wants_rematch());
        assert!(player.is_connected());
    }

    #[tokio::test]
    async fn test_rematch_decline_closes() {
        let (server, mut client) = loopback_pair().await;
        let mut player = Player::new("alice", server);

        client.send("Q").await.unwrap();
        player.await_rematch().await;

        assert!(!player.wants_rematch());
        assert!(!player.is_connected());
        assert!(client.read_frame().await.is_err());
    }

    #[tokio::test]
    async fn test_closed_player_cannot_send() {
        let (server, _client) = loopback_pair().await;
        let mut player = Player::new("alice", server);
        player.disconnect();

        assert!(!player.send(&ServerMessage::Forfeit).await);
        assert!(player.peer_closed());
        assert!(player.read_message().await.is_err());
    }

    #[tokio::test]
    async fn test_move_slot() {
        let (server, _client) = loopback_pair().await;
        let mut player = Player::new("alice", server);

        assert_eq!(player.pending_move(), None);
        player.set_move(Move::Paper);
        assert_eq!(player.pending_move(), Some(Move::Paper));
        player.clear_move();
        assert_eq!(player.pending_move(), None);
    }
}
