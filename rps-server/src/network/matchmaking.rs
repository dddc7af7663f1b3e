//! Matchmaking Queue
//!
//! FIFO of players waiting for an opponent. Admission happens in two steps so
//! the caller can refresh the active-match registry between them:
//!
//! 1. [`MatchmakingQueue::read_join`] prunes dead entries and reads the join
//!    request off the new connection.
//! 2. [`MatchmakingQueue::admit`] runs the duplicate-name check against the
//!    queue and the registry, then queues or pairs the candidate.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, instrument};

use crate::network::connection::Connection;
use crate::network::player::Player;
use crate::network::protocol::{ClientMessage, ServerMessage};
use crate::network::registry::ActiveMatchRegistry;

/// Settings the queue needs to answer join requests.
#[derive(Debug, Clone)]
pub struct AdmissionConfig {
    /// Version echoed in `W|<version>||`.
    pub protocol_version: String,
    /// Reason carried in `R|L|<reason>||`.
    pub reject_reason: String,
    /// Bound on the join read. `None` waits indefinitely.
    pub join_timeout: Option<Duration>,
}

/// A connection that sent a well-formed join request.
#[derive(Debug)]
pub struct JoinCandidate {
    /// Requested display name.
    pub name: String,
    /// Connection the request arrived on.
    pub connection: Connection,
}

/// Result of an admission attempt.
#[derive(Debug)]
pub enum Admission {
    /// Acknowledged and waiting for an opponent.
    Queued {
        /// Admitted name.
        name: String,
    },
    /// Admission completed a pair: the two oldest entries, oldest first.
    Paired(Player, Player),
    /// Name already held by a live player; connection closed.
    Rejected {
        /// Refused name.
        name: String,
    },
    /// Acknowledgement could not be delivered; connection closed.
    Dropped,
}

/// Players waiting to be paired.
#[derive(Debug)]
pub struct MatchmakingQueue {
    entries: VecDeque<Player>,
    config: AdmissionConfig,
}

impl MatchmakingQueue {
    /// Create an empty queue.
    pub fn new(config: AdmissionConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            config,
        }
    }

    /// Remove entries whose peer has hung up. Returns how many were removed.
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|player| {
            let closed = player.peer_closed();
            if closed {
                info!("Pruned stale queue entry {}", player.name());
            }
            !closed
        });
        before - self.entries.len()
    }

    /// Prune, then read the join request from `connection`.
    ///
    /// Anything other than a well-formed `P|<name>||` closes the connection
    /// without a reply and yields `None`.
    #[instrument(skip_all, fields(peer = %connection.peer_addr()))]
    pub async fn read_join(&mut self, mut connection: Connection) -> Option<JoinCandidate> {
        self.prune();

        let read = connection.read_client_message();
        let result = match self.config.join_timeout {
            Some(limit) => match tokio::time::timeout(limit, read).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("Join request timed out after {:?}", limit);
                    return None;
                }
            },
            None => read.await,
        };

        match result {
            Ok(ClientMessage::Join { name }) => Some(JoinCandidate { name, connection }),
            Ok(other) => {
                debug!("Dropping join attempt: expected join, got {:?}", other);
                None
            }
            Err(e) => {
                debug!("Dropping join attempt: {}", e);
                None
            }
        }
    }

    /// Check `candidate` for a name collision and admit it if the name is free.
    ///
    /// A collision with a queued entry whose peer has since hung up evicts
    /// that entry and checks again.
    pub async fn admit<W>(
        &mut self,
        candidate: JoinCandidate,
        registry: &ActiveMatchRegistry<W>,
    ) -> Admission
    where
        W: Copy + Eq + std::fmt::Debug,
    {
        let JoinCandidate { name, connection } = candidate;

        loop {
            if registry.contains_name(&name) {
                return self.reject(name, connection).await;
            }
            let Some(idx) = self.entries.iter().position(|p| p.name() == name) else {
                break;
            };
            if !self.entries[idx].peer_closed() {
                return self.reject(name, connection).await;
            }
            if let Some(stale) = self.entries.remove(idx) {
                info!("Evicted stale queue entry holding {}", stale.name());
            }
        }

        let mut player = Player::new(name.clone(), connection);
        let welcome = ServerMessage::Welcome {
            version: self.config.protocol_version.clone(),
        };
        if !player.send(&welcome).await {
            debug!("Could not acknowledge {}", name);
            return Admission::Dropped;
        }

        self.entries.push_back(player);
        debug!("Queued {} ({} waiting)", name, self.entries.len());

        if self.entries.len() >= 2 {
            if let (Some(first), Some(second)) =
                (self.entries.pop_front(), self.entries.pop_front())
            {
                return Admission::Paired(first, second);
            }
        }
        Admission::Queued { name }
    }

    async fn reject(&self, name: String, mut connection: Connection) -> Admission {
        info!("Rejecting duplicate name {}", name);
        let rejection = ServerMessage::Rejected {
            reason: self.config.reject_reason.clone(),
        };
        if let Err(e) = connection.send(&rejection.encode()).await {
            debug!("Rejection to {} not delivered: {}", name, e);
        }
        connection.close();
        Admission::Rejected { name }
    }

    /// Number of waiting players.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of waiting players, oldest first.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(Player::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::connection::loopback_pair;

    fn config() -> AdmissionConfig {
        AdmissionConfig {
            protocol_version: "1".to_string(),
            reject_reason: "Logged in".to_string(),
            join_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Join `name` through a fresh loopback pair; returns the client end.
    async fn join(
        queue: &mut MatchmakingQueue,
        registry: &ActiveMatchRegistry<u32>,
        name: &str,
    ) -> (Admission, Connection) {
        let (server, mut client) = loopback_pair().await;
        client
            .send(&ClientMessage::Join { name: name.to_string() }.encode())
            .await
            .unwrap();
        let candidate = queue.read_join(server).await.expect("well-formed join");
        (queue.admit(candidate, registry).await, client)
    }

    #[tokio::test]
    async fn test_first_player_is_queued() {
        let mut queue = MatchmakingQueue::new(config());
        let registry = ActiveMatchRegistry::<u32>::default();

        let (admission, mut client) = join(&mut queue, &registry, "alice").await;

        assert!(matches!(admission, Admission::Queued { ref name } if name == "alice"));
        assert_eq!(queue.len(), 1);
        assert_eq!(
            client.read_server_message().await.unwrap(),
            ServerMessage::Welcome { version: "1".to_string() }
        );
    }

    #[tokio::test]
    async fn test_second_player_pairs_oldest_first() {
        let mut queue = MatchmakingQueue::new(config());
        let registry = ActiveMatchRegistry::<u32>::default();

        let (_, _alice) = join(&mut queue, &registry, "alice").await;
        let (admission, _bob) = join(&mut queue, &registry, "bob").await;

        match admission {
            Admission::Paired(first, second) => {
                assert_eq!(first.name(), "alice");
                assert_eq!(second.name(), "bob");
            }
            other => panic!("expected a pair, got {:?}", other),
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_of_live_entry_rejected() {
        let mut queue = MatchmakingQueue::new(config());
        let registry = ActiveMatchRegistry::<u32>::default();

        let (_, _alice) = join(&mut queue, &registry, "alice").await;
        let (admission, mut imposter) = join(&mut queue, &registry, "alice").await;

        assert!(matches!(admission, Admission::Rejected { .. }));
        assert_eq!(
            imposter.read_server_message().await.unwrap(),
            ServerMessage::Rejected { reason: "Logged in".to_string() }
        );
        assert!(imposter.read_frame().await.is_err());
        assert_eq!(queue.names().collect::<Vec<_>>(), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_duplicate_of_dead_entry_evicted() {
        let mut queue = MatchmakingQueue::new(config());
        let registry = ActiveMatchRegistry::<u32>::default();

        let (_, alice) = join(&mut queue, &registry, "alice").await;
        alice.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (admission, _again) = join(&mut queue, &registry, "alice").await;
        assert!(matches!(admission, Admission::Queued { .. }));
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn test_admit_evicts_dead_holder_of_name() {
        let mut queue = MatchmakingQueue::new(config());
        let registry = ActiveMatchRegistry::<u32>::default();

        let (_, alice) = join(&mut queue, &registry, "alice").await;
        alice.close();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(queue.len(), 1);

        // Straight to admit, no prune in between.
        let (server, mut again) = loopback_pair().await;
        let candidate = JoinCandidate {
            name: "alice".to_string(),
            connection: server,
        };
        let admission = queue.admit(candidate, &registry).await;

        assert!(matches!(admission, Admission::Queued { ref name } if name == "alice"));
        assert_eq!(queue.len(), 1);
        assert_eq!(
            again.read_server_message().await.unwrap(),
            ServerMessage::Welcome { version: "1".to_string() }
        );
    }

    #[tokio::test]
    async fn test_name_in_active_match_rejected() {
        let mut queue = MatchmakingQueue::new(config());
        let mut registry = ActiveMatchRegistry::<u32>::default();
        registry.track(1, ["alice", "bob"]);

        let (admission, _client) = join(&mut queue, &registry, "bob").await;
        assert!(matches!(admission, Admission::Rejected { .. }));
        assert!(queue.is_empty());

        registry.release(1);
        let (admission, _client) = join(&mut queue, &registry, "bob").await;
        assert!(matches!(admission, Admission::Queued { .. }));
    }

    #[tokio::test]
    async fn test_malformed_join_dropped_silently() {
        let mut queue = MatchmakingQueue::new(config());

        for garbage in ["M|ROCK||", "Q", "P||", "X|alice||"] {
            let (server, mut client) = loopback_pair().await;
            client.send(garbage).await.unwrap();
            assert!(queue.read_join(server).await.is_none(), "{garbage}");
            // No reply, just a close.
            assert!(client.read_frame().await.is_err());
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_join_timeout() {
        let mut queue = MatchmakingQueue::new(AdmissionConfig {
            join_timeout: Some(Duration::from_millis(50)),
            ..config()
        });
        let (server, _silent) = loopback_pair().await;

        assert!(queue.read_join(server).await.is_none());
    }

    #[tokio::test]
    async fn test_prune_removes_hung_up_entries() {
        let mut queue = MatchmakingQueue::new(config());
        let registry = ActiveMatchRegistry::<u32>::default();

        let (_, alice) = join(&mut queue, &registry, "alice").await;
        alice.close();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(queue.prune(), 1);
        assert!(queue.is_empty());
    }
}
