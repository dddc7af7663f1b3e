//! Match Server
//!
//! Acceptor loop: accepts connections, runs matchmaking admission, and hands
//! every completed pair to its own match task. Finished tasks are reaped from
//! the same loop, which is the only writer of the active-match registry.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::network::connection::Connection;
use crate::network::matchmaking::{Admission, AdmissionConfig, MatchmakingQueue};
use crate::network::player::Player;
use crate::network::protocol::MAX_MESSAGE_LEN;
use crate::network::registry::{ActiveMatchRegistry, WorkerId, DEFAULT_CAPACITY};
use crate::network::session::{MatchId, MatchSession, MatchSummary};
use crate::{PROTOCOL_VERSION, REJECT_REASON};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Version echoed to accepted players.
    pub protocol_version: String,
    /// Reason sent with a duplicate-name rejection.
    pub reject_reason: String,
    /// Identities the active-match registry tracks at most.
    pub registry_capacity: usize,
    /// Cap on one incoming message, terminator included.
    pub max_message_len: usize,
    /// Bound on reading a join request. `None` waits indefinitely.
    pub join_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            protocol_version: PROTOCOL_VERSION.to_string(),
            reject_reason: REJECT_REASON.to_string(),
            registry_capacity: DEFAULT_CAPACITY,
            max_message_len: MAX_MESSAGE_LEN,
            join_timeout: None,
        }
    }
}

impl ServerConfig {
    /// Listen on all interfaces at `port`.
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            ..Default::default()
        }
    }

    /// Settings for the matchmaking queue.
    pub fn admission(&self) -> AdmissionConfig {
        AdmissionConfig {
            protocol_version: self.protocol_version.clone(),
            reject_reason: self.reject_reason.clone(),
            join_timeout: self.join_timeout,
        }
    }
}

/// Match server errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind the listening socket.
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying error.
        source: io::Error,
    },

    /// Bound, but the local address could not be read back.
    #[error("Failed to read local address: {0}")]
    LocalAddr(io::Error),
}

/// The matchmaking and match server.
pub struct MatchServer {
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
}

impl MatchServer {
    /// Bind the listening socket.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: config.bind_addr,
                source,
            })?;
        let local_addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            listener,
            local_addr,
            shutdown_tx,
        })
    }

    /// Address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// One-line readiness notice for the bound port.
    pub fn readiness_notice(&self) -> String {
        format!("RPS server listening on port {}", self.local_addr.port())
    }

    /// Stop the acceptor loop. Live matches are torn down with it.
    ///
    /// Sticky: a request made before `run` starts still stops it.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run the acceptor loop until shutdown.
    ///
    /// Accept failures are logged and the loop carries on, so this only
    /// returns once shutdown is requested.
    #[instrument(skip(self), fields(addr = %self.local_addr))]
    pub async fn run(&self) {
        let mut queue = MatchmakingQueue::new(self.config.admission());
        let mut registry: ActiveMatchRegistry = ActiveMatchRegistry::with_capacity(
            self.config.registry_capacity,
        );
        let mut workers: JoinSet<MatchSummary> = JoinSet::new();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            queue.prune();

            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            info!("New connection from {}", addr);
                            self.handle_connection(stream, &mut queue, &mut registry, &mut workers)
                                .await;
                        }
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                            debug!("Accept interrupted, retrying");
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                Some(joined) = workers.join_next_with_id(), if !workers.is_empty() => {
                    reap(&mut registry, joined);
                }
                _ = async { let _ = shutdown_rx.wait_for(|&stopped| stopped).await; } => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        workers.shutdown().await;
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        queue: &mut MatchmakingQueue,
        registry: &mut ActiveMatchRegistry,
        workers: &mut JoinSet<MatchSummary>,
    ) {
        let connection = match Connection::new(stream, self.config.max_message_len) {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Dropping connection without peer address: {}", e);
                return;
            }
        };

        let Some(candidate) = queue.read_join(connection).await else {
            return;
        };

        // Matches may have ended while the join request was being read.
        while let Some(joined) = workers.try_join_next_with_id() {
            reap(registry, joined);
        }

        match queue.admit(candidate, registry).await {
            Admission::Queued { name } => info!("{} is waiting for an opponent", name),
            Admission::Rejected { name } => info!("Rejected {}: name in use", name),
            Admission::Dropped => debug!("Join acknowledgement failed"),
            Admission::Paired(first, second) => launch(first, second, registry, workers),
        }
    }
}

/// Start a match task and record both names against its handle.
fn launch(
    first: Player,
    second: Player,
    registry: &mut ActiveMatchRegistry,
    workers: &mut JoinSet<MatchSummary>,
) {
    let session = MatchSession::new(MatchId::new(), first, second);
    let match_id = session.id;
    let names = session.names();

    let worker = workers.spawn(session.run()).id();
    let tracked = registry.track(worker, names.iter().map(String::as_str));
    if tracked < names.len() {
        warn!("Only {} of {} names tracked for match {}", tracked, names.len(), match_id.short());
    }

    info!(
        "Created match {} ({} vs {}), {} active identities",
        match_id.short(),
        names[0],
        names[1],
        registry.len()
    );
}

/// Release the registry entries of a finished match task.
fn reap(
    registry: &mut ActiveMatchRegistry,
    joined: Result<(WorkerId, MatchSummary), JoinError>,
) {
    let worker = match joined {
        Ok((worker, summary)) => {
            info!(
                "Match {} ended: {} ({} round(s))",
                summary.id.short(),
                summary.end,
                summary.rounds
            );
            worker
        }
        Err(e) => {
            if e.is_panic() {
                error!("Match worker {} panicked", e.id());
            } else {
                debug!("Match worker {} cancelled", e.id());
            }
            e.id()
        }
    };

    let released = registry.release(worker);
    debug!("Released {:?}", released);
}
