//! Session lifecycle and event dispatch.
//!
//! A [`Session`] owns one client connection's association with a backend
//! server. It is created by the acceptor once the whitelist gate passes,
//! lives for exactly one connection, and is torn down when the backend
//! drops or the client quits.
//!
//! Events for a session are queued through its [`SessionSender`] and
//! consumed by a driver task owned by that session, so events for one
//! session never run concurrently while distinct sessions stay fully
//! independent.
//!
//! State machine:
//! `Connecting → Bound → (TransferPending → Bound)* → Disconnected`.

pub mod handler;

pub use handler::{EventOutcome, LoadBalancedTransfers, NoopHandler, SessionHandler, TransferOutcome};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ProxyError;
use crate::registry::Server;
use crate::status::PlayerCounts;
use crate::transport::{red, ClientConnection, Packet};

/// Lifecycle states of a session. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Bound,
    TransferPending,
    Disconnected,
}

/// Events dispatched to a session, in submission order.
#[derive(Debug)]
pub enum SessionEvent {
    /// Packet travelling towards the client. Observation point only.
    ClientBoundPacket(Packet),
    /// Packet travelling towards the backend. Observation point only.
    ServerBoundPacket(Packet),
    /// Reassignment of the session's backend binding.
    Transfer { target: Arc<Server> },
    /// The bound backend dropped the connection.
    ServerDisconnect,
    /// The client quit.
    Quit,
}

/// Submission handle for a session's event queue.
///
/// Cloneable; sends fail once the session's driver has stopped.
#[derive(Clone)]
pub struct SessionSender {
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionSender {
    pub fn client_bound_packet(&self, packet: Packet) -> Result<(), ProxyError> {
        self.send(SessionEvent::ClientBoundPacket(packet))
    }

    pub fn server_bound_packet(&self, packet: Packet) -> Result<(), ProxyError> {
        self.send(SessionEvent::ServerBoundPacket(packet))
    }

    pub fn transfer(&self, target: Arc<Server>) -> Result<(), ProxyError> {
        self.send(SessionEvent::Transfer { target })
    }

    pub fn server_disconnect(&self) -> Result<(), ProxyError> {
        self.send(SessionEvent::ServerDisconnect)
    }

    pub fn quit(&self) -> Result<(), ProxyError> {
        self.send(SessionEvent::Quit)
    }

    fn send(&self, event: SessionEvent) -> Result<(), ProxyError> {
        self.tx
            .send(event)
            .map_err(|_| ProxyError::Session("session event queue is closed".to_string()))
    }
}

/// Active sessions keyed by display name (case-insensitive).
///
/// Lets collaborators such as an admin transfer surface find a player's
/// session while it is alive.
#[derive(Default)]
pub struct SessionMap {
    inner: DashMap<String, Arc<Session>>,
}

impl SessionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, display_name: &str) -> Option<Arc<Session>> {
        self.inner
            .get(&display_name.to_ascii_lowercase())
            .map(|s| s.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn insert(&self, session: Arc<Session>) {
        self.inner
            .insert(session.display_name().to_ascii_lowercase(), session);
    }

    /// Removes the entry only if it still belongs to `id`, so a reconnect
    /// under the same name is not evicted by the old session's teardown.
    fn remove_if_id(&self, display_name: &str, id: Uuid) {
        self.inner
            .remove_if(&display_name.to_ascii_lowercase(), |_, s| s.id() == id);
    }
}

/// One client connection's binding to a backend server.
pub struct Session {
    id: Uuid,
    conn: Arc<dyn ClientConnection>,
    handler: Arc<dyn SessionHandler>,
    server: RwLock<Arc<Server>>,
    state: RwLock<SessionState>,
    counts: Arc<PlayerCounts>,
    sessions: Arc<SessionMap>,
    sender: SessionSender,
}

impl Session {
    /// Creates a session bound to `server` and starts its driver task.
    ///
    /// Registers the session in `sessions`, counts the player as joined and
    /// hands back the event submission handle. The caller logs the join.
    pub fn spawn(
        conn: Arc<dyn ClientConnection>,
        server: Arc<Server>,
        handler: Arc<dyn SessionHandler>,
        counts: Arc<PlayerCounts>,
        sessions: Arc<SessionMap>,
    ) -> (Arc<Session>, SessionSender) {
        let (tx, mut rx) = mpsc::unbounded_channel();

        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            conn,
            handler,
            server: RwLock::new(server),
            state: RwLock::new(SessionState::Connecting),
            counts: Arc::clone(&counts),
            sessions: Arc::clone(&sessions),
            sender: SessionSender { tx: tx.clone() },
        });

        counts.player_joined();
        sessions.insert(Arc::clone(&session));

        let driver = Arc::clone(&session);
        tokio::spawn(async move {
            // Acceptor handoff is complete once the driver is running.
            driver.set_state(SessionState::Bound).await;

            while let Some(event) = rx.recv().await {
                driver.dispatch(event).await;
                if driver.state().await == SessionState::Disconnected {
                    break;
                }
            }
        });

        (session, SessionSender { tx })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn display_name(&self) -> &str {
        self.conn.display_name()
    }

    pub fn conn(&self) -> &Arc<dyn ClientConnection> {
        &self.conn
    }

    /// Handle for submitting events to this session's queue.
    pub fn sender(&self) -> SessionSender {
        self.sender.clone()
    }

    /// The currently bound backend server.
    pub async fn server(&self) -> Arc<Server> {
        self.server.read().await.clone()
    }

    pub async fn state(&self) -> SessionState {
        *self.state.read().await
    }

    async fn set_state(&self, state: SessionState) {
        *self.state.write().await = state;
    }

    async fn dispatch(&self, event: SessionEvent) {
        match event {
            SessionEvent::ClientBoundPacket(packet) => {
                if self.handler.handle_client_bound_packet(self, &packet).await == EventOutcome::Cancel {
                    debug!(
                        "Client-bound packet {} for {} suppressed",
                        packet.id,
                        self.display_name()
                    );
                }
            }
            SessionEvent::ServerBoundPacket(packet) => {
                if self.handler.handle_server_bound_packet(self, &packet).await == EventOutcome::Cancel {
                    debug!(
                        "Server-bound packet {} from {} suppressed",
                        packet.id,
                        self.display_name()
                    );
                }
            }
            SessionEvent::Transfer { target } => self.transfer(target).await,
            SessionEvent::ServerDisconnect => match self.handler.handle_server_disconnect(self).await {
                EventOutcome::Proceed => {
                    self.conn.disconnect(&red("Lost connection to server")).await;
                    self.close("server disconnected").await;
                }
                EventOutcome::Cancel => {
                    debug!("Server disconnect for {} handled upstream", self.display_name());
                }
            },
            SessionEvent::Quit => {
                self.handler.handle_quit(self).await;
                self.close("client quit").await;
            }
        }
    }

    async fn transfer(&self, target: Arc<Server>) {
        if self.state().await == SessionState::Disconnected {
            return;
        }
        self.set_state(SessionState::TransferPending).await;

        match self.handler.handle_transfer(self, Arc::clone(&target)).await {
            TransferOutcome::Proceed(destination) => {
                let previous = self.server().await;
                if Arc::ptr_eq(&previous, &destination) {
                    debug!(
                        "{} is already connected to server {}",
                        self.display_name(),
                        destination.name()
                    );
                } else {
                    *self.server.write().await = Arc::clone(&destination);
                    info!(
                        "{} has been transferred to server {} in group {}",
                        self.display_name(),
                        destination.name(),
                        destination.group()
                    );
                }
                self.set_state(SessionState::Bound).await;
            }
            TransferOutcome::Cancel => {
                self.set_state(SessionState::Bound).await;
                info!(
                    "Transfer of {} to server {} was cancelled",
                    self.display_name(),
                    target.name()
                );
            }
        }
    }

    /// Idempotent teardown: marks the session terminal, releases its map
    /// entry and decrements the local player count.
    async fn close(&self, reason: &str) {
        {
            let mut state = self.state.write().await;
            if *state == SessionState::Disconnected {
                return;
            }
            *state = SessionState::Disconnected;
        }
        self.counts.player_left();
        self.sessions.remove_if_id(self.display_name(), self.id);
        info!("{} has been disconnected: {}", self.display_name(), reason);
    }
}
