//! Connection acceptance and the whitelist gate.
//!
//! The acceptor owns the front door: it accepts connections from the
//! protocol listener, applies the whitelist, routes each admitted player
//! onto a server of the default group and hands the connection over to a
//! fresh session. Whatever goes wrong with one connection is logged and
//! ends with that connection only; the loop keeps accepting.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::balancer::select_server;
use crate::config::WhitelistSettings;
use crate::registry::{Server, ServerRegistry};
use crate::session::{Session, SessionHandler, SessionMap, SessionSender};
use crate::status::PlayerCounts;
use crate::transport::{red, ClientConnection, ProxyListener, TRANSFER_REQUEST_ID};

/// Accepts connections and turns them into sessions.
pub struct ConnectionAcceptor {
    registry: Arc<ServerRegistry>,
    counts: Arc<PlayerCounts>,
    sessions: Arc<SessionMap>,
    handler: Arc<dyn SessionHandler>,
    whitelist: WhitelistSettings,
    default_group: String,
    occupancy_threshold: u32,
}

impl ConnectionAcceptor {
    pub fn new(
        registry: Arc<ServerRegistry>,
        counts: Arc<PlayerCounts>,
        sessions: Arc<SessionMap>,
        handler: Arc<dyn SessionHandler>,
        whitelist: WhitelistSettings,
        default_group: String,
        occupancy_threshold: u32,
    ) -> Self {
        Self {
            registry,
            counts,
            sessions,
            handler,
            whitelist,
            default_group,
            occupancy_threshold,
        }
    }

    /// Runs the accept loop until the listener fails.
    pub async fn run(self: Arc<Self>, listener: Arc<dyn ProxyListener>) {
        loop {
            match listener.accept().await {
                Ok(conn) => {
                    let acceptor = Arc::clone(&self);
                    tokio::spawn(async move {
                        acceptor.handle_connection(conn).await;
                    });
                }
                Err(e) => {
                    error!("Unable to accept connection: {}", e);
                    break;
                }
            }
        }
    }

    /// Gates, binds and then drives one connection for its lifetime.
    async fn handle_connection(&self, conn: Arc<dyn ClientConnection>) {
        let display_name = conn.display_name().to_string();

        if !self.whitelist.permits(&display_name) {
            conn.disconnect(&red("Server is whitelisted")).await;
            info!("{} failed to join: Server is whitelisted", display_name);
            return;
        }

        let Some(server) = self.pick_initial_server().await else {
            conn.disconnect(&red("No servers available")).await;
            error!(
                "Unable to create session for {}: no live server in group {}",
                display_name, self.default_group
            );
            return;
        };

        let (_session, sender) = Session::spawn(
            Arc::clone(&conn),
            Arc::clone(&server),
            Arc::clone(&self.handler),
            Arc::clone(&self.counts),
            Arc::clone(&self.sessions),
        );
        info!(
            "{} has been connected to server {} in group {}",
            display_name,
            server.name(),
            server.group()
        );

        self.read_loop(conn, sender).await;
    }

    /// Initial placement: the occupancy policy applied to the default group.
    async fn pick_initial_server(&self) -> Option<Arc<Server>> {
        let group = self.registry.group(&self.default_group)?;
        let servers = group.servers().await;
        select_server(&servers, self.occupancy_threshold)
    }

    /// Pumps packets from the connection into the session's event queue
    /// until the client goes away.
    async fn read_loop(&self, conn: Arc<dyn ClientConnection>, sender: SessionSender) {
        loop {
            match conn.read_packet().await {
                Ok(Some(packet)) if packet.id == TRANSFER_REQUEST_ID => {
                    let target = packet
                        .data
                        .get("server")
                        .and_then(|v| v.as_str())
                        .and_then(|name| self.registry.server(name));
                    match target {
                        Some(target) => {
                            if sender.transfer(target).is_err() {
                                break;
                            }
                        }
                        None => warn!(
                            "{} requested a transfer to an unknown server: {:?}",
                            conn.display_name(),
                            packet.data
                        ),
                    }
                }
                Ok(Some(packet)) => {
                    if sender.server_bound_packet(packet).is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = sender.quit();
                    break;
                }
                Err(e) => {
                    debug!("Read error from {}: {}", conn.display_name(), e);
                    let _ = sender.quit();
                    break;
                }
            }
        }
    }
}
