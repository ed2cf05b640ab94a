//! Session event handlers.
//!
//! Every protocol-level event a session reacts to is dispatched through the
//! [`SessionHandler`] seam. Handlers return an explicit outcome instead of
//! mutating a shared context: [`EventOutcome::Cancel`] aborts the event's
//! default effect, and a transfer handler may substitute the destination it
//! proceeds with. All methods default to proceeding untouched, so an
//! implementation only overrides the events it cares about.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::balancer::select_server;
use crate::registry::{Server, ServerRegistry};
use crate::session::Session;
use crate::transport::Packet;

/// Outcome of a dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Let the event's default effect happen.
    Proceed,
    /// Veto the event; the session stays as it was.
    Cancel,
}

/// Outcome of a transfer event. Proceeding carries the destination, which
/// the handler may have substituted for the requested one.
#[derive(Debug, Clone)]
pub enum TransferOutcome {
    Proceed(Arc<Server>),
    Cancel,
}

/// Per-event callbacks for one session.
///
/// Packet events are observation points: the routing core takes no action
/// of its own on `Proceed`, and `Cancel` suppresses the packet for any
/// downstream consumer.
#[async_trait]
pub trait SessionHandler: Send + Sync {
    async fn handle_client_bound_packet(&self, _session: &Session, _packet: &Packet) -> EventOutcome {
        EventOutcome::Proceed
    }

    async fn handle_server_bound_packet(&self, _session: &Session, _packet: &Packet) -> EventOutcome {
        EventOutcome::Proceed
    }

    /// A transfer naming `target` as destination. The default proceeds with
    /// the requested server unchanged.
    async fn handle_transfer(&self, _session: &Session, target: Arc<Server>) -> TransferOutcome {
        TransferOutcome::Proceed(target)
    }

    /// The session's backend connection was lost. Proceeding tears the
    /// session down; cancelling leaves it alive for the handler to rescue.
    async fn handle_server_disconnect(&self, _session: &Session) -> EventOutcome {
        EventOutcome::Proceed
    }

    async fn handle_quit(&self, _session: &Session) {}
}

/// Handler with no behavior beyond the defaults.
pub struct NoopHandler;

#[async_trait]
impl SessionHandler for NoopHandler {}

/// Redirects transfers that target a load-balanced name to the server the
/// occupancy policy picks from the target's group.
///
/// Names not in the target list pass through untouched, so an empty list
/// turns the feature off without a separate startup path.
pub struct LoadBalancedTransfers {
    registry: Arc<ServerRegistry>,
    targets: Vec<String>,
    threshold: u32,
}

impl LoadBalancedTransfers {
    pub fn new(registry: Arc<ServerRegistry>, targets: Vec<String>, threshold: u32) -> Self {
        Self {
            registry,
            targets,
            threshold,
        }
    }
}

#[async_trait]
impl SessionHandler for LoadBalancedTransfers {
    async fn handle_transfer(&self, _session: &Session, target: Arc<Server>) -> TransferOutcome {
        // Targets may name a server or its whole group.
        let targeted = self
            .targets
            .iter()
            .any(|t| t == target.name() || t == target.group());
        if !targeted {
            return TransferOutcome::Proceed(target);
        }

        let Some(group) = self.registry.group(target.group()) else {
            warn!(
                "Load-balanced target {} names unknown group {}; transferring directly",
                target.name(),
                target.group()
            );
            return TransferOutcome::Proceed(target);
        };

        let servers = group.servers().await;
        match select_server(&servers, self.threshold) {
            Some(destination) => TransferOutcome::Proceed(destination),
            None => TransferOutcome::Cancel,
        }
    }
}
