//! Player counting and status reporting.
//!
//! [`PlayerCounts`] is the single shared cell both status surfaces read:
//! the HTTP endpoint served to peer proxies and monitoring, and the
//! game-protocol status responder shown in the client's server list.

pub mod web;

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Process-wide player counters.
///
/// The local count is written by session creation and teardown; the
/// aggregate is replaced wholesale by the cross-instance aggregator at the
/// end of each polling cycle. Readers never see a partially summed cycle.
#[derive(Debug, Default)]
pub struct PlayerCounts {
    local: AtomicU32,
    aggregate: AtomicI64,
}

impl PlayerCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Players connected to this proxy instance.
    pub fn local_count(&self) -> u32 {
        self.local.load(Ordering::SeqCst)
    }

    /// Sum reported by peer instances during the last complete cycle.
    pub fn aggregate_count(&self) -> i64 {
        self.aggregate.load(Ordering::SeqCst)
    }

    /// Local count plus the peer aggregate.
    pub fn federated_count(&self) -> i64 {
        i64::from(self.local_count()) + self.aggregate_count()
    }

    pub fn player_joined(&self) {
        self.local.fetch_add(1, Ordering::SeqCst);
    }

    pub fn player_left(&self) {
        let _ = self
            .local
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }

    /// Publishes a completed aggregation cycle's total as one unit.
    pub fn publish_aggregate(&self, total: i64) {
        self.aggregate.store(total, Ordering::SeqCst);
    }
}

/// Status figure advertised through the game protocol's discovery query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStatus {
    pub motd: String,
    pub player_count: i64,
    pub max_players: u32,
}

/// Produces [`ServerStatus`] snapshots for the protocol status responder.
///
/// The advertised player count is the federation-wide figure so every proxy
/// in front of the same pool shows the same population.
#[derive(Debug, Clone)]
pub struct StatusProvider {
    counts: Arc<PlayerCounts>,
    motd: String,
    max_players: u32,
}

impl StatusProvider {
    pub fn new(counts: Arc<PlayerCounts>, motd: impl Into<String>, max_players: u32) -> Self {
        Self {
            counts,
            motd: motd.into(),
            max_players,
        }
    }

    pub fn server_status(&self) -> ServerStatus {
        ServerStatus {
            motd: self.motd.clone(),
            player_count: self.counts.federated_count(),
            max_players: self.max_players,
        }
    }
}
