//! Destination selection for load-balanced groups.
//!
//! Given the servers of a group, [`select_server`] picks one destination
//! according to an occupancy policy:
//!
//! 1. Only live servers are eligible; with none, there is no destination.
//! 2. A single live server is always chosen.
//! 3. While no server has reached the occupancy threshold, players are
//!    packed onto the busiest server.
//! 4. With a mix of servers below and at/above the threshold, the busiest
//!    server still below the threshold is chosen.
//! 5. Once every server is at or above the threshold, the least busy one
//!    is chosen, spreading load across the saturated pool.
//!
//! Ties resolve to the first server in enumeration order. `None` means
//! "no eligible destination" and is treated by the caller as a transfer
//! veto, not as an error.

use std::sync::Arc;

use crate::registry::Server;

/// Player count at which a server is considered highly occupied.
///
/// A policy value, not a protocol constant; overridable through the
/// `load_balancer.occupancy_threshold` config field.
pub const DEFAULT_OCCUPANCY_THRESHOLD: u32 = 12;

/// Per-invocation snapshot of a server's routing-relevant fields.
///
/// Connectivity and player count are read exactly once per candidate so a
/// concurrent update cannot flip the decision between policy steps.
struct Candidate {
    server: Arc<Server>,
    players: u32,
}

/// Selects a destination among `servers`, or `None` when no live server is
/// eligible.
pub fn select_server(servers: &[Arc<Server>], threshold: u32) -> Option<Arc<Server>> {
    let live: Vec<Candidate> = servers
        .iter()
        .filter(|s| s.connected())
        .map(|s| Candidate {
            players: s.player_count(),
            server: Arc::clone(s),
        })
        .collect();

    if live.is_empty() {
        return None;
    }
    if live.len() == 1 {
        return Some(Arc::clone(&live[0].server));
    }

    let high_count = live.iter().filter(|c| c.players >= threshold).count();

    let chosen = if high_count == 0 {
        // Nobody saturated yet: fill the busiest server first.
        busiest(live.iter())
    } else if high_count < live.len() {
        // Prefer topping up a below-threshold server over piling onto a
        // saturated one.
        busiest(live.iter().filter(|c| c.players < threshold))
    } else {
        // Everything is saturated: spread onto the least busy server.
        least_busy(live.iter())
    };

    chosen.map(|c| Arc::clone(&c.server))
}

fn busiest<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        match best {
            Some(b) if b.players >= candidate.players => {}
            _ => best = Some(candidate),
        }
    }
    best
}

fn least_busy<'a>(candidates: impl Iterator<Item = &'a Candidate>) -> Option<&'a Candidate> {
    let mut best: Option<&Candidate> = None;
    for candidate in candidates {
        match best {
            Some(b) if b.players <= candidate.players => {}
            _ => best = Some(candidate),
        }
    }
    best
}
