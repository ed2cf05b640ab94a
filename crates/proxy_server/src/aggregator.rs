//! Cross-instance player-count aggregation.
//!
//! Independent proxy instances expose their player count over HTTP; this
//! module polls a configured list of peer URLs, sums what they report and
//! publishes the total through [`PlayerCounts::publish_aggregate`]. One
//! fetch task per peer runs per cycle, each with its own timeout, and the
//! total only replaces the published value once every task has finished,
//! so readers never see a half-summed cycle.
//!
//! A failing peer contributes zero for the cycle and is retried on the
//! next one; there is no permanent exclusion.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{interval, timeout};
use tracing::{debug, error, info};

use crate::error::ProxyError;
use crate::status::PlayerCounts;

/// Default gap between aggregation cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Default per-peer request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Periodically polls peer proxies and publishes their summed player count.
pub struct PeerAggregator {
    peers: Vec<String>,
    poll_interval: Duration,
    request_timeout: Duration,
    counts: Arc<PlayerCounts>,
}

impl PeerAggregator {
    pub fn new(
        peers: Vec<String>,
        poll_interval: Duration,
        request_timeout: Duration,
        counts: Arc<PlayerCounts>,
    ) -> Self {
        Self {
            peers,
            poll_interval,
            request_timeout,
            counts,
        }
    }

    /// Starts the aggregation loop: one cycle immediately, then one per
    /// interval. Cycles never overlap; the ticker only advances once the
    /// previous cycle has joined all its fetch tasks.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if self.peers.is_empty() {
                info!("📡 No peer proxies configured, aggregation disabled");
                self.counts.publish_aggregate(0);
                return;
            }
            info!("📡 Aggregating player counts from {} peer(s)", self.peers.len());

            let mut ticker = interval(self.poll_interval);
            loop {
                ticker.tick().await;
                self.run_cycle().await;
            }
        })
    }

    /// Runs one complete aggregation cycle and publishes its total.
    pub async fn run_cycle(&self) {
        let accumulator = Arc::new(AtomicI64::new(0));

        let mut fetches = self
            .peers
            .iter()
            .map(|peer| {
                let accumulator = Arc::clone(&accumulator);
                let peer = peer.clone();
                let request_timeout = self.request_timeout;
                async move {
                    match timeout(request_timeout, fetch_player_count(&peer)).await {
                        Ok(Ok(count)) => {
                            accumulator.fetch_add(count, Ordering::SeqCst);
                        }
                        Ok(Err(e)) => {
                            error!("Failed to fetch player count from {}: {}", peer, e);
                        }
                        Err(_) => {
                            error!("Timed out fetching player count from {}", peer);
                        }
                    }
                }
            })
            .collect::<FuturesUnordered<_>>();

        while fetches.next().await.is_some() {}

        let total = accumulator.load(Ordering::SeqCst);
        self.counts.publish_aggregate(total);
        debug!("Aggregation cycle complete: {} player(s) on peers", total);
    }
}

/// Fetches one peer's player count: a plain HTTP/1.1 GET whose response
/// body is a decimal integer.
pub async fn fetch_player_count(peer: &str) -> Result<i64, ProxyError> {
    let (host, path) = split_peer_url(peer);
    let authority = if host.contains(':') {
        host.to_string()
    } else {
        format!("{host}:80")
    };

    let mut stream = TcpStream::connect(&authority)
        .await
        .map_err(|e| ProxyError::Network(format!("connect failed: {e}")))?;

    let request = format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    let response = String::from_utf8_lossy(&response);

    let (head, body) = response
        .split_once("\r\n\r\n")
        .ok_or_else(|| ProxyError::Network("invalid HTTP response".to_string()))?;

    let status_line = head.lines().next().unwrap_or_default();
    let status = status_line.split_whitespace().nth(1).unwrap_or_default();
    if status != "200" {
        return Err(ProxyError::Network(format!("unexpected status: {status_line}")));
    }

    body.trim()
        .parse::<i64>()
        .map_err(|e| ProxyError::Network(format!("non-numeric player count {body:?}: {e}")))
}

/// Splits a peer URL of the form `http://host[:port][/path]` into its
/// authority and path. The scheme prefix is optional.
fn split_peer_url(peer: &str) -> (&str, &str) {
    let rest = peer.trim_start_matches("http://");
    match rest.split_once('/') {
        Some((host, path_rest)) if !path_rest.is_empty() => {
            (host, &rest[host.len()..])
        }
        Some((host, _)) => (host, "/"),
        None => (rest, "/"),
    }
}
