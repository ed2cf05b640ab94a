//! Registry of backend servers and their groups.
//!
//! The registry holds the routing topology: every backend server belongs to
//! exactly one named group, carries a live connectivity flag and a current
//! player count. The flag and the count are mutated by the backend
//! connection layer as servers come and go; the load balancer and the
//! session layer only read them.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::error::ProxyError;

/// A single backend server.
///
/// Shared as `Arc<Server>` between the registry, bound sessions and the
/// load balancer. The connectivity flag and player count are atomics so the
/// backend connection layer can update them without locking readers out.
#[derive(Debug)]
pub struct Server {
    name: String,
    group: String,
    address: String,
    connected: AtomicBool,
    players: AtomicU32,
}

impl Server {
    /// Creates a server in the given group. New servers start disconnected
    /// with zero players; the backend connection layer flips them live.
    pub fn new(name: impl Into<String>, group: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            group: group.into(),
            address: address.into(),
            connected: AtomicBool::new(false),
            players: AtomicU32::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the group this server belongs to.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Backend address the proxy dials for this server.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Whether the backend is currently reachable and eligible for routing.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn player_count(&self) -> u32 {
        self.players.load(Ordering::SeqCst)
    }

    pub fn set_player_count(&self, count: u32) {
        self.players.store(count, Ordering::SeqCst);
    }

    pub fn player_joined(&self) {
        self.players.fetch_add(1, Ordering::SeqCst);
    }

    pub fn player_left(&self) {
        let _ = self
            .players
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

/// A named pool of servers sharing a routing policy.
///
/// Membership order is insertion order and stays stable across reads so
/// that selection tie-breaks are deterministic.
#[derive(Debug)]
pub struct Group {
    name: String,
    servers: RwLock<Vec<Arc<Server>>>,
}

impl Group {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            servers: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the group's servers in insertion order.
    pub async fn servers(&self) -> Vec<Arc<Server>> {
        self.servers.read().await.clone()
    }

    async fn push(&self, server: Arc<Server>) {
        self.servers.write().await.push(server);
    }

    async fn remove(&self, name: &str) {
        self.servers.write().await.retain(|s| s.name() != name);
    }
}

/// Live, mutable collection of all known servers, grouped by name.
///
/// Group lookups are case-insensitive; server names are exact. Server names
/// are unique across the whole registry, so membership partitions: a server
/// exists in exactly one group.
#[derive(Debug, Default)]
pub struct ServerRegistry {
    groups: DashMap<String, Arc<Group>>,
    servers: DashMap<String, Arc<Server>>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from the configured topology.
    ///
    /// Fails on duplicate server names; an entirely empty topology is
    /// allowed and simply leaves nothing to route to.
    pub async fn from_settings(groups: &[crate::config::GroupSettings]) -> Result<Self, ProxyError> {
        let registry = Self::new();
        for group in groups {
            for entry in &group.servers {
                registry
                    .register(Server::new(&entry.name, &group.name, &entry.address))
                    .await?;
            }
        }
        Ok(registry)
    }

    /// Registers a server, creating its group on first use.
    ///
    /// Returns the shared handle on success, or a config error if a server
    /// with the same name is already registered.
    pub async fn register(&self, server: Server) -> Result<Arc<Server>, ProxyError> {
        let server = Arc::new(server);
        if self.servers.contains_key(server.name()) {
            return Err(ProxyError::Config(format!(
                "duplicate server name: {}",
                server.name()
            )));
        }

        let group = self
            .groups
            .entry(server.group().to_ascii_lowercase())
            .or_insert_with(|| Arc::new(Group::new(server.group())))
            .clone();
        group.push(server.clone()).await;
        self.servers.insert(server.name().to_string(), server.clone());
        Ok(server)
    }

    /// Removes a server from the registry and from its group.
    pub async fn deregister(&self, name: &str) -> Option<Arc<Server>> {
        let (_, server) = self.servers.remove(name)?;
        if let Some(group) = self.group(server.group()) {
            group.remove(name).await;
        }
        Some(server)
    }

    /// Looks up a group by name, case-insensitively.
    pub fn group(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.get(&name.to_ascii_lowercase()).map(|g| g.clone())
    }

    /// Looks up a server by its exact name.
    pub fn server(&self, name: &str) -> Option<Arc<Server>> {
        self.servers.get(name).map(|s| s.clone())
    }

    pub fn server_count(&self) -> usize {
        self.servers.len()
    }
}
