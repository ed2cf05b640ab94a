//! Waypoint - Multi-Backend Game Proxy
//!
//! Entry point wiring the routing core together: configuration, logging,
//! the backend registry, load-balanced transfer handling, cross-instance
//! aggregation, the status endpoint and the accept loop. Load balancing is
//! a configuration toggle rather than a separate startup mode: an empty
//! target list simply leaves transfers untouched.

mod cli;
mod signals;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};

use proxy_server::acceptor::ConnectionAcceptor;
use proxy_server::aggregator::PeerAggregator;
use proxy_server::status::web;
use proxy_server::transport::JsonLineListener;
use proxy_server::{
    config, logging, Config, LoadBalancedTransfers, PlayerCounts, ServerRegistry, SessionMap,
    StatusProvider,
};

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::load_config(&args.config)
        .await
        .with_context(|| format!("unable to load config {}", args.config.display()))?;
    apply_overrides(&mut config, &args);

    logging::setup_logging(&config.logging, args.debug);
    info!("Starting Waypoint proxy");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from: {}", args.config.display());

    let registry = Arc::new(
        ServerRegistry::from_settings(&config.groups)
            .await
            .context("invalid backend topology")?,
    );
    validate_topology(&config, &registry)?;

    // The backend connection layer owns connectivity; with a static
    // topology the configured servers start out assumed reachable.
    for group in &config.groups {
        for entry in &group.servers {
            if let Some(server) = registry.server(&entry.name) {
                server.set_connected(true);
            }
        }
    }
    info!(
        "Registered {} server(s) in {} group(s), default group: {}",
        registry.server_count(),
        config.groups.len(),
        config.default_group
    );

    let counts = Arc::new(PlayerCounts::new());
    let sessions = Arc::new(SessionMap::new());
    let status = StatusProvider::new(Arc::clone(&counts), &config.motd, config.max_players);
    info!("Advertising status: {:?}", status.server_status());

    let handler = Arc::new(LoadBalancedTransfers::new(
        Arc::clone(&registry),
        config.load_balancer.targets.clone(),
        config.load_balancer.occupancy_threshold,
    ));
    if config.load_balancer.targets.is_empty() {
        info!("Load-balanced transfer handling disabled (no targets)");
    } else {
        info!(
            "Load-balancing transfers to: {:?}",
            config.load_balancer.targets
        );
    }

    let bind_addr = config.bind_addr()?;
    let listener = JsonLineListener::bind(bind_addr)
        .await
        .context("unable to start listener")?;
    info!("🚀 Listening on {}", bind_addr);

    let web_addr = config.web.listen_addr()?;
    let aggregator = PeerAggregator::new(
        config.web.other_servers.clone(),
        config.web.poll_interval(),
        config.web.request_timeout(),
        Arc::clone(&counts),
    );
    aggregator.spawn();

    let acceptor = Arc::new(ConnectionAcceptor::new(
        registry,
        Arc::clone(&counts),
        sessions,
        handler,
        config.whitelist.clone(),
        config.default_group.clone(),
        config.load_balancer.occupancy_threshold,
    ));

    let shutdown = signals::shutdown_signal().await;

    tokio::select! {
        _ = acceptor.run(Arc::new(listener)) => {
            info!("Accept loop ended");
        }
        result = web::serve(web_addr, Arc::clone(&counts)) => {
            if let Err(e) = result {
                error!("Status endpoint failed: {}", e);
                return Err(e.into());
            }
        }
        _ = shutdown => {
            info!("Shutdown signal received");
        }
    }

    info!("Proxy stopped");
    Ok(())
}

/// Applies command-line overrides on top of the loaded configuration.
fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(listen) = &args.listen {
        config.bind_address = listen.clone();
    }
    if let Some(web_port) = &args.web_port {
        config.web.port = web_port.clone();
    }
}

/// Rejects a topology whose default group does not exist. An empty
/// topology is tolerated so the proxy can come up before its backends.
fn validate_topology(config: &Config, registry: &ServerRegistry) -> Result<()> {
    if registry.server_count() == 0 {
        tracing::warn!("No backend servers configured; every join will be refused");
        return Ok(());
    }
    if registry.group(&config.default_group).is_none() {
        anyhow::bail!(
            "default group {:?} is not part of the configured topology",
            config.default_group
        );
    }
    Ok(())
}
