//! # Waypoint Proxy Server - Session Routing Core
//!
//! The routing core of a multi-backend game proxy. It decides which
//! backend server every client ends up on and keeps that decision
//! consistent across player transfers and across a federation of
//! independent proxy instances.
//!
//! ## Architecture Overview
//!
//! * **Server Registry** - Backend topology: servers grouped by name, each
//!   with a live flag and a player count maintained by the backend
//!   connection layer.
//! * **Load Balancer** - Pure occupancy-policy function choosing a
//!   destination inside a group.
//! * **Session / Event Dispatch** - One session per connection, with
//!   transfer, disconnect, quit and packet events dispatched in order
//!   through a pluggable handler that can veto or redirect them.
//! * **Connection Acceptor** - Whitelist gate and session construction;
//!   one connection's failure never stops the accept loop.
//! * **Cross-Instance Aggregator** - Periodic fan-out polling of peer
//!   proxies' player counts, published atomically per complete cycle.
//! * **Status Endpoint** - Plain-text HTTP counts for peers and
//!   monitoring, plus the protocol status provider fed from the same
//!   counters.
//!
//! ## Message Flow
//!
//! 1. The listener accepts a connection and the whitelist gate runs.
//! 2. The acceptor places the player on the default group's best server
//!    and spawns a [`session::Session`].
//! 3. Protocol events flow through the session's queue; transfer events
//!    consult the load balancer when they target a balanced name.
//! 4. The aggregator and the status endpoint run alongside, keeping the
//!    federation-wide player figure fresh.
//!
//! The wire-level protocol codec is pluggable behind the seams in
//! [`transport`]; the crate ships a line-delimited JSON transport used by
//! the default binary and the test suite.

pub use config::Config;
pub use error::ProxyError;
pub use registry::{Group, Server, ServerRegistry};
pub use session::{
    EventOutcome, LoadBalancedTransfers, NoopHandler, Session, SessionHandler, SessionMap,
    SessionSender, SessionState, TransferOutcome,
};
pub use status::{PlayerCounts, ServerStatus, StatusProvider};

pub mod acceptor;
pub mod aggregator;
pub mod balancer;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;
pub mod session;
pub mod status;
pub mod transport;
