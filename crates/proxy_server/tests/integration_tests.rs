//! End-to-end tests for the session routing core.
//!
//! These exercise the full path a deployment uses: the JSON line transport,
//! the whitelist gate, load-balanced transfers, the status endpoint and
//! cross-instance aggregation, all over real sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use proxy_server::acceptor::ConnectionAcceptor;
use proxy_server::aggregator::{fetch_player_count, PeerAggregator};
use proxy_server::balancer::DEFAULT_OCCUPANCY_THRESHOLD;
use proxy_server::config::WhitelistSettings;
use proxy_server::status::web;
use proxy_server::transport::{JsonLineListener, TRANSFER_REQUEST_ID};
use proxy_server::{
    LoadBalancedTransfers, PlayerCounts, Server, ServerRegistry, SessionMap, SessionState,
};

struct Proxy {
    addr: SocketAddr,
    registry: Arc<ServerRegistry>,
    counts: Arc<PlayerCounts>,
    sessions: Arc<SessionMap>,
}

/// Brings up a routing core with a lobby group and a load-balanced games
/// group, listening on an ephemeral port.
async fn start_proxy(balanced_targets: Vec<String>) -> Proxy {
    let registry = Arc::new(ServerRegistry::new());
    let topology = [
        ("lobby-1", "lobby", 0u32),
        ("games-1", "games", 5),
        ("games-2", "games", 9),
    ];
    for (name, group, players) in topology {
        let server = registry
            .register(Server::new(name, group, "127.0.0.1:0"))
            .await
            .unwrap();
        server.set_connected(true);
        server.set_player_count(players);
    }

    let counts = Arc::new(PlayerCounts::new());
    let sessions = Arc::new(SessionMap::new());
    let handler = Arc::new(LoadBalancedTransfers::new(
        Arc::clone(&registry),
        balanced_targets,
        DEFAULT_OCCUPANCY_THRESHOLD,
    ));
    let acceptor = Arc::new(ConnectionAcceptor::new(
        Arc::clone(&registry),
        Arc::clone(&counts),
        Arc::clone(&sessions),
        handler,
        WhitelistSettings::default(),
        "lobby".to_string(),
        DEFAULT_OCCUPANCY_THRESHOLD,
    ));

    let listener = JsonLineListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(acceptor.run(Arc::new(listener)));

    Proxy {
        addr,
        registry,
        counts,
        sessions,
    }
}

async fn join(addr: SocketAddr, name: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let handshake = format!("{{\"display_name\":\"{name}\"}}\n");
    stream.write_all(handshake.as_bytes()).await.unwrap();
    stream
}

async fn request_transfer(stream: &mut TcpStream, server: &str) {
    let line = format!(
        "{{\"id\":{TRANSFER_REQUEST_ID},\"data\":{{\"server\":\"{server}\"}}}}\n"
    );
    stream.write_all(line.as_bytes()).await.unwrap();
}

async fn wait_until<F, Fut>(mut predicate: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if predicate().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached within two seconds");
}

/// Stub peer proxy answering every status request with `body`.
async fn stub_peer(body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            // Drain the client's request so closing the socket sends a FIN
            // rather than an RST (unread receive data triggers a connection
            // reset on Linux, racing the client's read).
            let mut scratch = [0u8; 1024];
            let _ = stream.read(&mut scratch).await;
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        }
    });
    format!("http://{addr}/full")
}

#[tokio::test(flavor = "multi_thread")]
async fn test_join_transfer_and_quit() {
    let proxy = start_proxy(vec!["games".to_string()]).await;

    let mut client = join(proxy.addr, "Steve").await;
    let sessions = Arc::clone(&proxy.sessions);
    wait_until(|| {
        let sessions = Arc::clone(&sessions);
        async move { sessions.get("steve").is_some() }
    })
    .await;

    let session = proxy.sessions.get("Steve").unwrap();
    assert_eq!(session.server().await.name(), "lobby-1");
    assert_eq!(proxy.counts.local_count(), 1);

    // games-1 is named, but the whole games group is load-balanced:
    // games-2 (9 players, below the threshold) wins.
    request_transfer(&mut client, "games-1").await;
    let probe = Arc::clone(&session);
    wait_until(|| {
        let session = Arc::clone(&probe);
        async move { session.server().await.name() == "games-2" }
    })
    .await;
    assert_eq!(session.state().await, SessionState::Bound);

    drop(client);
    let sessions = Arc::clone(&proxy.sessions);
    wait_until(|| {
        let sessions = Arc::clone(&sessions);
        async move { sessions.get("steve").is_none() }
    })
    .await;
    assert_eq!(proxy.counts.local_count(), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_vetoed_transfer_keeps_binding() {
    let proxy = start_proxy(vec!["games".to_string()]).await;
    proxy.registry.server("games-1").unwrap().set_connected(false);
    proxy.registry.server("games-2").unwrap().set_connected(false);

    let mut client = join(proxy.addr, "Steve").await;
    let sessions = Arc::clone(&proxy.sessions);
    wait_until(|| {
        let sessions = Arc::clone(&sessions);
        async move { sessions.get("steve").is_some() }
    })
    .await;
    let session = proxy.sessions.get("Steve").unwrap();

    request_transfer(&mut client, "games-1").await;

    // The transfer is cancelled; the session settles back on its lobby
    // binding instead of moving.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.server().await.name(), "lobby-1");
    assert_eq!(session.state().await, SessionState::Bound);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unbalanced_transfer_goes_to_named_server() {
    let proxy = start_proxy(Vec::new()).await;

    let mut client = join(proxy.addr, "Steve").await;
    let sessions = Arc::clone(&proxy.sessions);
    wait_until(|| {
        let sessions = Arc::clone(&sessions);
        async move { sessions.get("steve").is_some() }
    })
    .await;
    let session = proxy.sessions.get("Steve").unwrap();

    request_transfer(&mut client, "games-1").await;
    let probe = Arc::clone(&session);
    wait_until(|| {
        let session = Arc::clone(&probe);
        async move { session.server().await.name() == "games-1" }
    })
    .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_sessions_are_independent() {
    let proxy = start_proxy(Vec::new()).await;

    let _alex = join(proxy.addr, "Alex").await;
    let _steve = join(proxy.addr, "Steve").await;
    let mut carol = join(proxy.addr, "Carol").await;

    let counts = Arc::clone(&proxy.counts);
    wait_until(|| {
        let counts = Arc::clone(&counts);
        async move { counts.local_count() == 3 }
    })
    .await;

    request_transfer(&mut carol, "games-2").await;
    let sessions = Arc::clone(&proxy.sessions);
    wait_until(|| {
        let sessions = Arc::clone(&sessions);
        async move {
            match sessions.get("carol") {
                Some(s) => s.server().await.name() == "games-2",
                None => false,
            }
        }
    })
    .await;

    // The other two stayed where they were.
    assert_eq!(
        proxy.sessions.get("alex").unwrap().server().await.name(),
        "lobby-1"
    );
    assert_eq!(
        proxy.sessions.get("steve").unwrap().server().await.name(),
        "lobby-1"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_status_endpoint_with_aggregation() {
    let counts = Arc::new(PlayerCounts::new());
    for _ in 0..10 {
        counts.player_joined();
    }

    // Serve the status endpoint on an ephemeral port.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let web_addr = listener.local_addr().unwrap();
    let app = web::router(Arc::clone(&counts));
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Two responsive peers and one that only accepts, never answers.
    let peer_a = stub_peer("5").await;
    let peer_b = stub_peer("3").await;
    let silent = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("http://{addr}/full")
    };

    let aggregator = PeerAggregator::new(
        vec![peer_a, silent, peer_b],
        Duration::from_secs(30),
        Duration::from_millis(300),
        Arc::clone(&counts),
    );
    aggregator.run_cycle().await;
    assert_eq!(counts.aggregate_count(), 8);

    // The endpoint now reports local and federated figures over real HTTP.
    let local = fetch_player_count(&format!("http://{web_addr}/")).await.unwrap();
    assert_eq!(local, 10);
    let full = fetch_player_count(&format!("http://{web_addr}/full")).await.unwrap();
    assert_eq!(full, 18);
    let full_slash = fetch_player_count(&format!("http://{web_addr}/FULL/")).await.unwrap();
    assert_eq!(full_slash, 18);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_whitelisted_proxy_end_to_end() {
    let registry = Arc::new(ServerRegistry::new());
    let server = registry
        .register(Server::new("lobby-1", "lobby", "127.0.0.1:0"))
        .await
        .unwrap();
    server.set_connected(true);

    let counts = Arc::new(PlayerCounts::new());
    let sessions = Arc::new(SessionMap::new());
    let acceptor = Arc::new(ConnectionAcceptor::new(
        Arc::clone(&registry),
        Arc::clone(&counts),
        Arc::clone(&sessions),
        Arc::new(LoadBalancedTransfers::new(
            Arc::clone(&registry),
            Vec::new(),
            DEFAULT_OCCUPANCY_THRESHOLD,
        )),
        WhitelistSettings {
            enabled: true,
            players: vec!["Alex".to_string()],
        },
        "lobby".to_string(),
        DEFAULT_OCCUPANCY_THRESHOLD,
    ));
    let listener = JsonLineListener::bind("127.0.0.1:0".parse().unwrap())
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(acceptor.run(Arc::new(listener)));

    // Steve is not on the list and never gets a session.
    let _steve = join(addr, "Steve").await;
    // Alex is, under any capitalization.
    let _alex = join(addr, "aLeX").await;

    let probe = Arc::clone(&sessions);
    wait_until(|| {
        let sessions = Arc::clone(&probe);
        async move { sessions.get("alex").is_some() }
    })
    .await;
    assert!(sessions.get("steve").is_none());
    assert_eq!(counts.local_count(), 1);
}
