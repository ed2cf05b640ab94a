//! HTTP status endpoint.
//!
//! Serves plain-text decimal player counts for peer proxies and external
//! monitoring. `/full` (trailing slash and letter case ignored) returns the
//! federation-wide figure; every other path returns the local count. There
//! is no authentication on this surface.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{extract::State, http::Uri, routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;

use crate::error::ProxyError;
use crate::status::PlayerCounts;

/// Builds the status router over the shared counters.
pub fn router(counts: Arc<PlayerCounts>) -> Router {
    Router::new()
        .fallback(get(player_count))
        .with_state(counts)
}

async fn player_count(State(counts): State<Arc<PlayerCounts>>, uri: Uri) -> String {
    let path = uri.path().to_ascii_lowercase();
    if path == "/full" || path == "/full/" {
        counts.federated_count().to_string()
    } else {
        counts.local_count().to_string()
    }
}

/// Binds and serves the status endpoint until the process exits.
///
/// A bind failure is returned to the caller and treated as fatal; once
/// serving, the endpoint answers best-effort for the process lifetime.
pub async fn serve(addr: SocketAddr, counts: Arc<PlayerCounts>) -> Result<(), ProxyError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ProxyError::Network(format!("failed to bind status endpoint on {addr}: {e}")))?;
    info!("📊 Status endpoint listening on {}", addr);

    axum::serve(listener, router(counts))
        .await
        .map_err(|e| ProxyError::Network(format!("status endpoint failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn counts(local: u32, aggregate: i64) -> Arc<PlayerCounts> {
        let counts = Arc::new(PlayerCounts::new());
        for _ in 0..local {
            counts.player_joined();
        }
        counts.publish_aggregate(aggregate);
        counts
    }

    async fn get_body(router: Router, path: &str) -> String {
        let response = router
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(response.into_body(), 64).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_root_returns_local_count() {
        let app = router(counts(10, 8));
        assert_eq!(get_body(app, "/").await, "10");
    }

    #[tokio::test]
    async fn test_full_returns_federated_count() {
        let app = router(counts(10, 8));
        assert_eq!(get_body(app.clone(), "/full").await, "18");
        assert_eq!(get_body(app.clone(), "/full/").await, "18");
        assert_eq!(get_body(app, "/FULL").await, "18");
    }

    #[tokio::test]
    async fn test_unknown_paths_fall_back_to_local_count() {
        let app = router(counts(3, 5));
        assert_eq!(get_body(app.clone(), "/anything").await, "3");
        assert_eq!(get_body(app, "/full/extra").await, "3");
    }
}
