// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! USSP server
//!
//! OAuth2 authorization server (authorization code + PKCE), file API over
//! pluggable storage adapters, and the backup replication worker.
//!
//! # Routes
//! - `/oauth/*` - authorization flow, public
//! - `/health` - liveness probe, public
//! - `/api/*` - file, backup and adapter endpoints, bearer token required

pub mod adapters;
pub mod backup;
pub mod bootstrap;
pub mod error;
pub mod files;
pub mod model;
pub mod oauth;
pub mod persistence;
pub mod replication;
pub mod security;
pub mod session;
pub mod state;

pub use bootstrap::{build_state, replication_queue};
pub use error::{ApiError, ApiResult};
pub use persistence::{MemoryStore, Persistence, PersistenceError};
pub use replication::ReplicationQueue;
pub use security::RateLimitConfig;
pub use session::{MemorySessionStore, SessionStore};
pub use state::{AppState, AuthSettings};

use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

use ussp_security::bearer_auth_middleware;

/// GET /health
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `/api/*` routes behind bearer token authentication
fn api_router(state: &AppState) -> Router<Arc<AppState>> {
    let tokens = Arc::clone(&state.tokens);
    Router::new()
        .merge(files::router())
        .merge(backup::router())
        .merge(adapters::router())
        .layer(middleware::from_fn(move |req, next| {
            bearer_auth_middleware(Arc::clone(&tokens), req, next)
        }))
}

fn assemble(state: Arc<AppState>, oauth_router: Router<Arc<AppState>>) -> Router {
    let body_limit = state.max_body_bytes;

    Router::new()
        .route("/health", get(health))
        .merge(oauth_router)
        .merge(api_router(&state))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(security::security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Create the axum router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    assemble(state, oauth::router())
}

/// Create the router with per-IP rate limiting on `/oauth/*`
///
/// The limiter keeps state per client IP. Run the returned cleanup task on a
/// background thread to bound its memory:
///
/// ```no_run
/// # async fn example(state: std::sync::Arc<ussp_server::AppState>) -> anyhow::Result<()> {
/// use ussp_server::{create_router_with_rate_limit, RateLimitConfig};
///
/// let (router, cleanup) = create_router_with_rate_limit(state, RateLimitConfig::default())?;
/// std::thread::spawn(cleanup);
/// # let _ = router;
/// # Ok(())
/// # }
/// ```
///
/// The limiter reads the peer address, so serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router_with_rate_limit(
    state: Arc<AppState>,
    rate_limit_config: RateLimitConfig,
) -> anyhow::Result<(Router, impl FnOnce() + Send + 'static)> {
    use security::{GovernorConfigBuilder, GovernorLayer, SmartIpKeyExtractor};

    let governor_config = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(rate_limit_config.requests_per_second)
            .burst_size(rate_limit_config.burst_size)
            .use_headers()
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "invalid rate limit: {} req/s, burst {}",
                    rate_limit_config.requests_per_second,
                    rate_limit_config.burst_size
                )
            })?,
    );

    let limiter = governor_config.limiter().clone();
    let cleanup_task = move || {
        let interval = std::time::Duration::from_secs(60);
        loop {
            std::thread::sleep(interval);
            let size = limiter.len();
            if size > 0 {
                tracing::debug!("Rate limiter storage size: {}, cleaning up...", size);
                limiter.retain_recent();
            }
        }
    };

    let oauth_router = oauth::router().layer(GovernorLayer {
        config: governor_config,
    });
    Ok((assemble(state, oauth_router), cleanup_task))
}
