//! HTTP API for the relay

pub mod handlers;
pub mod sse;

use crate::error::{RelayError, Result};
use crate::state::RelayState;
use axum::{
    routing::get,
    Router,
};
use encore_common::config::TomlConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

/// How often rooms that only ever saw posts are swept
pub const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// Shared context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<RelayState>,
    /// SSE keep-alive interval
    pub keep_alive: Duration,
}

impl AppContext {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            state: Arc::new(RelayState::new(config.room.channel_capacity)),
            keep_alive: Duration::from_secs(config.relay.keep_alive_secs.max(1)),
        }
    }
}

/// Build the relay router
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/rooms/:room_id/events",
            get(sse::event_stream).post(handlers::post_event),
        )
        .route("/rooms/:room_id/players", get(handlers::get_players))
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        // Browser clients are served from elsewhere
        .layer(CorsLayer::permissive())
}

/// Periodically forget rooms with no subscribers and no members
pub fn spawn_pruner(state: Arc<RelayState>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let pruned = state.prune_idle().await;
            if pruned > 0 {
                debug!("Pruned {} idle rooms", pruned);
            }
        }
    })
}

/// Bind and serve until `shutdown` resolves
pub async fn run<F>(config: &TomlConfig, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = format!("{}:{}", config.relay.bind, config.relay.port)
        .parse()
        .map_err(|e| {
            RelayError::Bind(format!(
                "Invalid address {}:{}: {}",
                config.relay.bind, config.relay.port, e
            ))
        })?;

    let ctx = AppContext::from_config(config);
    let pruner = spawn_pruner(ctx.state.clone(), PRUNE_INTERVAL);
    let app = create_router(ctx);

    info!("Starting relay on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| RelayError::Bind(format!("Failed to bind to {}: {}", addr, e)))?;

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| RelayError::Server(e.to_string()));
    pruner.abort();
    served?;

    info!("Relay shutdown complete");
    Ok(())
}
