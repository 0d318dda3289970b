//! Push feed and query server
//!
//! Two listeners share one [`ApiState`]:
//!
//! - push port: `WS /` and `WS /ws` stream `{ "type": "metrics", "data": ... }` messages
//! - query port:
//!   - `GET /metrics` - latest snapshot (`/api/metrics` alias)
//!   - `GET /health` - liveness (`/api/health` alias)
//!   - `GET /thresholds` - active alert thresholds (`/api/thresholds` alias)
//!
//! Both stop accepting connections once the shutdown signal flips to `true`.

pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use state::ApiState;
pub use types::{HealthResponse, PendingResponse};

use std::net::SocketAddr;

use axum::{Router, routing::get};
use tokio::{sync::watch, task::JoinHandle};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info};

/// A listener running in the background
#[derive(Debug)]
pub struct Server {
    pub addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Server {
    /// Wait until the server has shut down
    pub async fn stopped(self) {
        let _ = self.task.await;
    }
}

pub fn push_router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(websocket::websocket_handler))
        .route("/ws", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
}

pub fn query_router(state: ApiState) -> Router {
    Router::new()
        .route("/metrics", get(routes::metrics::latest_metrics))
        .route("/api/metrics", get(routes::metrics::latest_metrics))
        .route("/health", get(routes::health::health_check))
        .route("/api/health", get(routes::health::health_check))
        .route("/thresholds", get(routes::metrics::thresholds))
        .route("/api/thresholds", get(routes::metrics::thresholds))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors())
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

pub async fn spawn_push_server(
    addr: SocketAddr,
    state: ApiState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Server> {
    serve("push", addr, push_router(state), shutdown).await
}

pub async fn spawn_query_server(
    addr: SocketAddr,
    state: ApiState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Server> {
    serve("query", addr, query_router(state), shutdown).await
}

async fn serve(
    name: &'static str,
    addr: SocketAddr,
    app: Router,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<Server> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let addr = listener.local_addr()?;

    info!("{name} server listening on {addr}");

    let task = tokio::spawn(async move {
        let signal = async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        };

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(signal)
            .await
        {
            error!("{name} server error: {e}");
        }
        info!("{name} server stopped");
    });

    Ok(Server { addr, task })
}
