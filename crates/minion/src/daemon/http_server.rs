//! HTTP interface of the daemon
//!
//! - `POST /rpc`: JSON-RPC calls into the lifecycle manager
//! - `GET /events`: server-sent event stream (`stats:<id>` events)
//! - `GET /health`: liveness probe

use crate::daemon::events::EventBus;
use crate::daemon::manager::ServiceManager;
use crate::daemon::rpc::{JsonRpcResponse, RpcHandler};
use crate::daemon::runner::ServiceExecutor;
use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::{self, Next},
    response::{
        sse::{Event, KeepAlive, Sse},
        Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};

/// Shared state for HTTP handlers
pub struct AppState<E: ServiceExecutor> {
    pub rpc: RpcHandler<E>,
    pub events: EventBus,
    /// Ends open event streams so graceful shutdown can complete
    pub shutdown: watch::Receiver<()>,
}

impl<E: ServiceExecutor> Clone for AppState<E> {
    fn clone(&self) -> Self {
        Self {
            rpc: self.rpc.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

/// Create the HTTP router
pub fn create_router<E: ServiceExecutor>(
    manager: Arc<ServiceManager<E>>,
    events: EventBus,
    shutdown: watch::Receiver<()>,
) -> Router {
    let state = AppState {
        rpc: RpcHandler::new(manager),
        events,
        shutdown,
    };

    // Dashboards subscribe to /events from the browser
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/rpc", post(handle_rpc::<E>))
        .route("/events", get(stream_events::<E>))
        .route("/health", get(health))
        .layer(middleware::from_fn(access_log))
        .layer(cors)
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: watch::Receiver<()>,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("HTTP server listening on {}", addr);
    }

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown.changed().await.ok();
        log::info!("HTTP server shutting down");
    })
    .await
}

/// POST /rpc
async fn handle_rpc<E: ServiceExecutor>(
    State(state): State<AppState<E>>,
    body: String,
) -> Json<JsonRpcResponse> {
    Json(state.rpc.handle_body(&body).await)
}

/// GET /events
async fn stream_events<E: ServiceExecutor>(
    State(state): State<AppState<E>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut shutdown = state.shutdown.clone();
    let stream = state.events.sse_stream().take_until(async move {
        shutdown.changed().await.ok();
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// GET /health
async fn health() -> &'static str {
    "ok"
}

/// Log every request on the `access` target
async fn access_log(request: Request, next: Next) -> Response {
    let started = Instant::now();
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();

    let response = next.run(request).await;

    log::info!(
        target: "access",
        "{} \"{} {} {:?}\" {} {}ms",
        remote,
        method,
        uri,
        version,
        response.status().as_u16(),
        started.elapsed().as_millis()
    );
    response
}
