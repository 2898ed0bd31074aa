//! HTTP surface: one short-lived call per relay operation.

pub mod routes;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{Level, info};

use crate::relay::Relay;

/// Build the router with every relay endpoint.
pub fn router(relay: Arc<Relay>) -> Router {
    routes::routes()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::DEBUG))
                .on_response(DefaultOnResponse::new().level(Level::DEBUG)),
        )
        .with_state(relay)
}

/// Serve until `shutdown` resolves. Sessions are not closed here; the caller
/// owns the relay and tears it down afterwards.
pub async fn serve<F>(addr: SocketAddr, relay: Arc<Relay>, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    info!(url = %format!("http://{}", listener.local_addr()?), "relay listening");

    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await
}
