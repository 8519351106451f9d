//! HTTP front end: serves the assembled form and answers submissions.

pub mod config;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod telemetry;

use std::net::SocketAddr;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use webwrap_core::Wrapper;

use crate::config::ServerConfig;
use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    routes::form::router()
        .layer(middleware::RequestLogLayer::new())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CatchPanicLayer::custom(error::panic_response)),
        )
        .with_state(state)
}

/// Bind the configured address and serve until the listener fails.
pub async fn serve(config: ServerConfig, wrapper: Wrapper) -> std::io::Result<()> {
    let state = AppState::new(wrapper, &config);
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    tracing::info!(%addr, prog = %state.wrapper.schema().prog, "webwrap listening");
    axum::serve(listener, app(state)).await
}
