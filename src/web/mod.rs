mod pages;
mod routes;
mod subscriptions;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::email::Emailer;
use crate::poll::{Scheduler, SmartFetcher};
use crate::store::Store;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub scheduler: Arc<Scheduler>,
    pub store: Arc<dyn Store>,
    /// Verifies threads before they are subscribed to.
    pub planner: SmartFetcher,
    pub emailer: Arc<dyn Emailer>,
    /// Key for deriving subscription tokens from email addresses.
    pub token_salt: Arc<str>,
}

/// Build the router with every route and middleware.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .merge(subscriptions::router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the web server and run until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener cannot be bound.
pub async fn serve(host: &str, port: u16, state: AppState, shutdown: CancellationToken) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .context("Invalid web server address")?;

    let app = create_app(state);

    info!(addr = %addr, "Starting HTTP web server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind web server")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Web server error")?;

    Ok(())
}
