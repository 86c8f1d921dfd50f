//! Binds the TCP listener and builds the router.

use std::net::SocketAddr;

use axum::Router;
use tokio::net::TcpListener;

use crate::domain::app_state::AppState;
use crate::domain::error::Result;
use crate::net::router;

pub async fn init(state: AppState) -> Result<(TcpListener, Router)> {
    let port = state.settings.server.port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| crate::domain::error::Error::with_detail(
            crate::domain::error::ErrorKind::Internal,
            "failed to bind server listener",
            e.to_string(),
        ))?;
    let router = router::init(state);
    Ok((listener, router))
}
