use std::net::SocketAddr;

use {axum::Router, tracing::info};

use crate::{account_routes, oauth_routes, state::AppState, sync_routes, webhook_routes};

/// Assemble the full gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(oauth_routes::routes())
        .merge(webhook_routes::routes())
        .merge(sync_routes::routes())
        .merge(account_routes::routes())
        .with_state(state)
}

/// Bind and serve until the task is dropped or the listener fails.
pub async fn serve(state: AppState, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}
