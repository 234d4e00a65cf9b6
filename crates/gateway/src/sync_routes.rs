//! Manual/targeted sync triggers and scheduler status.

use {
    axum::{
        Json, Router,
        extract::{Path, State},
        routing::{get, post},
    },
    tracing::info,
};

use {
    omnibox_connectors::{Platform, UnknownPlatform},
    omnibox_sync::{SyncResult, SyncStatus},
};

use crate::{error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/sync/accounts/{id}", post(sync_account))
        .route("/api/sync/platforms/{platform}", post(sync_platform))
        .route("/api/sync/status", get(sync_status))
}

/// Synchronously sync one account.
async fn sync_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<Json<SyncResult>, ApiError> {
    let result = state
        .sync
        .sync_account_id(&account_id)
        .await
        .map_err(ApiError::internal)?
        .ok_or_else(|| ApiError::not_found("account not found"))?;
    Ok(Json(result))
}

/// Synchronously sync every connected account on one platform.
async fn sync_platform(
    State(state): State<AppState>,
    Path(platform): Path<String>,
) -> Result<Json<Vec<SyncResult>>, ApiError> {
    let platform: Platform = platform
        .parse()
        .map_err(|e: UnknownPlatform| ApiError::bad_request(e))?;
    info!(%platform, "manual platform sync requested");
    Ok(Json(state.sync.sync_by_platform(platform).await))
}

async fn sync_status(State(state): State<AppState>) -> Result<Json<SyncStatus>, ApiError> {
    let status = state.sync.status().await.map_err(ApiError::internal)?;
    Ok(Json(status))
}
