//! Account listing and disconnect. Token fields never serialize.

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        routing::{delete, get},
    },
    serde::Deserialize,
    tracing::info,
};

use omnibox_accounts::Account;

use crate::{error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/accounts", get(list_accounts))
        .route("/api/accounts/refresh-needed", get(accounts_needing_refresh))
        .route("/api/accounts/{id}", delete(disconnect_account))
}

#[derive(Deserialize)]
struct ListParams {
    user_id: String,
}

async fn list_accounts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Account>>, ApiError> {
    let accounts = state
        .accounts
        .list_for_user(&params.user_id)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(accounts))
}

/// Connected accounts whose token expiry has passed; these will be
/// refreshed on the next sync pass, or need re-auth if refresh fails.
async fn accounts_needing_refresh(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Account>>, ApiError> {
    let accounts = state
        .accounts
        .find_needing_refresh(&params.user_id)
        .await
        .map_err(ApiError::internal)?;
    Ok(Json(accounts))
}

/// Disconnect an account: the row and its mirrored messages are removed.
async fn disconnect_account(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let Some(account) = state
        .accounts
        .get(&account_id)
        .await
        .map_err(ApiError::internal)?
    else {
        return Err(ApiError::not_found("account not found"));
    };

    state
        .accounts
        .delete(&account.id)
        .await
        .map_err(ApiError::internal)?;
    info!(account_id = %account.id, platform = %account.platform, "account disconnected");
    Ok(StatusCode::NO_CONTENT)
}
