//! Start-OAuth and OAuth-callback endpoints.
//!
//! The callback is hit by an external provider's redirect: every failure
//! path degrades to a redirect carrying a human-readable message, never a
//! raw 500 back to the provider.

use {
    axum::{
        Json, Router,
        extract::{Path, Query, State},
        response::Redirect,
        routing::get,
    },
    secrecy::ExposeSecret,
    serde::{Deserialize, Serialize},
    tracing::{info, warn},
};

use {
    omnibox_accounts::NewConnection,
    omnibox_connectors::{Platform, UnknownPlatform},
    omnibox_oauth::StateError,
};

use crate::{error::ApiError, state::AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/oauth/{platform}/start", get(start_oauth))
        .route("/auth/{platform}/callback", get(oauth_callback))
}

#[derive(Deserialize)]
struct StartParams {
    user_id: String,
}

#[derive(Serialize)]
struct StartResponse {
    auth_url: String,
    platform: Platform,
}

/// Mint a state token and hand back the provider authorization URL.
async fn start_oauth(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<StartParams>,
) -> Result<Json<StartResponse>, ApiError> {
    let platform: Platform = platform
        .parse()
        .map_err(|e: UnknownPlatform| ApiError::bad_request(e))?;
    let connector = state.registry.get(platform)?;

    let token = state.codec.mint(&params.user_id, platform.as_str());
    let auth_url = connector.build_authorization_url(&token)?;

    info!(%platform, user_id = %params.user_id, "oauth flow started");
    Ok(Json(StartResponse { auth_url, platform }))
}

#[derive(Deserialize)]
struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

async fn oauth_callback(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    match handle_callback(&state, &platform, params).await {
        Ok(platform) => Redirect::temporary(&format!(
            "{}/accounts?connected={platform}",
            state.frontend_url
        )),
        Err(message) => {
            warn!(%platform, %message, "oauth callback failed");
            Redirect::temporary(&format!(
                "{}/accounts?error={}",
                state.frontend_url,
                urlencoding::encode(&message)
            ))
        },
    }
}

/// The callback body: validate state, exchange the code, fetch the profile,
/// persist the account. Returns the platform on success, or the message to
/// carry on the error redirect.
async fn handle_callback(
    state: &AppState,
    platform_segment: &str,
    params: CallbackParams,
) -> Result<Platform, String> {
    let platform: Platform = platform_segment
        .parse()
        .map_err(|e: UnknownPlatform| e.to_string())?;

    if let Some(error) = params.error {
        return Err(error);
    }
    let (Some(code), Some(state_token)) = (params.code, params.state) else {
        return Err("missing authorization code or state".into());
    };

    let claims = state
        .codec
        .validate(&state_token, platform.as_str())
        .map_err(|e| match e {
            StateError::Expired => "sign-in session expired, please try again".to_string(),
            StateError::PlatformMismatch { .. } | StateError::Invalid => {
                "invalid state parameter".to_string()
            },
        })?;

    let connector = state.registry.get(platform).map_err(|e| e.to_string())?;
    let grant = connector
        .exchange_code(&code)
        .await
        .map_err(|e| e.to_string())?;
    let profile = connector
        .fetch_profile(grant.access_token.expose_secret())
        .await
        .map_err(|e| e.to_string())?;

    let account = state
        .accounts
        .upsert_from_oauth(NewConnection {
            user_id: claims.user_id,
            platform,
            profile,
            grant,
        })
        .await
        .map_err(|e| {
            warn!(%platform, error = %e, "failed to persist connected account");
            "failed to save the connected account".to_string()
        })?;

    info!(
        %platform,
        account_id = %account.id,
        username = %account.username,
        "account connected"
    );
    Ok(platform)
}
