//! Webhook endpoints: one GET challenge + one POST event route per
//! platform. Both respond fast, since providers disable webhooks that time out.

use {
    axum::{
        Json, Router,
        body::Bytes,
        extract::{Path, Query, State},
        http::{HeaderMap, StatusCode},
        response::{IntoResponse, Response},
        routing::get,
    },
    serde::Deserialize,
    serde_json::json,
};

use {
    omnibox_connectors::{ChallengeParams, Platform},
    omnibox_sync::WebhookRejection,
};

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route(
        "/webhooks/{platform}",
        get(webhook_challenge).post(webhook_event),
    )
}

#[derive(Deserialize)]
struct ChallengeQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
    #[serde(rename = "challengeCode")]
    challenge_code: Option<String>,
}

/// Registration handshake. Meta platforms get the raw challenge echoed
/// back; LinkedIn gets its `challengeResponse` JSON.
async fn webhook_challenge(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    Query(query): Query<ChallengeQuery>,
) -> Response {
    let Ok(platform) = platform.parse::<Platform>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let params = ChallengeParams {
        mode: query.mode,
        verify_token: query.verify_token,
        challenge: query.challenge,
        challenge_code: query.challenge_code.clone(),
    };

    match state.ingress.challenge(platform, &params) {
        Ok(response) => match query.challenge_code {
            Some(code) => Json(json!({
                "challengeCode": code,
                "challengeResponse": response,
            }))
            .into_response(),
            None => response.into_response(),
        },
        Err(WebhookRejection::NotSupported) => StatusCode::NOT_FOUND.into_response(),
        Err(_) => StatusCode::FORBIDDEN.into_response(),
    }
}

/// Which header carries the signature for each platform's dialect.
fn signature_header(platform: Platform) -> &'static str {
    match platform {
        Platform::Linkedin => "x-li-signature",
        _ => "x-hub-signature-256",
    }
}

async fn webhook_event(
    State(state): State<AppState>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(platform) = platform.parse::<Platform>() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let signature = headers
        .get(signature_header(platform))
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.ingress.handle(platform, &body, signature).await {
        Ok(ingested) => Json(json!({
            "success": true,
            "new_messages": ingested.new_messages,
        }))
        .into_response(),
        // Stale/irrelevant events are acknowledged, not alerted on.
        Err(WebhookRejection::UnknownAccount) => Json(json!({
            "success": true,
            "ignored": "no matching account",
        }))
        .into_response(),
        Err(WebhookRejection::InvalidSignature) => StatusCode::UNAUTHORIZED.into_response(),
        Err(WebhookRejection::MalformedPayload(message)) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": message })),
        )
            .into_response(),
        Err(WebhookRejection::NotSupported) => StatusCode::NOT_FOUND.into_response(),
        Err(WebhookRejection::ChallengeRejected) => StatusCode::FORBIDDEN.into_response(),
    }
}
