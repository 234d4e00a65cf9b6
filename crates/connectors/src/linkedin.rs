//! LinkedIn connector (OpenID Connect flow).
//!
//! Since the 2023 deprecation of `r_liteprofile`/`r_emailaddress`, standard
//! apps authenticate with the `openid profile email` scopes and read the
//! identity from `/v2/userinfo` (`sub` is the member id). Conversation APIs
//! sit behind a LinkedIn Partnership; message fetch still exercises the
//! token against `userinfo` so expiry is detected, then reports nothing.

use {
    async_trait::async_trait,
    secrecy::ExposeSecret,
    serde::Deserialize,
    tracing::debug,
    url::Url,
};

use omnibox_oauth::TokenGrant;

use crate::{
    config::PlatformOAuthConfig,
    connector::PlatformConnector,
    error::{ConnectorError, Result},
    http,
    types::{ChallengeParams, InboundMessage, Platform, PlatformMessage, Profile, SyncTarget},
    webhook,
};

const AUTHORIZE_URL: &str = "https://www.linkedin.com/oauth/v2/authorization";
const TOKEN_URL: &str = "https://www.linkedin.com/oauth/v2/accessToken";
const API_BASE: &str = "https://api.linkedin.com/v2";

/// 60 days, LinkedIn's default access-token lifetime.
const DEFAULT_EXPIRES_IN_SECS: i64 = 5_184_000;

const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "email"];

/// LinkedIn signs webhooks with an `hmacsha256=` header dialect.
const SIGNATURE_PREFIX: &str = "hmacsha256=";

pub struct LinkedinConnector {
    config: PlatformOAuthConfig,
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    api_base: String,
}

impl LinkedinConnector {
    pub fn new(config: PlatformOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
        }
    }

    fn scope(&self) -> String {
        if self.config.scopes.is_empty() {
            DEFAULT_SCOPES.join(" ")
        } else {
            self.config.scopes.join(" ")
        }
    }

    async fn userinfo(&self, access_token: &str) -> Result<UserInfo> {
        let url = format!("{}/userinfo", self.api_base);
        http::get_json(&self.client, &url, Some(access_token))
            .await
            .map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })
    }
}

#[derive(Deserialize)]
struct LiTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct UserInfo {
    /// The member id in OpenID Connect terms.
    sub: String,
    given_name: Option<String>,
    family_name: Option<String>,
    picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LiWebhookEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: LiWebhookMessage,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiWebhookMessage {
    #[serde(alias = "accountId")]
    recipient_id: Option<String>,
    message_id: Option<String>,
    sender_id: Option<String>,
    sender_name: Option<String>,
    content: Option<String>,
    timestamp: Option<i64>,
}

#[async_trait]
impl PlatformConnector for LinkedinConnector {
    fn platform(&self) -> Platform {
        Platform::Linkedin
    }

    fn build_authorization_url(&self, state: &str) -> Result<String> {
        if !self.config.is_complete() {
            return Err(ConnectorError::not_configured(Platform::Linkedin));
        }
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| ConnectorError::fetch_failed(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.scope())
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let token: LiTokenResponse = http::post_form(&self.client, &self.token_url, &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ])
        .await
        .map_err(ConnectorError::exchange_failed)?;

        Ok(TokenGrant::new(
            token.access_token,
            token.refresh_token,
            Some(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
        ))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let info = self.userinfo(access_token).await?;

        let given = info.given_name.unwrap_or_default();
        let family = info.family_name.unwrap_or_default();
        let display_name = format!("{given} {family}").trim().to_string();
        let username = format!("{given}-{family}")
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join("-");

        Ok(Profile {
            platform_id: info.sub,
            username,
            display_name: (!display_name.is_empty()).then_some(display_name),
            avatar_url: info.picture,
            bio: None,
            followers_count: None,
        })
    }

    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>> {
        // Conversation endpoints need a Partnership; validate the token so
        // expiry still surfaces, then report the documented empty set.
        self.userinfo(target.access_token.expose_secret()).await?;
        debug!(
            platform_id = %target.platform_id,
            "linkedin messaging requires partnership access; nothing to fetch"
        );
        Ok(Vec::new())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let token: LiTokenResponse = http::post_form(&self.client, &self.token_url, &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ])
        .await
        .map_err(http::HttpFailure::into_refresh_error)?;

        Ok(TokenGrant::new(
            token.access_token,
            token.refresh_token,
            Some(token.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
        ))
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        webhook::verify_hmac_hex(
            payload,
            signature,
            SIGNATURE_PREFIX,
            self.config.client_secret.expose_secret(),
        )
    }

    /// LinkedIn's registration handshake: respond with the HMAC of the
    /// challenge code, keyed by the client secret.
    fn webhook_challenge(&self, params: &ChallengeParams) -> Option<String> {
        let code = params.challenge_code.as_deref()?;
        Some(webhook::hmac_hex(
            self.config.client_secret.expose_secret(),
            code.as_bytes(),
        ))
    }

    fn decode_webhook_events(&self, payload: &[u8]) -> Result<Vec<InboundMessage>> {
        let envelope: LiWebhookEnvelope = serde_json::from_slice(payload)
            .map_err(|e| ConnectorError::malformed_payload(e))?;

        if envelope.kind != "MESSAGE" {
            debug!(kind = %envelope.kind, "ignoring non-message linkedin webhook");
            return Ok(Vec::new());
        }

        let data = envelope.data;
        let (Some(recipient_id), Some(message_id)) = (data.recipient_id, data.message_id) else {
            return Err(ConnectorError::malformed_payload(
                "message webhook missing recipient or message id",
            ));
        };

        Ok(vec![InboundMessage {
            recipient_platform_id: recipient_id,
            message: PlatformMessage {
                platform_message_id: message_id,
                sender_id: data.sender_id.unwrap_or_else(|| "unknown".into()),
                sender_name: data.sender_name,
                text: data.content.unwrap_or_default(),
                sent_at_ms: data.timestamp.unwrap_or(0),
            },
        }])
    }
}
