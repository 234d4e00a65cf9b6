//! Instagram connector (Basic Display API).
//!
//! Messaging requires an Instagram Business account behind Graph-API review,
//! so message fetch reports nothing by design. The code exchange performs
//! the documented short-lived → long-lived token hop; the long-lived token
//! is also the refresh credential (`ig_refresh_token` refreshes the access
//! token itself).

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

const AUTHORIZE_URL: &str = "https://api.instagram.com/oauth/authorize";
const TOKEN_URL: &str = "https://api.instagram.com/oauth/access_token";
const API_BASE: &str = "https://graph.instagram.com";

/// 60 days, the documented long-lived token lifetime.
const DEFAULT_EXPIRES_IN_SECS: i64 = 5_184_000;

const DEFAULT_SCOPES: [&str; 2] = ["user_profile", "user_media"];

pub struct InstagramConnector {
    config: PlatformOAuthConfig,
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    api_base: String,
}

impl InstagramConnector {
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
            DEFAULT_SCOPES.join(",")
        } else {
            self.config.scopes.join(",")
        }
    }

    /// Trade a short-lived token for the long-lived one.
    async fn exchange_for_long_lived(&self, short_lived: &str) -> Result<LongLivedToken> {
        let url = format!(
            "{}/access_token?grant_type=ig_exchange_token&client_secret={}&access_token={}",
            self.api_base,
            self.config.client_secret.expose_secret(),
            short_lived,
        );
        http::get_json(&self.client, &url, None)
            .await
            .map_err(ConnectorError::exchange_failed)
    }
}

#[derive(Deserialize)]
struct ShortLivedToken {
    access_token: String,
}

#[derive(Deserialize)]
struct LongLivedToken {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct IgProfile {
    id: String,
    username: String,
    profile_picture_url: Option<String>,
}

impl LongLivedToken {
    fn into_grant(self) -> TokenGrant {
        // The long-lived token doubles as the refresh credential.
        TokenGrant::new(
            self.access_token.clone(),
            Some(self.access_token),
            Some(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
        )
    }
}

#[async_trait]
impl PlatformConnector for InstagramConnector {
    fn platform(&self) -> Platform {
        Platform::Instagram
    }

    fn build_authorization_url(&self, state: &str) -> Result<String> {
        if !self.config.is_complete() {
            return Err(ConnectorError::not_configured(Platform::Instagram));
        }
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| ConnectorError::fetch_failed(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.scope())
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let short: ShortLivedToken = http::post_form(&self.client, &self.token_url, &[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
        .map_err(ConnectorError::exchange_failed)?;

        let long = self.exchange_for_long_lived(&short.access_token).await?;
        Ok(long.into_grant())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let url = format!(
            "{}/me?fields=id,username,account_type,media_count,profile_picture_url&access_token={access_token}",
            self.api_base,
        );
        let profile: IgProfile =
            http::get_json(&self.client, &url, None).await.map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })?;

        Ok(Profile {
            platform_id: profile.id,
            display_name: Some(profile.username.clone()),
            username: profile.username,
            avatar_url: profile.profile_picture_url,
            bio: None,
            followers_count: None,
        })
    }

    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>> {
        // Direct messages need a Business account plus app review; polling
        // has nothing to pull for Basic Display connections.
        debug!(
            platform_id = %target.platform_id,
            "instagram messaging requires business verification; nothing to fetch"
        );
        Ok(Vec::new())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let url = format!(
            "{}/refresh_access_token?grant_type=ig_refresh_token&access_token={refresh_token}",
            self.api_base,
        );
        let refreshed: LongLivedToken = http::get_json(&self.client, &url, None)
            .await
            .map_err(http::HttpFailure::into_refresh_error)?;
        Ok(refreshed.into_grant())
    }

    fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> bool {
        webhook::verify_hmac_hex(
            payload,
            signature,
            "sha256=",
            self.config.client_secret.expose_secret(),
        )
    }

    fn webhook_challenge(&self, params: &ChallengeParams) -> Option<String> {
        let token = self.config.webhook_verify_token.as_deref()?;
        webhook::meta_subscription_challenge(params, token)
    }

    fn decode_webhook_events(&self, payload: &[u8]) -> Result<Vec<InboundMessage>> {
        webhook::decode_meta_messaging(payload)
    }
}
