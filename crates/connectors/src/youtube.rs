//! YouTube connector (Google OAuth + Data API v3).
//!
//! Comment-thread mirroring has no incremental API worth polling here, so
//! message fetch reports nothing; OAuth, channel profile and token refresh
//! are fully implemented. `access_type=offline` is requested so Google
//! issues a refresh token.

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
    types::{Platform, PlatformMessage, Profile, SyncTarget},
};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const CHANNELS_URL: &str = "https://www.googleapis.com/youtube/v3/channels";

const DEFAULT_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/youtube.readonly",
    "https://www.googleapis.com/auth/youtube.force-ssl",
];

pub struct YoutubeConnector {
    config: PlatformOAuthConfig,
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    channels_url: String,
}

impl YoutubeConnector {
    pub fn new(config: PlatformOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            channels_url: CHANNELS_URL.to_string(),
        }
    }

    fn scope(&self) -> String {
        if self.config.scopes.is_empty() {
            DEFAULT_SCOPES.join(" ")
        } else {
            self.config.scopes.join(" ")
        }
    }
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct ChannelList {
    #[serde(default)]
    items: Vec<Channel>,
}

#[derive(Deserialize)]
struct Channel {
    id: String,
    snippet: Option<ChannelSnippet>,
    statistics: Option<ChannelStatistics>,
}

#[derive(Deserialize)]
struct ChannelSnippet {
    title: Option<String>,
    description: Option<String>,
    thumbnails: Option<Thumbnails>,
}

#[derive(Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Deserialize)]
struct Thumbnail {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ChannelStatistics {
    /// The API returns counts as strings.
    #[serde(rename = "subscriberCount")]
    subscriber_count: Option<String>,
}

#[async_trait]
impl PlatformConnector for YoutubeConnector {
    fn platform(&self) -> Platform {
        Platform::Youtube
    }

    fn build_authorization_url(&self, state: &str) -> Result<String> {
        if !self.config.is_complete() {
            return Err(ConnectorError::not_configured(Platform::Youtube));
        }
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| ConnectorError::fetch_failed(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.scope())
            .append_pair("response_type", "code")
            .append_pair("access_type", "offline")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let token: GoogleTokenResponse = http::post_form(&self.client, &self.token_url, &[
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
        .map_err(ConnectorError::exchange_failed)?;
        Ok(TokenGrant::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
        ))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let url = format!(
            "{}?part=snippet,statistics&mine=true",
            self.channels_url,
        );
        let channels: ChannelList = http::get_json(&self.client, &url, Some(access_token))
            .await
            .map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })?;

        let Some(channel) = channels.items.into_iter().next() else {
            return Err(ConnectorError::fetch_failed("no channel for this account"));
        };

        let snippet = channel.snippet.unwrap_or(ChannelSnippet {
            title: None,
            description: None,
            thumbnails: None,
        });
        let title = snippet.title.unwrap_or_else(|| "youtube-channel".into());

        Ok(Profile {
            platform_id: channel.id,
            username: title.clone(),
            display_name: Some(title),
            avatar_url: snippet
                .thumbnails
                .and_then(|t| t.default)
                .and_then(|t| t.url),
            bio: snippet.description,
            followers_count: channel
                .statistics
                .and_then(|s| s.subscriber_count)
                .and_then(|c| c.parse().ok()),
        })
    }

    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>> {
        // Comment sync is not mirrored into the inbox.
        debug!(
            platform_id = %target.platform_id,
            "youtube comment sync not mirrored; nothing to fetch"
        );
        Ok(Vec::new())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let token: GoogleTokenResponse = http::post_form(&self.client, &self.token_url, &[
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("grant_type", "refresh_token"),
        ])
        .await
        .map_err(http::HttpFailure::into_refresh_error)?;

        // Google does not rotate the refresh token on refresh.
        Ok(TokenGrant::new(
            token.access_token,
            Some(refresh_token.to_string()),
            token.expires_in,
        ))
    }
}
