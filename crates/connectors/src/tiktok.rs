//! TikTok connector.
//!
//! OAuth and profile only: TikTok exposes no direct-message API to
//! third-party apps, and it has no webhook surface here, so the trait
//! defaults (fail-closed signature check, `NotSupported` decode) stand.

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

const AUTHORIZE_URL: &str = "https://www.tiktok.com/auth/authorize/";
const TOKEN_URL: &str = "https://open-api.tiktok.com/oauth/access_token/";
const REFRESH_URL: &str = "https://open-api.tiktok.com/oauth/refresh_token/";
const USER_INFO_URL: &str = "https://open-api.tiktok.com/user/info/";

const DEFAULT_SCOPES: [&str; 2] = ["user.info.basic", "video.list"];

pub struct TiktokConnector {
    config: PlatformOAuthConfig,
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    refresh_url: String,
    user_info_url: String,
}

impl TiktokConnector {
    pub fn new(config: PlatformOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            refresh_url: REFRESH_URL.to_string(),
            user_info_url: USER_INFO_URL.to_string(),
        }
    }

    fn scope(&self) -> String {
        if self.config.scopes.is_empty() {
            DEFAULT_SCOPES.join(",")
        } else {
            self.config.scopes.join(",")
        }
    }
}

// TikTok wraps everything in a `data` envelope.

#[derive(Deserialize)]
struct TtResponse<T> {
    data: T,
}

#[derive(Deserialize)]
struct TtTokenData {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TtUserData {
    user: TtUser,
}

#[derive(Deserialize)]
struct TtUser {
    open_id: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
}

fn into_grant(data: TtTokenData) -> TokenGrant {
    TokenGrant::new(data.access_token, data.refresh_token, data.expires_in)
}

#[async_trait]
impl PlatformConnector for TiktokConnector {
    fn platform(&self) -> Platform {
        Platform::Tiktok
    }

    fn build_authorization_url(&self, state: &str) -> Result<String> {
        if !self.config.is_complete() {
            return Err(ConnectorError::not_configured(Platform::Tiktok));
        }
        let mut url = Url::parse(&self.authorize_url)
            .map_err(|e| ConnectorError::fetch_failed(format!("invalid authorize url: {e}")))?;
        url.query_pairs_mut()
            .append_pair("client_key", &self.config.client_id)
            .append_pair("redirect_uri", &self.config.redirect_uri)
            .append_pair("scope", &self.scope())
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url.to_string())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenGrant> {
        let response: TtResponse<TtTokenData> =
            http::post_form(&self.client, &self.token_url, &[
                ("client_key", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.expose_secret().as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .await
            .map_err(ConnectorError::exchange_failed)?;
        Ok(into_grant(response.data))
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let url = format!("{}?access_token={access_token}", self.user_info_url);
        let response: TtResponse<TtUserData> =
            http::get_json(&self.client, &url, None).await.map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })?;

        let user = response.data.user;
        Ok(Profile {
            platform_id: user.open_id,
            username: user.display_name.clone().unwrap_or_else(|| "tiktok-user".into()),
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            bio: None,
            followers_count: None,
        })
    }

    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>> {
        // No third-party DM API.
        debug!(
            platform_id = %target.platform_id,
            "tiktok has no messaging api; nothing to fetch"
        );
        Ok(Vec::new())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let response: TtResponse<TtTokenData> =
            http::post_form(&self.client, &self.refresh_url, &[
                ("client_key", self.config.client_id.as_str()),
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .await
            .map_err(http::HttpFailure::into_refresh_error)?;
        Ok(into_grant(response.data))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::types::ChallengeParams, secrecy::Secret};

    fn config() -> PlatformOAuthConfig {
        PlatformOAuthConfig {
            client_id: "tt-client".into(),
            client_secret: Secret::new("tt-secret".into()),
            redirect_uri: "https://app.example.com/auth/tiktok/callback".into(),
            scopes: Vec::new(),
            webhook_verify_token: None,
        }
    }

    #[test]
    fn authorization_url_uses_client_key() {
        let url = TiktokConnector::new(config())
            .build_authorization_url("st")
            .unwrap();
        assert!(url.contains("client_key=tt-client"));
        assert!(url.contains("scope=user.info.basic%2Cvideo.list"));
    }

    #[tokio::test]
    async fn exchange_unwraps_data_envelope() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/access_token/")
            .with_status(200)
            .with_body(
                r#"{"data": {"access_token": "at", "refresh_token": "rt", "expires_in": 86400, "open_id": "o1"}}"#,
            )
            .create_async()
            .await;

        let mut connector = TiktokConnector::new(config());
        connector.token_url = format!("{}/oauth/access_token/", server.url());
        let grant = connector.exchange_code("code").await.unwrap();
        assert_eq!(grant.access_token.expose_secret(), "at");
    }

    #[tokio::test]
    async fn no_messaging_capability() {
        let target = SyncTarget {
            platform_id: "o1".into(),
            access_token: Secret::new("t".into()),
            last_synced_at_ms: None,
        };
        let messages = TiktokConnector::new(config())
            .fetch_new_messages(&target)
            .await
            .unwrap();
        assert!(messages.is_empty());
    }

    #[test]
    fn webhook_surface_fails_closed() {
        let connector = TiktokConnector::new(config());
        assert!(!connector.verify_webhook_signature(b"body", "sha256=abc"));
        assert!(connector.webhook_challenge(&ChallengeParams::default()).is_none());
        assert!(matches!(
            connector.decode_webhook_events(b"{}"),
            Err(ConnectorError::NotSupported { .. })
        ));
    }
}
