//! Twitter connector (v2 API).
//!
//! DM endpoints require elevated API access most apps do not hold, so
//! message fetch reports nothing; OAuth, profile and refresh are
//! implemented against the v2 endpoints.

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

const AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
const TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";
const ME_URL: &str = "https://api.twitter.com/2/users/me";

const DEFAULT_SCOPES: [&str; 4] = ["tweet.read", "users.read", "dm.read", "offline.access"];

pub struct TwitterConnector {
    config: PlatformOAuthConfig,
    client: reqwest::Client,
    authorize_url: String,
    token_url: String,
    me_url: String,
}

impl TwitterConnector {
    pub fn new(config: PlatformOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            token_url: TOKEN_URL.to_string(),
            me_url: ME_URL.to_string(),
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
struct TwTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct TwMeResponse {
    data: TwUser,
}

#[derive(Deserialize)]
struct TwUser {
    id: String,
    username: String,
    name: Option<String>,
    profile_image_url: Option<String>,
    public_metrics: Option<TwMetrics>,
}

#[derive(Deserialize)]
struct TwMetrics {
    followers_count: Option<i64>,
}

#[async_trait]
impl PlatformConnector for TwitterConnector {
    fn platform(&self) -> Platform {
        Platform::Twitter
    }

    fn build_authorization_url(&self, state: &str) -> Result<String> {
        if !self.config.is_complete() {
            return Err(ConnectorError::not_configured(Platform::Twitter));
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
        let token: TwTokenResponse = http::post_form(&self.client, &self.token_url, &[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
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
            "{}?user.fields=profile_image_url,public_metrics",
            self.me_url,
        );
        let me: TwMeResponse = http::get_json(&self.client, &url, Some(access_token))
            .await
            .map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })?;

        let user = me.data;
        Ok(Profile {
            platform_id: user.id,
            username: user.username,
            display_name: user.name,
            avatar_url: user.profile_image_url,
            bio: None,
            followers_count: user.public_metrics.and_then(|m| m.followers_count),
        })
    }

    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>> {
        // DM endpoints need elevated access.
        debug!(
            platform_id = %target.platform_id,
            "twitter dm api requires elevated access; nothing to fetch"
        );
        Ok(Vec::new())
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let token: TwTokenResponse = http::post_form(&self.client, &self.token_url, &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ])
        .await
        .map_err(http::HttpFailure::into_refresh_error)?;
        Ok(TokenGrant::new(
            token.access_token,
            token.refresh_token,
            token.expires_in,
        ))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn config() -> PlatformOAuthConfig {
        PlatformOAuthConfig {
            client_id: "tw-client".into(),
            client_secret: Secret::new("tw-secret".into()),
            redirect_uri: "https://app.example.com/auth/twitter/callback".into(),
            scopes: Vec::new(),
            webhook_verify_token: None,
        }
    }

    #[test]
    fn authorization_url_includes_dm_read_scope() {
        let url = TwitterConnector::new(config())
            .build_authorization_url("st")
            .unwrap();
        assert!(url.contains("dm.read"));
        assert!(url.contains("state=st"));
    }

    #[tokio::test]
    async fn profile_maps_v2_me_response() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/2/users/me")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"data": {"id": "12345", "username": "jack", "name": "Jack", "public_metrics": {"followers_count": 99}}}"#,
            )
            .create_async()
            .await;

        let mut connector = TwitterConnector::new(config());
        connector.me_url = format!("{}/2/users/me", server.url());
        let profile = connector.fetch_profile("token").await.unwrap();
        assert_eq!(profile.platform_id, "12345");
        assert_eq!(profile.username, "jack");
        assert_eq!(profile.followers_count, Some(99));
    }

    #[tokio::test]
    async fn refresh_rotation_is_passed_through() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/2/oauth2/token")
            .with_status(200)
            .with_body(
                r#"{"access_token": "at2", "refresh_token": "rt2", "expires_in": 7200, "token_type": "bearer"}"#,
            )
            .create_async()
            .await;

        let mut connector = TwitterConnector::new(config());
        connector.token_url = format!("{}/2/oauth2/token", server.url());
        let grant = connector.refresh_token("rt1").await.unwrap();
        assert_eq!(grant.refresh_token.unwrap().expose_secret(), "rt2");
    }
}
