//! Facebook connector (Graph API v18).
//!
//! The only connector with a real message fetch: page conversations are
//! pulled through the Graph API and filtered against the account's
//! last-synced cursor. Long-lived tokens come from the `fb_exchange_token`
//! grant, which also serves as the refresh path.

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

const AUTHORIZE_URL: &str = "https://www.facebook.com/v18.0/dialog/oauth";
const API_BASE: &str = "https://graph.facebook.com/v18.0";

/// 60 days, the long-lived page token lifetime.
const DEFAULT_EXPIRES_IN_SECS: i64 = 5_184_000;

const DEFAULT_SCOPES: [&str; 3] = [
    "pages_manage_metadata",
    "pages_read_engagement",
    "pages_messaging",
];

pub struct FacebookConnector {
    config: PlatformOAuthConfig,
    client: reqwest::Client,
    authorize_url: String,
    api_base: String,
}

impl FacebookConnector {
    pub fn new(config: PlatformOAuthConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
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
}

#[derive(Deserialize)]
struct FbTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

impl FbTokenResponse {
    fn into_grant(self) -> TokenGrant {
        // Graph tokens refresh through fb_exchange_token on the token itself.
        TokenGrant::new(
            self.access_token.clone(),
            Some(self.access_token),
            Some(self.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS)),
        )
    }
}

#[derive(Deserialize)]
struct FbProfile {
    id: String,
    name: String,
    picture: Option<FbPicture>,
}

#[derive(Deserialize)]
struct FbPicture {
    data: Option<FbPictureData>,
}

#[derive(Deserialize)]
struct FbPictureData {
    url: Option<String>,
}

#[derive(Deserialize)]
struct ConversationList {
    #[serde(default)]
    data: Vec<Conversation>,
}

#[derive(Deserialize)]
struct Conversation {
    messages: Option<MessageList>,
}

#[derive(Deserialize)]
struct MessageList {
    #[serde(default)]
    data: Vec<FbMessage>,
}

#[derive(Deserialize)]
struct FbMessage {
    id: String,
    from: Option<FbParty>,
    message: Option<String>,
    created_time: Option<String>,
}

#[derive(Deserialize)]
struct FbParty {
    id: String,
    name: Option<String>,
}

/// Graph timestamps come as `2026-01-05T10:00:00+0000`; strict RFC 3339
/// wants a colon in the offset, so try both shapes.
fn parse_graph_time(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%z")
        .or_else(|_| chrono::DateTime::parse_from_rfc3339(value))
        .ok()
        .map(|dt| dt.timestamp_millis())
}

#[async_trait]
impl PlatformConnector for FacebookConnector {
    fn platform(&self) -> Platform {
        Platform::Facebook
    }

    fn build_authorization_url(&self, state: &str) -> Result<String> {
        if !self.config.is_complete() {
            return Err(ConnectorError::not_configured(Platform::Facebook));
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
        let url = format!("{}/oauth/access_token", self.api_base);
        let token: FbTokenResponse = http::post_form(&self.client, &url, &[
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code", code),
        ])
        .await
        .map_err(ConnectorError::exchange_failed)?;
        Ok(token.into_grant())
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<Profile> {
        let url = format!(
            "{}/me?fields=id,name,picture{{url}}&access_token={access_token}",
            self.api_base,
        );
        let profile: FbProfile =
            http::get_json(&self.client, &url, None).await.map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })?;

        Ok(Profile {
            platform_id: profile.id,
            username: profile.name.to_lowercase().replace(' ', "-"),
            display_name: Some(profile.name),
            avatar_url: profile.picture.and_then(|p| p.data).and_then(|d| d.url),
            bio: None,
            followers_count: None,
        })
    }

    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>> {
        let url = format!(
            "{}/{}/conversations?fields=messages{{id,from,message,created_time}}&access_token={}",
            self.api_base,
            target.platform_id,
            target.access_token.expose_secret(),
        );
        let conversations: ConversationList =
            http::get_json(&self.client, &url, None).await.map_err(|e| {
                if e.is_unauthorized() {
                    ConnectorError::InvalidToken
                } else {
                    ConnectorError::fetch_failed(e)
                }
            })?;

        let cursor = target.last_synced_at_ms.unwrap_or(0);
        let mut messages = Vec::new();
        for conversation in conversations.data {
            let Some(list) = conversation.messages else {
                continue;
            };
            for msg in list.data {
                let sent_at_ms = msg
                    .created_time
                    .as_deref()
                    .and_then(parse_graph_time)
                    .unwrap_or(0);
                if sent_at_ms <= cursor && cursor > 0 {
                    continue;
                }
                let Some(from) = msg.from else { continue };
                // Only inbound traffic; the page's own replies are not new mail.
                if from.id == target.platform_id {
                    continue;
                }
                messages.push(PlatformMessage {
                    platform_message_id: msg.id,
                    sender_id: from.id,
                    sender_name: from.name,
                    text: msg.message.unwrap_or_default(),
                    sent_at_ms,
                });
            }
        }
        debug!(
            platform_id = %target.platform_id,
            count = messages.len(),
            "facebook conversations fetched"
        );
        Ok(messages)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant> {
        let url = format!("{}/oauth/access_token", self.api_base);
        let token: FbTokenResponse = http::post_form(&self.client, &url, &[
            ("grant_type", "fb_exchange_token"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
            ("fb_exchange_token", refresh_token),
        ])
        .await
        .map_err(http::HttpFailure::into_refresh_error)?;
        Ok(token.into_grant())
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

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn config() -> PlatformOAuthConfig {
        PlatformOAuthConfig {
            client_id: "fb-client".into(),
            client_secret: Secret::new("fb-secret".into()),
            redirect_uri: "https://app.example.com/auth/facebook/callback".into(),
            scopes: Vec::new(),
            webhook_verify_token: Some("verify-token".into()),
        }
    }

    fn with_server(server: &mockito::ServerGuard) -> FacebookConnector {
        FacebookConnector {
            config: config(),
            client: reqwest::Client::new(),
            authorize_url: AUTHORIZE_URL.to_string(),
            api_base: server.url(),
        }
    }

    fn target(last_synced_at_ms: Option<i64>) -> SyncTarget {
        SyncTarget {
            platform_id: "page-1".into(),
            access_token: Secret::new("page-token".into()),
            last_synced_at_ms,
        }
    }

    #[test]
    fn graph_time_parses_both_offset_shapes() {
        assert!(parse_graph_time("2026-01-05T10:00:00+0000").is_some());
        assert!(parse_graph_time("2026-01-05T10:00:00+00:00").is_some());
        assert!(parse_graph_time("yesterday").is_none());
    }

    #[tokio::test]
    async fn fetch_filters_by_cursor_and_direction() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/page-1/conversations")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"data": [{"id": "t_1", "messages": {"data": [
                    {"id": "m_old", "from": {"id": "u1", "name": "Ada"}, "message": "old", "created_time": "2026-01-01T00:00:00+0000"},
                    {"id": "m_new", "from": {"id": "u1", "name": "Ada"}, "message": "new", "created_time": "2026-02-01T00:00:00+0000"},
                    {"id": "m_ours", "from": {"id": "page-1"}, "message": "reply", "created_time": "2026-02-02T00:00:00+0000"}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let cursor = parse_graph_time("2026-01-15T00:00:00+0000");
        let messages = with_server(&server)
            .fetch_new_messages(&target(cursor))
            .await
            .unwrap();

        assert_eq!(messages.len(), 1, "old and page-authored messages are dropped");
        assert_eq!(messages[0].platform_message_id, "m_new");
        assert_eq!(messages[0].sender_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn fetch_without_cursor_returns_everything_inbound() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/page-1/conversations")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"data": [{"id": "t_1", "messages": {"data": [
                    {"id": "m_1", "from": {"id": "u1"}, "message": "a", "created_time": "2026-01-01T00:00:00+0000"},
                    {"id": "m_2", "from": {"id": "u2"}, "message": "b", "created_time": "2026-01-02T00:00:00+0000"}
                ]}}]}"#,
            )
            .create_async()
            .await;

        let messages = with_server(&server)
            .fetch_new_messages(&target(None))
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
    }

    #[tokio::test]
    async fn unauthorized_fetch_is_invalid_token() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/page-1/conversations")
            .match_query(mockito::Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error": {"message": "Error validating access token"}}"#)
            .create_async()
            .await;

        let err = with_server(&server)
            .fetch_new_messages(&target(None))
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidToken));
    }

    #[tokio::test]
    async fn exchange_returns_grant_with_refresh_credential() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth/access_token")
            .with_status(200)
            .with_body(r#"{"access_token": "page-token", "token_type": "bearer", "expires_in": 5184000}"#)
            .create_async()
            .await;

        let grant = with_server(&server).exchange_code("code").await.unwrap();
        assert_eq!(grant.access_token.expose_secret(), "page-token");
        assert!(grant.refresh_token.is_some());
    }
}
