use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
};

/// Supported external platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Instagram,
    Linkedin,
    Tiktok,
    Youtube,
    Twitter,
    Facebook,
}

impl Platform {
    pub const ALL: [Platform; 6] = [
        Platform::Instagram,
        Platform::Linkedin,
        Platform::Tiktok,
        Platform::Youtube,
        Platform::Twitter,
        Platform::Facebook,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Instagram => "instagram",
            Platform::Linkedin => "linkedin",
            Platform::Tiktok => "tiktok",
            Platform::Youtube => "youtube",
            Platform::Twitter => "twitter",
            Platform::Facebook => "facebook",
        }
    }

    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Platform::Instagram => "Instagram",
            Platform::Linkedin => "LinkedIn",
            Platform::Tiktok => "TikTok",
            Platform::Youtube => "YouTube",
            Platform::Twitter => "Twitter",
            Platform::Facebook => "Facebook",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for parsing a platform name from a path segment or stored row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown platform: {0}")]
pub struct UnknownPlatform(pub String);

impl std::str::FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instagram" => Ok(Platform::Instagram),
            "linkedin" => Ok(Platform::Linkedin),
            "tiktok" => Ok(Platform::Tiktok),
            "youtube" => Ok(Platform::Youtube),
            "twitter" => Ok(Platform::Twitter),
            "facebook" => Ok(Platform::Facebook),
            other => Err(UnknownPlatform(other.to_string())),
        }
    }
}

/// Profile data fetched from a platform after connecting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    /// The account's identifier on the platform.
    pub platform_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub followers_count: Option<i64>,
}

/// One inbound message as decoded at the connector boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformMessage {
    /// The message's identifier on the platform, used as the dedupe key.
    pub platform_message_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub text: String,
    pub sent_at_ms: i64,
}

/// A webhook-delivered message plus the platform id of the account it is for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub recipient_platform_id: String,
    pub message: PlatformMessage,
}

/// The slice of a connected account a connector needs to fetch messages:
/// who the account is on the platform, its access token, and the cursor
/// for "new". Keeps connectors decoupled from the credential store.
#[derive(Clone)]
pub struct SyncTarget {
    pub platform_id: String,
    pub access_token: Secret<String>,
    pub last_synced_at_ms: Option<i64>,
}

impl std::fmt::Debug for SyncTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncTarget")
            .field("platform_id", &self.platform_id)
            .field("access_token", &"[REDACTED]")
            .field("last_synced_at_ms", &self.last_synced_at_ms)
            .finish()
    }
}

/// Query parameters a platform sends when verifying a webhook registration.
///
/// Meta platforms send `hub.mode` / `hub.verify_token` / `hub.challenge`;
/// LinkedIn sends a `challengeCode` to be HMAC'd.
#[derive(Debug, Clone, Default)]
pub struct ChallengeParams {
    pub mode: Option<String>,
    pub verify_token: Option<String>,
    pub challenge: Option<String>,
    pub challenge_code: Option<String>,
}
