use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use {
    omnibox_connectors::{Platform, Profile, SyncTarget},
    omnibox_oauth::TokenGrant,
};

use crate::now_ms;

/// Connection status: the single source of truth for whether an account
/// participates in scheduled sync (only `Connected` does).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Connected,
    Disconnected,
    Error,
    Expired,
}

impl AccountStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Connected => "connected",
            AccountStatus::Disconnected => "disconnected",
            AccountStatus::Error => "error",
            AccountStatus::Expired => "expired",
        }
    }

    pub fn parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "connected" => Ok(AccountStatus::Connected),
            "disconnected" => Ok(AccountStatus::Disconnected),
            "error" => Ok(AccountStatus::Error),
            "expired" => Ok(AccountStatus::Expired),
            other => Err(anyhow::anyhow!("unknown account status: {other}")),
        }
    }
}

/// One connected external identity and its credential material.
///
/// Unique per (user_id, platform, platform_id): reconnecting the same
/// external identity updates the row rather than duplicating it.
#[derive(Clone, Serialize)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    pub platform: Platform,
    pub platform_id: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    pub status: AccountStatus,
    #[serde(skip_serializing)]
    pub access_token: Option<Secret<String>>,
    #[serde(skip_serializing)]
    pub refresh_token: Option<Secret<String>>,
    pub token_expires_at_ms: Option<i64>,
    pub last_synced_at_ms: Option<i64>,
    pub last_activity_at_ms: Option<i64>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl Account {
    /// A token needs refresh iff an expiry is recorded and has passed.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.token_expires_at_ms.is_some_and(|t| t < now_ms())
    }

    /// The narrow view a connector needs to fetch messages.
    /// `None` when the account holds no access token.
    #[must_use]
    pub fn sync_target(&self) -> Option<SyncTarget> {
        Some(SyncTarget {
            platform_id: self.platform_id.clone(),
            access_token: Secret::new(self.access_token.as_ref()?.expose_secret().clone()),
            last_synced_at_ms: self.last_synced_at_ms,
        })
    }
}

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("platform", &self.platform)
            .field("platform_id", &self.platform_id)
            .field("status", &self.status)
            .field("access_token", &self.access_token.as_ref().map(|_| "[REDACTED]"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .finish_non_exhaustive()
    }
}

/// Everything a successful OAuth exchange yields, ready to persist.
#[derive(Debug, Clone)]
pub struct NewConnection {
    pub user_id: String,
    pub platform: Platform,
    pub profile: Profile,
    pub grant: TokenGrant,
}

/// Whether a sync failure invalidated the credentials or was transient.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDisposition {
    /// Token/refresh rejected; the user must re-authenticate.
    TokenExpired,
    /// Network or API hiccup; retried on the next scheduled pass.
    Transient,
}

/// Outcome of one `sync_account` invocation, recorded exactly once.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    Success { new_messages: u32 },
    Failure {
        disposition: FailureDisposition,
        error: String,
    },
}

impl SyncOutcome {
    /// The account status this outcome transitions to.
    #[must_use]
    pub fn status(&self) -> AccountStatus {
        match self {
            SyncOutcome::Success { .. } => AccountStatus::Connected,
            SyncOutcome::Failure {
                disposition: FailureDisposition::TokenExpired,
                ..
            } => AccountStatus::Expired,
            SyncOutcome::Failure { .. } => AccountStatus::Error,
        }
    }
}

/// An inbound message headed for the mirror, keyed for dedupe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub account_id: String,
    pub platform_message_id: String,
    pub sender_id: String,
    pub sender_name: Option<String>,
    pub body: String,
    pub received_at_ms: i64,
}

/// A mirrored message as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub id: i64,
    pub account_id: String,
    pub platform_message_id: String,
    pub sender_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub body: String,
    pub received_at_ms: i64,
    pub created_at_ms: i64,
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            id: "a1".into(),
            user_id: "u1".into(),
            platform: Platform::Linkedin,
            platform_id: "pid".into(),
            username: "user".into(),
            display_name: None,
            avatar_url: None,
            status: AccountStatus::Connected,
            access_token: Some(Secret::new("tok".into())),
            refresh_token: None,
            token_expires_at_ms: None,
            last_synced_at_ms: None,
            last_activity_at_ms: None,
            created_at_ms: 0,
            updated_at_ms: 0,
        }
    }

    #[test]
    fn needs_refresh_only_when_expiry_passed() {
        let mut acc = account();
        assert!(!acc.needs_refresh(), "no expiry recorded");

        acc.token_expires_at_ms = Some(now_ms() + 60_000);
        assert!(!acc.needs_refresh());

        acc.token_expires_at_ms = Some(now_ms() - 1);
        assert!(acc.needs_refresh());
    }

    #[test]
    fn outcome_drives_status_transition() {
        assert_eq!(
            SyncOutcome::Success { new_messages: 3 }.status(),
            AccountStatus::Connected
        );
        assert_eq!(
            SyncOutcome::Failure {
                disposition: FailureDisposition::TokenExpired,
                error: "401".into(),
            }
            .status(),
            AccountStatus::Expired
        );
        assert_eq!(
            SyncOutcome::Failure {
                disposition: FailureDisposition::Transient,
                error: "timeout".into(),
            }
            .status(),
            AccountStatus::Error
        );
    }

    #[test]
    fn debug_and_json_redact_tokens() {
        let acc = account();
        assert!(!format!("{acc:?}").contains("tok"));
        let json = serde_json::to_string(&acc).unwrap();
        assert!(!json.contains("tok"));
        assert!(!json.contains("access_token"));
    }

    #[test]
    fn sync_target_requires_access_token() {
        let mut acc = account();
        assert!(acc.sync_target().is_some());
        acc.access_token = None;
        assert!(acc.sync_target().is_none());
    }
}
