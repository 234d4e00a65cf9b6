use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

use crate::types::Platform;

/// OAuth credentials for one platform, constructed once at startup.
///
/// Absence of a platform's config yields a first-class `NotConfigured`
/// error on use, never an empty-string default silently flowing into
/// provider requests.
#[derive(Clone, Serialize, Deserialize)]
pub struct PlatformOAuthConfig {
    pub client_id: String,
    #[serde(serialize_with = "omnibox_oauth::serialize_secret")]
    pub client_secret: Secret<String>,
    pub redirect_uri: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Shared token echoed during Meta-style webhook subscription handshakes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_verify_token: Option<String>,
}

impl PlatformOAuthConfig {
    /// All three mandatory fields present and non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty()
            && !self.client_secret.expose_secret().is_empty()
            && !self.redirect_uri.is_empty()
    }
}

impl std::fmt::Debug for PlatformOAuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformOAuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// The per-platform OAuth configuration the process was started with.
#[derive(Debug, Clone, Default)]
pub struct PlatformConfigSet {
    configs: HashMap<Platform, PlatformOAuthConfig>,
}

impl PlatformConfigSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a platform's config. Incomplete configs are dropped so a
    /// half-set environment behaves exactly like an unset one.
    pub fn insert(&mut self, platform: Platform, config: PlatformOAuthConfig) {
        if config.is_complete() {
            self.configs.insert(platform, config);
        } else {
            tracing::warn!(%platform, "incomplete oauth config ignored");
        }
    }

    #[must_use]
    pub fn get(&self, platform: Platform) -> Option<&PlatformOAuthConfig> {
        self.configs.get(&platform)
    }

    #[must_use]
    pub fn configured_platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.configs.contains_key(p))
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> PlatformOAuthConfig {
        PlatformOAuthConfig {
            client_id: "client-id".into(),
            client_secret: Secret::new("client-secret".into()),
            redirect_uri: "https://app.example.com/auth/callback".into(),
            scopes: vec!["scope.a".into(), "scope.b".into()],
            webhook_verify_token: Some("verify-me".into()),
        }
    }

    #[test]
    fn incomplete_config_is_not_registered() {
        let mut set = PlatformConfigSet::new();
        set.insert(Platform::Tiktok, PlatformOAuthConfig {
            client_id: String::new(),
            ..test_config()
        });
        assert!(set.get(Platform::Tiktok).is_none());
        assert!(set.configured_platforms().is_empty());
    }

    #[test]
    fn complete_config_is_registered() {
        let mut set = PlatformConfigSet::new();
        set.insert(Platform::Instagram, test_config());
        assert!(set.get(Platform::Instagram).is_some());
        assert_eq!(set.configured_platforms(), vec![Platform::Instagram]);
    }

    #[test]
    fn debug_redacts_client_secret() {
        let rendered = format!("{:?}", test_config());
        assert!(!rendered.contains("client-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
