use std::collections::HashMap;

use crate::{
    config::PlatformConfigSet,
    connector::PlatformConnector,
    error::{ConnectorError, Result},
    facebook::FacebookConnector,
    instagram::InstagramConnector,
    linkedin::LinkedinConnector,
    tiktok::TiktokConnector,
    twitter::TwitterConnector,
    types::Platform,
    youtube::YoutubeConnector,
};

/// Registry of the connectors this process was configured with.
///
/// Only platforms with complete OAuth config are registered; the rest
/// surface `NotConfigured` on lookup, which callers translate into an
/// actionable message rather than a crash.
pub struct ConnectorRegistry {
    connectors: HashMap<Platform, Box<dyn PlatformConnector>>,
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Build connectors for every platform present in `configs`.
    #[must_use]
    pub fn from_config(configs: &PlatformConfigSet) -> Self {
        let mut registry = Self::new();
        for platform in configs.configured_platforms() {
            let Some(config) = configs.get(platform) else {
                continue;
            };
            let config = config.clone();
            let connector: Box<dyn PlatformConnector> = match platform {
                Platform::Instagram => Box::new(InstagramConnector::new(config)),
                Platform::Linkedin => Box::new(LinkedinConnector::new(config)),
                Platform::Tiktok => Box::new(TiktokConnector::new(config)),
                Platform::Youtube => Box::new(YoutubeConnector::new(config)),
                Platform::Twitter => Box::new(TwitterConnector::new(config)),
                Platform::Facebook => Box::new(FacebookConnector::new(config)),
            };
            registry.register(connector);
        }
        registry
    }

    pub fn register(&mut self, connector: Box<dyn PlatformConnector>) {
        self.connectors.insert(connector.platform(), connector);
    }

    /// Look up the connector for `platform`.
    pub fn get(&self, platform: Platform) -> Result<&dyn PlatformConnector> {
        self.connectors
            .get(&platform)
            .map(|c| c.as_ref())
            .ok_or_else(|| ConnectorError::not_configured(platform))
    }

    #[must_use]
    pub fn platforms(&self) -> Vec<Platform> {
        Platform::ALL
            .into_iter()
            .filter(|p| self.connectors.contains_key(p))
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::config::PlatformOAuthConfig, secrecy::Secret};

    fn config_for(platform: Platform) -> PlatformOAuthConfig {
        PlatformOAuthConfig {
            client_id: format!("{platform}-client"),
            client_secret: Secret::new("secret".into()),
            redirect_uri: format!("https://app.example.com/auth/{platform}/callback"),
            scopes: Vec::new(),
            webhook_verify_token: None,
        }
    }

    #[test]
    fn only_configured_platforms_are_registered() {
        let mut set = PlatformConfigSet::new();
        set.insert(Platform::Linkedin, config_for(Platform::Linkedin));
        set.insert(Platform::Facebook, config_for(Platform::Facebook));

        let registry = ConnectorRegistry::from_config(&set);
        assert_eq!(
            registry.platforms(),
            vec![Platform::Linkedin, Platform::Facebook]
        );
        assert!(registry.get(Platform::Linkedin).is_ok());
        assert!(matches!(
            registry.get(Platform::Tiktok),
            Err(ConnectorError::NotConfigured { .. })
        ));
    }

    #[test]
    fn registered_connector_reports_its_platform() {
        let mut set = PlatformConfigSet::new();
        set.insert(Platform::Youtube, config_for(Platform::Youtube));
        let registry = ConnectorRegistry::from_config(&set);
        assert_eq!(
            registry.get(Platform::Youtube).unwrap().platform(),
            Platform::Youtube
        );
    }
}
