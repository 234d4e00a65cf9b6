//! Process configuration, read from the environment once at startup.
//!
//! Secrets are logged only as `SET` / `NOT SET`; a platform with
//! incomplete credentials is simply absent from the config set, surfacing
//! as `NotConfigured` on use.

use {
    secrecy::Secret,
    tracing::{info, warn},
};

use omnibox_connectors::{Platform, PlatformConfigSet, PlatformOAuthConfig};

pub struct GatewayConfig {
    /// HMAC key for OAuth state tokens. Must be stable across restarts so
    /// in-flight flows survive a deploy.
    pub state_key: String,
    /// Base URL the OAuth callback redirects end users back to.
    pub frontend_url: String,
    pub platforms: PlatformConfigSet,
}

impl GatewayConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let state_key = std::env::var("OMNIBOX_STATE_KEY").map_err(|_| {
            anyhow::anyhow!("OMNIBOX_STATE_KEY is required (HMAC key for OAuth state tokens)")
        })?;
        if state_key.len() < 16 {
            anyhow::bail!("OMNIBOX_STATE_KEY must be at least 16 bytes");
        }

        let frontend_url = std::env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_string());

        let mut platforms = PlatformConfigSet::new();
        for platform in Platform::ALL {
            if let Some(config) = platform_from_env(platform) {
                platforms.insert(platform, config);
            }
        }

        Ok(Self {
            state_key,
            frontend_url,
            platforms,
        })
    }

    /// One redacted line per platform so operators can see at a glance
    /// which integrations this process can serve.
    pub fn log_summary(&self) {
        for platform in Platform::ALL {
            match self.platforms.get(platform) {
                Some(config) => info!(
                    %platform,
                    client_id = "SET",
                    client_secret = "SET",
                    redirect_uri = %config.redirect_uri,
                    "oauth configured"
                ),
                None => info!(%platform, client_id = "NOT SET", "oauth not configured"),
            }
        }
    }
}

fn env_for(platform: Platform, suffix: &str) -> Option<String> {
    let key = format!("{}_{suffix}", platform.as_str().to_uppercase());
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn platform_from_env(platform: Platform) -> Option<PlatformOAuthConfig> {
    let client_id = env_for(platform, "CLIENT_ID");
    let client_secret = env_for(platform, "CLIENT_SECRET");
    let redirect_uri = env_for(platform, "REDIRECT_URI");

    match (client_id, client_secret, redirect_uri) {
        (Some(client_id), Some(client_secret), Some(redirect_uri)) => {
            Some(PlatformOAuthConfig {
                client_id,
                client_secret: Secret::new(client_secret),
                redirect_uri,
                scopes: env_for(platform, "SCOPES")
                    .map(|s| s.split(',').map(|p| p.trim().to_string()).collect())
                    .unwrap_or_default(),
                webhook_verify_token: env_for(platform, "WEBHOOK_VERIFY_TOKEN"),
            })
        },
        (None, None, None) => None,
        // Partially configured: treat as unset, but say so.
        _ => {
            warn!(
                %platform,
                "partial oauth config (need CLIENT_ID, CLIENT_SECRET and REDIRECT_URI); ignoring"
            );
            None
        },
    }
}
