use std::sync::Arc;

use {
    omnibox_accounts::AccountStore,
    omnibox_connectors::ConnectorRegistry,
    omnibox_oauth::StateCodec,
    omnibox_sync::{SyncService, WebhookIngress},
};

/// Shared handler state, assembled once by the process entry point.
#[derive(Clone)]
pub struct AppState {
    pub codec: StateCodec,
    pub registry: Arc<ConnectorRegistry>,
    pub accounts: Arc<dyn AccountStore>,
    pub sync: Arc<SyncService>,
    pub ingress: Arc<WebhookIngress>,
    /// Base URL the OAuth callback redirects end users back to.
    pub frontend_url: String,
}
