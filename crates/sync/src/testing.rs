//! Scripted connector and fixtures shared by the service and ingress tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use {async_trait::async_trait, secrecy::Secret};

use {
    omnibox_accounts::{Account, AccountStatus},
    omnibox_connectors::{
        ChallengeParams, ConnectorError, ConnectorRegistry, InboundMessage, Platform,
        PlatformConnector, PlatformMessage, Profile, SyncTarget,
    },
    omnibox_oauth::TokenGrant,
};

/// What `fetch_new_messages` should do for one platform id.
pub(crate) enum Script {
    Messages(Vec<PlatformMessage>),
    Transient,
    InvalidToken,
}

enum RefreshScript {
    Unset,
    Ok(String),
    Rejected,
}

pub(crate) struct ScriptedConnector {
    platform: Platform,
    scripts: HashMap<String, Script>,
    refresh: RefreshScript,
    fetch_counter: Option<Arc<AtomicUsize>>,
    webhook_events: Vec<InboundMessage>,
}

impl ScriptedConnector {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            scripts: HashMap::new(),
            refresh: RefreshScript::Unset,
            fetch_counter: None,
            webhook_events: Vec::new(),
        }
    }

    pub(crate) fn on(mut self, platform_id: &str, script: Script) -> Self {
        self.scripts.insert(platform_id.to_string(), script);
        self
    }

    pub(crate) fn refresh_ok(mut self, access_token: &str) -> Self {
        self.refresh = RefreshScript::Ok(access_token.to_string());
        self
    }

    pub(crate) fn refresh_rejected(mut self) -> Self {
        self.refresh = RefreshScript::Rejected;
        self
    }

    pub(crate) fn count_fetches(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.fetch_counter = Some(counter);
        self
    }

    pub(crate) fn webhook_events(mut self, events: Vec<InboundMessage>) -> Self {
        self.webhook_events = events;
        self
    }
}

#[async_trait]
impl PlatformConnector for ScriptedConnector {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn build_authorization_url(&self, state: &str) -> omnibox_connectors::Result<String> {
        Ok(format!("https://provider.test/authorize?state={state}"))
    }

    async fn exchange_code(&self, _code: &str) -> omnibox_connectors::Result<TokenGrant> {
        Ok(TokenGrant::new("exchanged".into(), Some("refresh".into()), Some(3600)))
    }

    async fn fetch_profile(&self, _access_token: &str) -> omnibox_connectors::Result<Profile> {
        Err(ConnectorError::not_supported("profile in scripted connector"))
    }

    async fn fetch_new_messages(
        &self,
        target: &SyncTarget,
    ) -> omnibox_connectors::Result<Vec<PlatformMessage>> {
        if let Some(counter) = &self.fetch_counter {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        match self.scripts.get(&target.platform_id) {
            None => Ok(Vec::new()),
            Some(Script::Messages(messages)) => Ok(messages.clone()),
            Some(Script::Transient) => {
                Err(ConnectorError::fetch_failed("scripted transient failure"))
            },
            Some(Script::InvalidToken) => Err(ConnectorError::InvalidToken),
        }
    }

    async fn refresh_token(&self, _refresh_token: &str) -> omnibox_connectors::Result<TokenGrant> {
        match &self.refresh {
            RefreshScript::Ok(token) => Ok(TokenGrant::new(
                token.clone(),
                Some("rotated-refresh".into()),
                Some(3600),
            )),
            RefreshScript::Rejected | RefreshScript::Unset => {
                Err(ConnectorError::refresh_failed("scripted rejection"))
            },
        }
    }

    fn verify_webhook_signature(&self, _payload: &[u8], signature: &str) -> bool {
        signature == "valid-signature"
    }

    fn webhook_challenge(&self, params: &ChallengeParams) -> Option<String> {
        params.challenge.clone()
    }

    fn decode_webhook_events(
        &self,
        payload: &[u8],
    ) -> omnibox_connectors::Result<Vec<InboundMessage>> {
        if payload == b"malformed" {
            return Err(ConnectorError::malformed_payload("scripted decode failure"));
        }
        Ok(self.webhook_events.clone())
    }
}

pub(crate) fn registry_with(connector: ScriptedConnector) -> Arc<ConnectorRegistry> {
    let mut registry = ConnectorRegistry::new();
    registry.register(Box::new(connector));
    Arc::new(registry)
}

pub(crate) fn connected_account(platform_id: &str, platform: Platform) -> Account {
    Account {
        id: format!("acct-{platform_id}"),
        user_id: "u1".into(),
        platform,
        platform_id: platform_id.into(),
        username: format!("user-{platform_id}"),
        display_name: None,
        avatar_url: None,
        status: AccountStatus::Connected,
        access_token: Some(Secret::new("access-token".into())),
        refresh_token: Some(Secret::new("refresh-token".into())),
        token_expires_at_ms: None,
        last_synced_at_ms: None,
        last_activity_at_ms: None,
        created_at_ms: 0,
        updated_at_ms: 0,
    }
}
