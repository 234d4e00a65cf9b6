//! Webhook ingress: platform-signed pushes converted into the same
//! message-upsert path the scheduler uses.
//!
//! Nothing in a payload is trusted before its signature verifies; decoding
//! happens at the connector boundary, and dedupe means a message arriving
//! via webhook and again on the next poll lands exactly once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use {
    omnibox_accounts::{AccountStore, MessageStore, NewMessage},
    omnibox_connectors::{ChallengeParams, ConnectorError, ConnectorRegistry, Platform},
};

/// Why a webhook delivery was rejected. Rejections have no side effects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookRejection {
    #[error("webhook signature verification failed")]
    InvalidSignature,

    /// No connected account matches the payload's recipient. Quiet by
    /// design: platforms send stale and irrelevant events.
    #[error("no account matches the webhook recipient")]
    UnknownAccount,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// The platform has no webhook surface, or is not configured.
    #[error("webhooks are not supported for this platform")]
    NotSupported,

    /// The registration handshake did not check out.
    #[error("webhook challenge rejected")]
    ChallengeRejected,
}

/// Accepted delivery summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub new_messages: u32,
}

/// Verifies, decodes and ingests platform webhook events.
pub struct WebhookIngress {
    accounts: Arc<dyn AccountStore>,
    messages: Arc<dyn MessageStore>,
    registry: Arc<ConnectorRegistry>,
}

impl WebhookIngress {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        messages: Arc<dyn MessageStore>,
        registry: Arc<ConnectorRegistry>,
    ) -> Self {
        Self {
            accounts,
            messages,
            registry,
        }
    }

    /// Answer a platform's webhook registration handshake.
    pub fn challenge(
        &self,
        platform: Platform,
        params: &ChallengeParams,
    ) -> Result<String, WebhookRejection> {
        let connector = self
            .registry
            .get(platform)
            .map_err(|_| WebhookRejection::NotSupported)?;
        connector
            .webhook_challenge(params)
            .ok_or(WebhookRejection::ChallengeRejected)
    }

    /// Handle one signed event delivery.
    ///
    /// Signature verification runs over the raw bytes before any payload
    /// field is used for business logic.
    pub async fn handle(
        &self,
        platform: Platform,
        payload: &[u8],
        signature: &str,
    ) -> Result<Ingested, WebhookRejection> {
        let connector = self
            .registry
            .get(platform)
            .map_err(|_| WebhookRejection::NotSupported)?;

        if !connector.verify_webhook_signature(payload, signature) {
            warn!(%platform, "webhook rejected: bad signature");
            return Err(WebhookRejection::InvalidSignature);
        }

        let events = connector.decode_webhook_events(payload).map_err(|e| match e {
            ConnectorError::NotSupported { .. } => WebhookRejection::NotSupported,
            other => WebhookRejection::MalformedPayload(other.to_string()),
        })?;

        if events.is_empty() {
            debug!(%platform, "webhook carried no message events");
            return Ok(Ingested { new_messages: 0 });
        }

        let mut new_messages = 0u32;
        let mut matched_account = false;
        for event in events {
            let account = match self
                .accounts
                .find_by_platform_identity(platform, &event.recipient_platform_id)
                .await
            {
                Ok(Some(account)) => account,
                Ok(None) => {
                    debug!(
                        %platform,
                        recipient = %event.recipient_platform_id,
                        "webhook event for unknown account"
                    );
                    continue;
                },
                Err(e) => {
                    warn!(%platform, error = %e, "account lookup failed during webhook");
                    continue;
                },
            };
            matched_account = true;

            let message = event.message;
            match self
                .messages
                .upsert(NewMessage {
                    account_id: account.id.clone(),
                    platform_message_id: message.platform_message_id,
                    sender_id: message.sender_id,
                    sender_name: message.sender_name,
                    body: message.text,
                    received_at_ms: message.sent_at_ms,
                })
                .await
            {
                Ok(true) => new_messages += 1,
                Ok(false) => {
                    debug!(account_id = %account.id, "webhook message already mirrored");
                },
                Err(e) => {
                    warn!(account_id = %account.id, error = %e, "webhook message write failed");
                },
            }
        }

        if !matched_account {
            return Err(WebhookRejection::UnknownAccount);
        }

        info!(%platform, new_messages, "webhook ingested");
        Ok(Ingested { new_messages })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            service::SyncService,
            testing::{Script, ScriptedConnector, connected_account, registry_with},
        },
        omnibox_accounts::{MemoryAccountStore, MemoryMessageStore},
        omnibox_connectors::{InboundMessage, PlatformMessage},
    };

    fn event(recipient: &str, mid: &str) -> InboundMessage {
        InboundMessage {
            recipient_platform_id: recipient.into(),
            message: PlatformMessage {
                platform_message_id: mid.into(),
                sender_id: "peer-7".into(),
                sender_name: Some("Peer".into()),
                text: "via webhook".into(),
                sent_at_ms: 1_700_000_000_000,
            },
        }
    }

    fn ingress_with(
        connector: ScriptedConnector,
    ) -> (WebhookIngress, Arc<MemoryAccountStore>, Arc<MemoryMessageStore>) {
        let accounts = Arc::new(MemoryAccountStore::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let ingress = WebhookIngress::new(
            Arc::clone(&accounts) as Arc<dyn AccountStore>,
            Arc::clone(&messages) as Arc<dyn MessageStore>,
            registry_with(connector),
        );
        (ingress, accounts, messages)
    }

    #[tokio::test]
    async fn bad_signature_is_rejected_before_any_write() {
        let connector = ScriptedConnector::new(Platform::Instagram)
            .webhook_events(vec![event("pid-1", "m1")]);
        let (ingress, accounts, messages) = ingress_with(connector);
        accounts.insert(connected_account("pid-1", Platform::Instagram));

        let result = ingress
            .handle(Platform::Instagram, b"{}", "forged-signature")
            .await;
        assert_eq!(result, Err(WebhookRejection::InvalidSignature));
        assert_eq!(messages.count_for_account("acct-pid-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_recipient_is_a_quiet_rejection() {
        let connector = ScriptedConnector::new(Platform::Instagram)
            .webhook_events(vec![event("pid-nobody", "m1")]);
        let (ingress, _accounts, _messages) = ingress_with(connector);

        let result = ingress
            .handle(Platform::Instagram, b"{}", "valid-signature")
            .await;
        assert_eq!(result, Err(WebhookRejection::UnknownAccount));
    }

    #[tokio::test]
    async fn malformed_payload_is_rejected() {
        let connector = ScriptedConnector::new(Platform::Instagram);
        let (ingress, _accounts, _messages) = ingress_with(connector);

        let result = ingress
            .handle(Platform::Instagram, b"malformed", "valid-signature")
            .await;
        assert!(matches!(result, Err(WebhookRejection::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn unconfigured_platform_is_not_supported() {
        let connector = ScriptedConnector::new(Platform::Instagram);
        let (ingress, _accounts, _messages) = ingress_with(connector);

        let result = ingress.handle(Platform::Tiktok, b"{}", "valid-signature").await;
        assert_eq!(result, Err(WebhookRejection::NotSupported));
    }

    #[tokio::test]
    async fn delivery_is_ingested_and_redelivery_is_a_noop() {
        let connector = ScriptedConnector::new(Platform::Instagram)
            .webhook_events(vec![event("pid-1", "m1")]);
        let (ingress, accounts, messages) = ingress_with(connector);
        accounts.insert(connected_account("pid-1", Platform::Instagram));

        let first = ingress
            .handle(Platform::Instagram, b"{}", "valid-signature")
            .await
            .unwrap();
        assert_eq!(first.new_messages, 1);

        let second = ingress
            .handle(Platform::Instagram, b"{}", "valid-signature")
            .await
            .unwrap();
        assert_eq!(second.new_messages, 0, "redelivery must not duplicate");
        assert_eq!(messages.count_for_account("acct-pid-1").await.unwrap(), 1);
    }

    /// The same message arriving via webhook and then via the next poll
    /// lands exactly once, since both paths share the dedupe key.
    #[tokio::test]
    async fn webhook_then_poll_does_not_duplicate() {
        let polled = PlatformMessage {
            platform_message_id: "m1".into(),
            sender_id: "peer-7".into(),
            sender_name: Some("Peer".into()),
            text: "via webhook".into(),
            sent_at_ms: 1_700_000_000_000,
        };
        let accounts = Arc::new(MemoryAccountStore::new());
        let messages = Arc::new(MemoryMessageStore::new());
        let registry = registry_with(
            ScriptedConnector::new(Platform::Instagram)
                .on("pid-1", Script::Messages(vec![polled]))
                .webhook_events(vec![event("pid-1", "m1")]),
        );
        let ingress = WebhookIngress::new(
            Arc::clone(&accounts) as Arc<dyn AccountStore>,
            Arc::clone(&messages) as Arc<dyn MessageStore>,
            Arc::clone(&registry),
        );
        let service = SyncService::new(
            Arc::clone(&accounts) as Arc<dyn AccountStore>,
            Arc::clone(&messages) as Arc<dyn MessageStore>,
            registry,
        );

        let account = connected_account("pid-1", Platform::Instagram);
        accounts.insert(account.clone());

        let ingested = ingress
            .handle(Platform::Instagram, b"{}", "valid-signature")
            .await
            .unwrap();
        assert_eq!(ingested.new_messages, 1);

        let result = service.sync_account(&account).await;
        assert!(result.success);
        assert_eq!(result.new_messages, 0, "poll after webhook finds nothing new");
        assert_eq!(messages.count_for_account(&account.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn challenge_routes_to_the_connector() {
        let connector = ScriptedConnector::new(Platform::Instagram);
        let (ingress, _accounts, _messages) = ingress_with(connector);

        let params = ChallengeParams {
            mode: Some("subscribe".into()),
            verify_token: Some("t".into()),
            challenge: Some("echo-123".into()),
            challenge_code: None,
        };
        assert_eq!(
            ingress.challenge(Platform::Instagram, &params).unwrap(),
            "echo-123"
        );
        assert_eq!(
            ingress.challenge(Platform::Youtube, &params),
            Err(WebhookRejection::NotSupported)
        );
    }
}
