use async_trait::async_trait;

use omnibox_oauth::TokenGrant;

use crate::{
    error::{ConnectorError, Result},
    types::{ChallengeParams, InboundMessage, Platform, PlatformMessage, Profile, SyncTarget},
};

/// Outbound request timeout for every provider call.
pub(crate) const REQUEST_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(15);

/// One implementation per platform behind a uniform contract.
///
/// Not every platform offers every capability; the defaults below make the
/// webhook surface opt-in so platforms without one fail closed instead of
/// panicking or pretending.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    fn platform(&self) -> Platform;

    /// Build the provider authorization URL carrying `state`.
    fn build_authorization_url(&self, state: &str) -> Result<String>;

    /// Exchange an authorization code for tokens. One-shot: codes are
    /// single-use, so implementations must not retry internally.
    async fn exchange_code(&self, code: &str) -> Result<TokenGrant>;

    /// Fetch the connected identity's profile. A 401-class provider
    /// response is `InvalidToken`, distinct from transient `FetchFailed`.
    async fn fetch_profile(&self, access_token: &str) -> Result<Profile>;

    /// Fetch messages not yet observed for this account. Platforms without
    /// messaging-API access return an empty set, a documented capability
    /// limitation, not an error.
    async fn fetch_new_messages(&self, target: &SyncTarget) -> Result<Vec<PlatformMessage>>;

    /// Trade a refresh credential for a fresh access token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant>;

    /// Verify a webhook signature over the raw request bytes.
    /// Platforms without a webhook surface fail closed.
    fn verify_webhook_signature(&self, _payload: &[u8], _signature: &str) -> bool {
        false
    }

    /// Answer the platform's one-time webhook registration handshake.
    /// `None` means the handshake failed or the platform has none.
    fn webhook_challenge(&self, _params: &ChallengeParams) -> Option<String> {
        None
    }

    /// Decode a verified webhook payload into typed inbound messages.
    fn decode_webhook_events(&self, _payload: &[u8]) -> Result<Vec<InboundMessage>> {
        Err(ConnectorError::not_supported("webhook events"))
    }
}
