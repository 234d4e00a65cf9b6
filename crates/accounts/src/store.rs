use {anyhow::Result, async_trait::async_trait};

use {omnibox_connectors::Platform, omnibox_oauth::TokenGrant};

use crate::model::{Account, NewConnection, NewMessage, StoredMessage, SyncOutcome};

/// Persistent storage for connected accounts and their OAuth material.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// All `connected` accounts, optionally scoped to one user.
    /// The scheduler calls the unscoped form, since sync is system-wide.
    async fn list_connected(&self, user_id: Option<&str>) -> Result<Vec<Account>>;

    /// All `connected` accounts on one platform.
    async fn list_connected_by_platform(&self, platform: Platform) -> Result<Vec<Account>>;

    /// `connected` accounts whose token expiry has passed.
    async fn find_needing_refresh(&self, user_id: &str) -> Result<Vec<Account>>;

    /// Every account a user has, regardless of status.
    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Account>>;

    async fn get(&self, account_id: &str) -> Result<Option<Account>>;

    /// Resolve an account by its identity on the platform (webhook routing).
    async fn find_by_platform_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Account>>;

    /// Persist a successful OAuth exchange. Enforces the
    /// (user_id, platform, platform_id) uniqueness invariant by updating
    /// in place on conflict; status becomes `connected` either way.
    async fn upsert_from_oauth(&self, connection: NewConnection) -> Result<Account>;

    /// Store a refreshed grant, flipping the account back to `connected`.
    async fn update_tokens(&self, account_id: &str, grant: &TokenGrant) -> Result<()>;

    /// Record the outcome of one sync attempt: status transition plus
    /// `last_synced_at` on success. Infallible by contract: a storage
    /// hiccup here is logged, never propagated, so one account cannot
    /// disrupt the caller's batch loop.
    async fn mark_sync_outcome(&self, account_id: &str, outcome: &SyncOutcome);

    /// Disconnect: remove the account and its mirrored messages.
    async fn delete(&self, account_id: &str) -> Result<()>;
}

/// The mirrored inbox. Writes are idempotent on
/// (account_id, platform_message_id): the same message arriving via
/// webhook and the next poll lands exactly once.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Insert if unseen. Returns true iff a new row was created.
    async fn upsert(&self, message: NewMessage) -> Result<bool>;

    async fn count_for_account(&self, account_id: &str) -> Result<i64>;

    async fn list_recent(&self, account_id: &str, limit: u32) -> Result<Vec<StoredMessage>>;
}
