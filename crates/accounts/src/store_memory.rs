//! In-memory store implementations for scheduler and ingress tests.

use std::sync::Mutex;

use {
    anyhow::Result,
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
};

use {omnibox_connectors::Platform, omnibox_oauth::TokenGrant};

use crate::{
    model::{Account, AccountStatus, NewConnection, NewMessage, StoredMessage, SyncOutcome},
    now_ms,
    store::{AccountStore, MessageStore},
};

#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<Vec<Account>>,
    /// How many times `mark_sync_outcome` was invoked (test observability).
    outcome_marks: std::sync::atomic::AtomicUsize,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account directly, bypassing the OAuth path.
    pub fn insert(&self, account: Account) {
        self.lock().push(account);
    }

    #[must_use]
    pub fn outcome_mark_count(&self) -> usize {
        self.outcome_marks.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Account>> {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn list_connected(&self, user_id: Option<&str>) -> Result<Vec<Account>> {
        Ok(self
            .lock()
            .iter()
            .filter(|a| a.status == AccountStatus::Connected)
            .filter(|a| user_id.is_none_or(|uid| a.user_id == uid))
            .cloned()
            .collect())
    }

    async fn list_connected_by_platform(&self, platform: Platform) -> Result<Vec<Account>> {
        Ok(self
            .lock()
            .iter()
            .filter(|a| a.status == AccountStatus::Connected && a.platform == platform)
            .cloned()
            .collect())
    }

    async fn find_needing_refresh(&self, user_id: &str) -> Result<Vec<Account>> {
        Ok(self
            .lock()
            .iter()
            .filter(|a| {
                a.user_id == user_id
                    && a.status == AccountStatus::Connected
                    && a.needs_refresh()
            })
            .cloned()
            .collect())
    }

    async fn list_for_user(&self, user_id: &str) -> Result<Vec<Account>> {
        Ok(self
            .lock()
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get(&self, account_id: &str) -> Result<Option<Account>> {
        Ok(self.lock().iter().find(|a| a.id == account_id).cloned())
    }

    async fn find_by_platform_identity(
        &self,
        platform: Platform,
        platform_id: &str,
    ) -> Result<Option<Account>> {
        Ok(self
            .lock()
            .iter()
            .find(|a| a.platform == platform && a.platform_id == platform_id)
            .cloned())
    }

    async fn upsert_from_oauth(&self, connection: NewConnection) -> Result<Account> {
        let now = now_ms();
        let mut accounts = self.lock();
        let profile = connection.profile;
        let grant = connection.grant;

        if let Some(existing) = accounts.iter_mut().find(|a| {
            a.user_id == connection.user_id
                && a.platform == connection.platform
                && a.platform_id == profile.platform_id
        }) {
            existing.username = profile.username;
            existing.display_name = profile.display_name;
            existing.avatar_url = profile.avatar_url;
            existing.status = AccountStatus::Connected;
            existing.access_token =
                Some(Secret::new(grant.access_token.expose_secret().clone()));
            existing.refresh_token = grant.refresh_token;
            existing.token_expires_at_ms = grant.expires_at_ms;
            existing.last_activity_at_ms = Some(now);
            existing.updated_at_ms = now;
            return Ok(existing.clone());
        }

        let account = Account {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: connection.user_id,
            platform: connection.platform,
            platform_id: profile.platform_id,
            username: profile.username,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            status: AccountStatus::Connected,
            access_token: Some(Secret::new(grant.access_token.expose_secret().clone())),
            refresh_token: grant.refresh_token,
            token_expires_at_ms: grant.expires_at_ms,
            last_synced_at_ms: None,
            last_activity_at_ms: Some(now),
            created_at_ms: now,
            updated_at_ms: now,
        };
        accounts.push(account.clone());
        Ok(account)
    }

    async fn update_tokens(&self, account_id: &str, grant: &TokenGrant) -> Result<()> {
        let mut accounts = self.lock();
        let Some(account) = accounts.iter_mut().find(|a| a.id == account_id) else {
            anyhow::bail!("account not found: {account_id}");
        };
        account.access_token =
            Some(Secret::new(grant.access_token.expose_secret().clone()));
        if let Some(refresh) = &grant.refresh_token {
            account.refresh_token = Some(Secret::new(refresh.expose_secret().clone()));
        }
        account.token_expires_at_ms = grant.expires_at_ms;
        account.status = AccountStatus::Connected;
        account.updated_at_ms = now_ms();
        Ok(())
    }

    async fn mark_sync_outcome(&self, account_id: &str, outcome: &SyncOutcome) {
        self.outcome_marks
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let now = now_ms();
        let mut accounts = self.lock();
        if let Some(account) = accounts.iter_mut().find(|a| a.id == account_id) {
            account.status = outcome.status();
            account.updated_at_ms = now;
            if matches!(outcome, SyncOutcome::Success { .. }) {
                account.last_synced_at_ms = Some(now);
                account.last_activity_at_ms = Some(now);
            }
        }
    }

    async fn delete(&self, account_id: &str) -> Result<()> {
        self.lock().retain(|a| a.id != account_id);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryMessageStore {
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<StoredMessage>> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn upsert(&self, message: NewMessage) -> Result<bool> {
        let mut messages = self.lock();
        let seen = messages.iter().any(|m| {
            m.account_id == message.account_id
                && m.platform_message_id == message.platform_message_id
        });
        if seen {
            return Ok(false);
        }
        let id = messages.len() as i64 + 1;
        messages.push(StoredMessage {
            id,
            account_id: message.account_id,
            platform_message_id: message.platform_message_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            body: message.body,
            received_at_ms: message.received_at_ms,
            created_at_ms: now_ms(),
        });
        Ok(true)
    }

    async fn count_for_account(&self, account_id: &str) -> Result<i64> {
        Ok(self
            .lock()
            .iter()
            .filter(|m| m.account_id == account_id)
            .count() as i64)
    }

    async fn list_recent(&self, account_id: &str, limit: u32) -> Result<Vec<StoredMessage>> {
        let mut messages: Vec<StoredMessage> = self
            .lock()
            .iter()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect();
        messages.sort_by_key(|m| std::cmp::Reverse(m.received_at_ms));
        messages.truncate(limit as usize);
        Ok(messages)
    }
}
